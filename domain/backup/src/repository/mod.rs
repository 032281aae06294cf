mod backup;
mod volume;
mod volume_metadata;

#[rustfmt::skip]
pub use {
    backup::BackupRepo,
    volume::VolumeRepo,
    volume_metadata::VolumeMetadataRepo,
};
