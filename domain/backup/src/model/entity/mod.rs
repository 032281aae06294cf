pub mod backup;
pub mod volume;

#[rustfmt::skip]
pub use {
    backup::{Backup, BackupStatus},
    volume::{Volume, VolumeStatus},
};
