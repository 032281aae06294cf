mod backend;
mod backup;
mod driver;
mod endpoint;
mod metadata;
mod snapshot_chain;
mod transfer;

#[rustfmt::skip]
pub use {
    backend::SnapshotCapableBackend,
    backup::BackupService,
    driver::BackupDriver,
    endpoint::TransferEndpoint,
    metadata::BackupMetadataService,
    snapshot_chain::SnapshotChainService,
    transfer::{ChunkedTransferService, TransferSummary},
};
