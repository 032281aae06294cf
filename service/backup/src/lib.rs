mod backup;
mod driver;
mod endpoint;
mod metadata;
mod retry;
mod snapshot_chain;
mod transfer;

#[rustfmt::skip]
pub use {
    backup::BackupServiceImpl,
    driver::IncrementalBackupDriver,
    endpoint::FileEndpoint,
    metadata::{filter, BackupMetadataServiceImpl},
    retry::{Backoff, RetryPolicy},
    snapshot_chain::SnapshotChainServiceImpl,
    transfer::ChunkedTransferServiceImpl,
};
