use std::sync::Arc;

use domain_backup::{
    repository::{BackupRepo, VolumeMetadataRepo, VolumeRepo},
    service::{
        BackupDriver, BackupMetadataService, BackupService, ChunkedTransferService,
        SnapshotCapableBackend, SnapshotChainService,
    },
};
use service_backup::*;

use super::{config::BackupEngineConfig, service::RbdCliBackend};

/// Record stores the engine works against.
#[derive(Clone)]
pub struct Repositories {
    pub backup: Arc<dyn BackupRepo>,
    pub volume: Arc<dyn VolumeRepo>,
    pub volume_metadata: Arc<dyn VolumeMetadataRepo>,
}

#[derive(Clone)]
pub struct ServiceProvider {
    pub backend: Arc<dyn SnapshotCapableBackend>,
    pub snapshot_chain: Arc<dyn SnapshotChainService>,
    pub transfer: Arc<dyn ChunkedTransferService>,
    pub metadata: Arc<dyn BackupMetadataService>,
    pub driver: Arc<dyn BackupDriver>,
    pub backup_service: Arc<dyn BackupService>,
}

impl ServiceProvider {
    /// Services backed by the cluster named in `config`.
    pub fn build(config: &BackupEngineConfig, repositories: Repositories) -> Self {
        let backend = Arc::new(RbdCliBackend::new(config.ceph.clone()));
        Self::with_backend(config, backend, repositories)
    }

    pub fn with_backend(
        config: &BackupEngineConfig,
        backend: Arc<dyn SnapshotCapableBackend>,
        repositories: Repositories,
    ) -> Self {
        let snapshot_chain: Arc<dyn SnapshotChainService> = Arc::new(
            SnapshotChainServiceImpl::builder()
                .backend(backend.clone())
                .image_journals(config.ceph.image_journals)
                .retry(config.retry.clone())
                .build(),
        );
        let transfer: Arc<dyn ChunkedTransferService> = Arc::new(
            ChunkedTransferServiceImpl::builder()
                .chunk_size(config.driver.chunk_size)
                .discard_excess_bytes(config.driver.restore_discard_excess_bytes)
                .build(),
        );
        let metadata: Arc<dyn BackupMetadataService> = Arc::new(
            BackupMetadataServiceImpl::builder()
                .repo(repositories.volume_metadata.clone())
                .build(),
        );
        let driver: Arc<dyn BackupDriver> = Arc::new(
            IncrementalBackupDriver::builder()
                .backend(backend.clone())
                .chain(snapshot_chain.clone())
                .transfer(transfer.clone())
                .metadata(metadata.clone())
                .volume_repo(repositories.volume.clone())
                .pool(config.ceph.pool.as_str())
                .stripe_unit(config.ceph.stripe_unit)
                .stripe_count(config.ceph.stripe_count)
                .backup_metadata(config.driver.backup_metadata)
                .retry(config.retry.clone())
                .build(),
        );
        let backup_service: Arc<dyn BackupService> = Arc::new(
            BackupServiceImpl::builder()
                .backup_repo(repositories.backup)
                .volume_repo(repositories.volume)
                .driver(driver.clone())
                .build(),
        );
        Self {
            backend,
            snapshot_chain,
            transfer,
            metadata,
            driver,
            backup_service,
        }
    }
}
