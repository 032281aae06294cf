use std::sync::Arc;

use backup_engine::infrastructure::{
    config::{build_config, BackupEngineConfig},
    service::RbdCliBackend,
    telemetry::initialize_telemetry,
};
use domain_backup::{
    model::vo::ImageRef,
    service::{SnapshotCapableBackend, SnapshotChainService},
};
use service_backup::SnapshotChainServiceImpl;

#[tokio::main]
async fn main() {
    let config = match build_config().and_then(BackupEngineConfig::load) {
        Ok(x) => x,
        Err(e) => {
            eprintln!("Failed to build config: {e}");
            return;
        }
    };

    if let Err(e) = initialize_telemetry(&config.telemetry) {
        eprintln!("Failed to initialize logger: {e}");
        return;
    };

    if let Err(e) = check(&config).await {
        tracing::error!("Backup pool check failed: {e}");
        std::process::exit(1);
    }
}

/// Report how backups would be laid out on the configured cluster.
async fn check(config: &BackupEngineConfig) -> anyhow::Result<()> {
    let backend = Arc::new(RbdCliBackend::new(config.ceph.clone()));
    let chain = SnapshotChainServiceImpl::builder()
        .backend(backend.clone())
        .image_journals(config.ceph.image_journals)
        .retry(config.retry.clone())
        .build();
    let features = chain.features();
    tracing::info!(
        "Backups go to pool: {} of {} as {} images with features {:?}.",
        config.ceph.pool,
        backend.backend_type(),
        if features.old_format { "old format" } else { "format 2" },
        features.features()
    );
    let check_image = ImageRef::new(&config.ceph.pool, "backup-engine-check");
    backend.image_exists(&check_image).await?;
    tracing::info!("Cluster is reachable as: {}.", config.ceph.user);
    Ok(())
}
