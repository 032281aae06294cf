use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use domain_backup::{
    exception::{BackupException, BackupResult},
    model::{
        entity::Backup,
        vo::{
            backup_image_name, base_image_name, metadata_object_name, BackupMode, DeleteOutcome,
            DiffTransfer, ImageRef, ImageSpec, ServiceMetadata, SnapshotName,
        },
    },
    repository::VolumeRepo,
    service::{
        BackupDriver, BackupMetadataService, ChunkedTransferService, SnapshotCapableBackend,
        SnapshotChainService, TransferEndpoint,
    },
};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::RetryPolicy;

/// Backup driver for snapshot capable block storage.
///
/// Sources that are images of the same backend are backed up differentially
/// into the base image of their volume, one snapshot per backup. Anything
/// else gets a full image of its own filled by chunked transfer.
#[derive(TypedBuilder)]
pub struct IncrementalBackupDriver {
    backend: Arc<dyn SnapshotCapableBackend>,
    chain: Arc<dyn SnapshotChainService>,
    transfer: Arc<dyn ChunkedTransferService>,
    metadata: Arc<dyn BackupMetadataService>,
    volume_repo: Arc<dyn VolumeRepo>,
    /// Container used when the backup names none.
    #[builder(default = "backups".into(), setter(into))]
    pool: String,
    #[builder(default = 0)]
    stripe_unit: u64,
    #[builder(default = 0)]
    stripe_count: u64,
    /// Store volume metadata next to the data.
    #[builder(default = true)]
    backup_metadata: bool,
    #[builder(default)]
    retry: RetryPolicy,
}

fn to_invalid_backup(e: BackupException) -> BackupException {
    match e {
        e @ (BackupException::InvalidBackup { .. }
        | BackupException::InvalidParameterValue { .. }) => e,
        e => BackupException::invalid_backup(e),
    }
}

impl IncrementalBackupDriver {
    fn container(&self, backup: &Backup) -> String {
        backup.container.clone().unwrap_or_else(|| self.pool.clone())
    }

    fn image_spec(&self, size: u64) -> ImageSpec {
        ImageSpec {
            size,
            features: self.chain.features(),
            stripe_unit: self.stripe_unit,
            stripe_count: self.stripe_count,
        }
    }

    async fn discard_snapshot(&self, image: &ImageRef, snapshot: &str) {
        match self.backend.remove_snapshot(image, snapshot).await {
            Ok(DeleteOutcome::Deleted) => tracing::debug!("Removed snapshot: {snapshot} of {image}."),
            Ok(outcome) => tracing::warn!("Snapshot: {snapshot} of {image} not removed: {outcome:?}."),
            Err(e) => tracing::warn!("Failed to remove snapshot: {snapshot} of {image}: {e}"),
        }
    }

    async fn discard_image(&self, image: &ImageRef) {
        match self.retry.remove(&image.to_string(), || self.backend.remove_image(image)).await {
            Ok(outcome) => tracing::debug!("Cleanup of image: {image}: {outcome:?}."),
            Err(e) => tracing::warn!("Failed to clean up image: {image}: {e}"),
        }
    }

    /// Differential backup of `source` into the base image. `None` when the
    /// base shares no snapshot with the source and a full backup is needed.
    async fn backup_differential(
        &self,
        backup: &Backup,
        pool: &str,
        source: &ImageRef,
    ) -> BackupResult<Option<ServiceMetadata>> {
        let base = ImageRef::new(pool, base_image_name(backup.volume_id));
        let source = source.head();
        let mut created_base = false;
        let from_snap = if self.backend.image_exists(&base).await? {
            match self.chain.most_recent_chained_snap(&source, &base).await? {
                Some(snap) => Some(snap.to_string()),
                None => {
                    tracing::info!("Base image: {base} shares no snapshot with {source}.");
                    return Ok(None);
                }
            }
        } else {
            for stale in self.chain.get_backup_snaps(&source).await? {
                tracing::info!("Removing stale snapshot: {stale} of {source}.");
                self.discard_snapshot(&source, &stale.to_string()).await;
            }
            tracing::debug!("Creating base image: {base}.");
            self.backend.create_image(&base, &self.image_spec(backup.size)).await?;
            created_base = true;
            None
        };

        let snap = SnapshotName::new(backup.id, Utc::now()).to_string();
        let transfer = DiffTransfer {
            source: source.at_snapshot(&snap),
            from_snap: from_snap.clone(),
            destination: base.clone(),
        };
        let result = match self.backend.create_snapshot(&source, &snap).await {
            Ok(()) => self.backend.diff_transfer(&transfer).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::error!("Differential backup of {} into {base} failed: {e}", transfer.source);
            if created_base {
                self.discard_image(&base).await;
            }
            self.discard_snapshot(&source, &snap).await;
            return Err(BackupException::invalid_backup(format!(
                "differential transfer of {} failed: {e}",
                transfer.source
            )));
        }
        if let Some(from_snap) = &from_snap {
            self.discard_snapshot(&source, from_snap).await;
        }
        Ok(Some(ServiceMetadata {
            backup_mode: BackupMode::Incremental,
            backup_path: base.path(),
            source_path: Some(source.path()),
        }))
    }

    async fn backup_full(
        &self,
        backup: &Backup,
        pool: &str,
        source: &mut dyn TransferEndpoint,
    ) -> BackupResult<ServiceMetadata> {
        let image = ImageRef::new(pool, backup_image_name(backup.volume_id, backup.id));
        tracing::debug!("Creating backup image: {image}.");
        self.backend.create_image(&image, &self.image_spec(backup.size)).await?;
        let result = async {
            let mut destination = self.backend.open_image(&image).await?;
            let transferred = self
                .transfer
                .transfer(source, destination.as_mut(), backup.size)
                .await;
            let closed = destination.close().await;
            let summary = transferred?;
            closed?;
            anyhow::Ok(summary)
        }
        .await;
        match result {
            Ok(summary) => {
                tracing::debug!(
                    "Backed up {} bytes into {image}, blake3: {}.",
                    summary.bytes,
                    summary.digest
                );
                Ok(ServiceMetadata {
                    backup_mode: BackupMode::Full,
                    backup_path: image.path(),
                    source_path: None,
                })
            }
            Err(e) => {
                tracing::error!("Full backup into {image} failed: {e}");
                self.discard_image(&image).await;
                Err(BackupException::invalid_backup(format!(
                    "full backup into {image} failed: {e}"
                )))
            }
        }
    }

    async fn store_metadata(&self, backup: &Backup, pool: &str) -> BackupResult<()> {
        let container = self.metadata.get(backup.volume_id).await?;
        let data = serde_json::to_vec(&container)?;
        self.backend
            .write_object(pool, &metadata_object_name(backup.id), &data)
            .await?;
        Ok(())
    }

    async fn restore_metadata(&self, backup: &Backup, volume_id: Uuid) -> BackupResult<()> {
        let pool = self.container(backup);
        let name = metadata_object_name(backup.id);
        match self.backend.read_object(&pool, &name).await? {
            Some(data) => {
                let container = String::from_utf8(data).map_err(|e| {
                    BackupException::invalid_backup(format!("metadata object: {name} is not utf-8: {e}"))
                })?;
                self.put_metadata(volume_id, &container).await
            }
            None => {
                tracing::debug!("Backup: {} has no metadata object.", backup.id);
                Ok(())
            }
        }
    }

    async fn restore_incremental(
        &self,
        backup: &Backup,
        volume_id: Uuid,
        base: &ImageRef,
        destination: &mut dyn TransferEndpoint,
    ) -> BackupResult<()> {
        let volume = self.volume_repo.get_by_id(volume_id).await?;
        let target = destination.block_image();
        let (allowed, restore_point) = self
            .chain
            .diff_restore_allowed(base, backup, &volume, target.as_ref())
            .await?;
        if let (true, Some(restore_point), Some(target)) = (allowed, &restore_point, &target) {
            match self.restore_differential(base, restore_point, &target.image).await {
                Ok(()) => return Ok(()),
                Err(e) => tracing::warn!(
                    "Differential restore of backup: {} failed, trying full restore: {e}",
                    backup.id
                ),
            }
        }
        let restore_point = match restore_point {
            Some(restore_point) => restore_point,
            None => self
                .chain
                .get_backup_snap_name(base, backup.id)
                .await?
                .ok_or_else(|| {
                    BackupException::invalid_backup(format!(
                        "backup: {} has no snapshot on {base}",
                        backup.id
                    ))
                })?,
        };
        self.restore_full(backup, &base.at_snapshot(restore_point), destination)
            .await
    }

    async fn restore_differential(
        &self,
        base: &ImageRef,
        restore_point: &str,
        target: &ImageRef,
    ) -> anyhow::Result<()> {
        let target = target.head();
        let size = self.backend.image_size(&target).await?;
        self.backend
            .diff_transfer(&DiffTransfer {
                source: base.at_snapshot(restore_point),
                from_snap: None,
                destination: target.clone(),
            })
            .await?;
        let restored = self.backend.image_size(&target).await?;
        if restored != size {
            tracing::debug!("Resizing {target} from {restored} back to {size} bytes.");
            self.backend.resize_image(&target, size).await?;
        }
        self.discard_snapshot(&target, restore_point).await;
        Ok(())
    }

    async fn restore_full(
        &self,
        backup: &Backup,
        image: &ImageRef,
        destination: &mut dyn TransferEndpoint,
    ) -> BackupResult<()> {
        let mut source = self.backend.open_image(image).await?;
        let transferred = self
            .transfer
            .transfer(source.as_mut(), destination, backup.size)
            .await;
        let closed = source.close().await;
        let summary = transferred?;
        closed?;
        tracing::debug!(
            "Restored {} bytes from {image}, blake3: {}.",
            summary.bytes,
            summary.digest
        );
        Ok(())
    }
}

#[async_trait]
impl BackupDriver for IncrementalBackupDriver {
    fn metadata_service(&self) -> Arc<dyn BackupMetadataService> {
        self.metadata.clone()
    }

    #[tracing::instrument(skip_all, fields(backup_id = %backup.id, volume_id = %backup.volume_id))]
    async fn backup(
        &self,
        backup: &mut Backup,
        source: &mut dyn TransferEndpoint,
    ) -> BackupResult<()> {
        let volume = self.volume_repo.get_by_id(backup.volume_id).await?;
        if volume.size == 0 || backup.size == 0 {
            return Err(BackupException::invalid_parameter(format!(
                "need non-zero volume size, volume: {} has {} GiB and backup: {} {} bytes",
                volume.id, volume.size, backup.id, backup.size
            )));
        }
        let pool = self.container(backup);
        backup.container = Some(pool.clone());

        let differential = match source.block_image() {
            Some(image) if image.backend_type == self.backend.backend_type() => self
                .backup_differential(backup, &pool, &image.image)
                .await
                .map_err(to_invalid_backup)?,
            _ => None,
        };
        let service_metadata = match differential {
            Some(service_metadata) => service_metadata,
            None => self
                .backup_full(backup, &pool, source)
                .await
                .map_err(to_invalid_backup)?,
        };
        backup.service_metadata = Some(service_metadata.to_json()?);
        backup.object_count = 1;

        if self.backup_metadata {
            if let Err(e) = self.store_metadata(backup, &pool).await {
                tracing::error!("Failed to store metadata of backup: {}: {e}", backup.id);
                if let Err(e) = self.delete(backup).await {
                    tracing::warn!("Cleanup of backup: {} failed: {e}", backup.id);
                }
                return Err(BackupException::invalid_backup(format!(
                    "failed to store metadata: {e}"
                )));
            }
            backup.object_count += 1;
        }
        tracing::info!("Backup: {} finished as {}.", backup.id, service_metadata.backup_mode);
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(backup_id = %backup.id, %volume_id))]
    async fn restore(
        &self,
        backup: &Backup,
        volume_id: Uuid,
        destination: &mut dyn TransferEndpoint,
    ) -> BackupResult<()> {
        let service_metadata = backup.parsed_service_metadata()?.ok_or_else(|| {
            BackupException::invalid_backup(format!("backup: {} has no service metadata", backup.id))
        })?;
        let image = service_metadata.backup_image()?;
        if !self.backend.image_exists(&image).await? {
            return Err(BackupException::invalid_backup(format!(
                "backup image: {image} does not exist"
            )));
        }
        let restored = match service_metadata.backup_mode {
            BackupMode::Incremental => {
                self.restore_incremental(backup, volume_id, &image, destination)
                    .await
            }
            BackupMode::Full => self.restore_full(backup, &image, destination).await,
        };
        restored.map_err(to_invalid_backup)?;
        if self.backup_metadata {
            self.restore_metadata(backup, volume_id).await?;
        }
        tracing::info!("Backup: {} restored to volume: {volume_id}.", backup.id);
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(backup_id = %backup.id))]
    async fn delete(&self, backup: &Backup) -> BackupResult<()> {
        match backup.parsed_service_metadata()? {
            None => tracing::warn!("Backup: {} has no data on the backend.", backup.id),
            Some(service_metadata) => {
                let image = service_metadata.backup_image()?;
                let outcome = match service_metadata.backup_mode {
                    BackupMode::Incremental => {
                        self.chain.try_delete_base_image(backup, &image).await?
                    }
                    BackupMode::Full => {
                        self.retry
                            .remove(&image.to_string(), || self.backend.remove_image(&image))
                            .await?
                    }
                };
                if outcome == DeleteOutcome::NotFound {
                    tracing::warn!("Backup image: {image} of backup: {} not found.", backup.id);
                }
            }
        }
        let pool = self.container(backup);
        let name = metadata_object_name(backup.id);
        match self.backend.remove_object(&pool, &name).await? {
            DeleteOutcome::Deleted => tracing::debug!("Removed metadata object: {pool}/{name}."),
            outcome => tracing::debug!("Metadata object: {pool}/{name} not removed: {outcome:?}."),
        }
        Ok(())
    }
}
