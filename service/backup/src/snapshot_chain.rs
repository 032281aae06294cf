use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use domain_backup::{
    exception::{BackupException, BackupResult},
    model::{
        entity::{Backup, Volume},
        vo::{
            source_image_name, BackendFeatures, BlockImage, DeleteOutcome, ImageFeature, ImageRef,
            SnapshotName,
        },
    },
    service::{SnapshotCapableBackend, SnapshotChainService},
};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::RetryPolicy;

#[derive(TypedBuilder)]
pub struct SnapshotChainServiceImpl {
    backend: Arc<dyn SnapshotCapableBackend>,
    /// Create backup images with exclusive lock and journaling.
    #[builder(default = false)]
    image_journals: bool,
    #[builder(default)]
    retry: RetryPolicy,
}

impl SnapshotChainServiceImpl {
    async fn remove_source_snapshot(&self, source: &ImageRef, snapshot: &str) {
        match self.backend.remove_snapshot(source, snapshot).await {
            Ok(DeleteOutcome::Deleted) => {
                tracing::debug!("Removed snapshot: {snapshot} of {source}.")
            }
            Ok(outcome) => {
                tracing::warn!("Snapshot: {snapshot} of {source} not removed: {outcome:?}.")
            }
            Err(e) => tracing::warn!("Failed to remove snapshot: {snapshot} of {source}: {e}"),
        }
    }
}

#[async_trait]
impl SnapshotChainService for SnapshotChainServiceImpl {
    fn features(&self) -> BackendFeatures {
        let supported = self.backend.supported_features();
        let mut wanted = vec![ImageFeature::Layering, ImageFeature::StripingV2];
        if self.image_journals {
            wanted.extend([ImageFeature::ExclusiveLock, ImageFeature::Journaling]);
        }
        let bitmask = wanted
            .into_iter()
            .filter(|feature| supported.contains(feature))
            .fold(0, |mask, feature| mask | feature.bit());
        BackendFeatures {
            old_format: bitmask == 0,
            bitmask,
        }
    }

    async fn get_backup_snaps(&self, image: &ImageRef) -> anyhow::Result<Vec<SnapshotName>> {
        let mut snaps: Vec<_> = self
            .backend
            .list_snapshots(image)
            .await?
            .iter()
            .filter_map(|name| SnapshotName::parse(name))
            .collect();
        snaps.sort_by(|a, b| b.cmp(a));
        Ok(snaps)
    }

    async fn most_recent_snap(&self, image: &ImageRef) -> anyhow::Result<Option<SnapshotName>> {
        Ok(self.get_backup_snaps(image).await?.into_iter().next())
    }

    async fn most_recent_chained_snap(
        &self,
        source: &ImageRef,
        base: &ImageRef,
    ) -> anyhow::Result<Option<SnapshotName>> {
        let on_base: HashSet<String> = self.backend.list_snapshots(base).await?.into_iter().collect();
        for snap in self.get_backup_snaps(source).await? {
            let name = snap.to_string();
            if on_base.contains(&name) {
                tracing::debug!("Newest snapshot of {source} chained to {base}: {name}.");
                return Ok(Some(snap));
            }
            tracing::info!("Snapshot: {name} of {source} has no counterpart on {base}, removing it.");
            self.remove_source_snapshot(source, &name).await;
        }
        Ok(None)
    }

    async fn get_backup_snap_name(
        &self,
        image: &ImageRef,
        backup_id: Uuid,
    ) -> BackupResult<Option<String>> {
        let mut owned: Vec<_> = self
            .get_backup_snaps(image)
            .await?
            .into_iter()
            .filter(|snap| snap.backup_id == backup_id)
            .collect();
        match owned.len() {
            0 => {
                tracing::debug!("Backup: {backup_id} has no snapshot on {image}.");
                Ok(None)
            }
            1 => Ok(owned.pop().map(|snap| snap.to_string())),
            n => Err(BackupException::BackupOperation {
                reason: format!(
                    "found {n} snapshots of backup: {backup_id} on {image}, expected at most one"
                ),
            }),
        }
    }

    async fn diff_restore_allowed(
        &self,
        base: &ImageRef,
        backup: &Backup,
        volume: &Volume,
        destination: Option<&BlockImage>,
    ) -> anyhow::Result<(bool, Option<String>)> {
        if volume.id == backup.volume_id {
            tracing::debug!("Restoring backup: {} onto its own volume, forcing full restore.", backup.id);
            return Ok((false, None));
        }
        let backend_type = self.backend.backend_type();
        let Some(destination) = destination.filter(|d| d.backend_type == backend_type) else {
            tracing::debug!("Destination is not a {backend_type} image, forcing full restore.");
            return Ok((false, None));
        };
        if !self.backend.image_exists(base).await? {
            tracing::debug!("Base image: {base} not found, forcing full restore.");
            return Ok((false, None));
        }
        let Some(restore_point) = self.get_backup_snap_name(base, backup.id).await? else {
            return Ok((false, None));
        };
        if self.backend.has_extents(&destination.image).await? {
            tracing::info!(
                "Destination: {} has extents, differential restore not allowed.",
                destination.image
            );
            return Ok((false, Some(restore_point)));
        }
        Ok((true, Some(restore_point)))
    }

    async fn delete_backup_snapshot(
        &self,
        base: &ImageRef,
        backup_id: Uuid,
    ) -> BackupResult<(Option<String>, usize)> {
        let snap = self.get_backup_snap_name(base, backup_id).await?;
        if let Some(name) = &snap {
            let outcome = self
                .retry
                .remove(&format!("{base}@{name}"), || {
                    self.backend.remove_snapshot(base, name)
                })
                .await?;
            if outcome == DeleteOutcome::NotFound {
                tracing::warn!("Snapshot: {name} of {base} was already gone.");
            }
        }
        let remaining = self.get_backup_snaps(base).await?.len();
        Ok((snap, remaining))
    }

    async fn try_delete_base_image(
        &self,
        backup: &Backup,
        base: &ImageRef,
    ) -> BackupResult<DeleteOutcome> {
        if !self.backend.image_exists(base).await? {
            tracing::warn!("Base image: {base} of backup: {} not found.", backup.id);
            return Ok(DeleteOutcome::NotFound);
        }
        let (_, remaining) = self.delete_backup_snapshot(base, backup.id).await?;
        if remaining > 0 {
            tracing::info!(
                "Base image: {base} still has {remaining} backup snapshot(s), skipping its deletion."
            );
            return Ok(DeleteOutcome::Deleted);
        }

        let outcome = self
            .retry
            .remove(&base.to_string(), || self.backend.remove_image(base))
            .await?;
        if outcome == DeleteOutcome::NotFound {
            tracing::warn!("Base image: {base} was already gone.");
        }

        // Without a base no source snapshot can seed a differential transfer.
        let source = backup
            .parsed_service_metadata()?
            .and_then(|metadata| metadata.source_image())
            .unwrap_or_else(|| ImageRef::new(base.pool.to_owned(), source_image_name(backup.volume_id)));
        if self.backend.image_exists(&source).await? {
            for stale in self.get_backup_snaps(&source).await? {
                self.remove_source_snapshot(&source, &stale.to_string()).await;
            }
        }
        Ok(outcome)
    }
}
