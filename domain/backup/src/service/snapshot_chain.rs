use async_trait::async_trait;
use uuid::Uuid;

use crate::exception::BackupResult;
use crate::model::entity::{Backup, Volume};
use crate::model::vo::{BackendFeatures, BlockImage, DeleteOutcome, ImageRef, SnapshotName};

/// Lifecycle of the snapshot chain behind differential backups.
///
/// Every differential backup owns exactly one snapshot on the base image of
/// its volume. The base image lives as long as any such snapshot does.
#[async_trait]
pub trait SnapshotChainService: Send + Sync {
    /// Image format and features new backup images are created with.
    fn features(&self) -> BackendFeatures;

    /// Backup snapshots of an image, newest first. Other snapshots are skipped.
    async fn get_backup_snaps(&self, image: &ImageRef) -> anyhow::Result<Vec<SnapshotName>>;

    /// Newest backup snapshot of an image.
    async fn most_recent_snap(&self, image: &ImageRef) -> anyhow::Result<Option<SnapshotName>>;

    /// Newest snapshot of `source` that also exists on `base`. Newer source
    /// snapshots without counterpart on `base` belong to failed backups and
    /// are removed on the way.
    async fn most_recent_chained_snap(
        &self,
        source: &ImageRef,
        base: &ImageRef,
    ) -> anyhow::Result<Option<SnapshotName>>;

    /// Snapshot owned by `backup_id` on `image`, `None` when the backup made none.
    async fn get_backup_snap_name(
        &self,
        image: &ImageRef,
        backup_id: Uuid,
    ) -> BackupResult<Option<String>>;

    /// Whether `backup` can be restored to `volume` by a differential
    /// transfer, and the snapshot to restore from.
    async fn diff_restore_allowed(
        &self,
        base: &ImageRef,
        backup: &Backup,
        volume: &Volume,
        destination: Option<&BlockImage>,
    ) -> anyhow::Result<(bool, Option<String>)>;

    /// Remove the snapshot of `backup_id` from `base`, returning it and the
    /// count of backup snapshots left.
    async fn delete_backup_snapshot(
        &self,
        base: &ImageRef,
        backup_id: Uuid,
    ) -> BackupResult<(Option<String>, usize)>;

    /// Drop the share of `backup` in the chain of `base`, deleting the base
    /// image once nothing references it.
    async fn try_delete_base_image(
        &self,
        backup: &Backup,
        base: &ImageRef,
    ) -> BackupResult<DeleteOutcome>;
}
