use async_trait::async_trait;
use uuid::Uuid;

use super::TransferEndpoint;
use crate::exception::BackupResult;
use crate::model::entity::Backup;

/// Backup operations with record and volume status bookkeeping.
#[async_trait]
pub trait BackupService: Send + Sync {
    /// Run an accepted backup. On failure the record is left in `error`.
    async fn create(
        &self,
        backup_id: Uuid,
        source: &mut dyn TransferEndpoint,
    ) -> BackupResult<Backup>;

    async fn restore(
        &self,
        backup_id: Uuid,
        volume_id: Uuid,
        destination: &mut dyn TransferEndpoint,
    ) -> BackupResult<()>;

    /// Delete a backup. On failure the record is left in `error_deleting`.
    async fn delete(&self, backup_id: Uuid) -> BackupResult<()>;

    async fn list_by_volume(&self, volume_id: Uuid) -> BackupResult<Vec<Backup>>;
}
