use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::{BackupMetadataService, TransferEndpoint};
use crate::exception::{BackupException, BackupResult};
use crate::model::entity::Backup;

/// Contract of a backend backup implementation.
#[async_trait]
pub trait BackupDriver: Send + Sync {
    /// Metadata API the driver stores volume metadata with.
    fn metadata_service(&self) -> Arc<dyn BackupMetadataService>;

    /// Back `source` up, `backup.size` bytes of it. Container and service
    /// metadata of `backup` are filled in.
    async fn backup(&self, backup: &mut Backup, source: &mut dyn TransferEndpoint)
        -> BackupResult<()>;

    /// Restore `backup` into `destination`, the data endpoint of `volume_id`.
    async fn restore(
        &self,
        backup: &Backup,
        volume_id: Uuid,
        destination: &mut dyn TransferEndpoint,
    ) -> BackupResult<()>;

    /// Remove everything `backup` holds on the backend. Already missing data is fine.
    async fn delete(&self, backup: &Backup) -> BackupResult<()>;

    async fn verify(&self, backup: &Backup) -> BackupResult<()> {
        Err(BackupException::VerifyNotImplemented {
            backup_id: backup.id,
        })
    }

    async fn get_metadata(&self, volume_id: Uuid) -> BackupResult<String> {
        let container = self.metadata_service().get(volume_id).await?;
        Ok(serde_json::to_string(&container)?)
    }

    async fn put_metadata(&self, volume_id: Uuid, metadata: &str) -> BackupResult<()> {
        self.metadata_service().put(volume_id, metadata).await
    }

    fn export_record(&self, backup: &Backup) -> BackupResult<String> {
        backup.encode_record()
    }

    fn import_record(&self, record: &str) -> BackupResult<Backup> {
        Backup::decode_record(record)
    }
}
