use async_trait::async_trait;
use uuid::Uuid;

use crate::exception::BackupResult;
use crate::model::vo::MetadataContainer;

/// Snapshot and restore of volume metadata alongside a backup.
#[async_trait]
pub trait BackupMetadataService: Send + Sync {
    /// Collect the metadata of a volume. Empty classes other than the base
    /// one are left out of the container.
    async fn get(&self, volume_id: Uuid) -> BackupResult<MetadataContainer>;
    /// Apply a serialized container to a volume.
    async fn put(&self, volume_id: Uuid, container: &str) -> BackupResult<()>;
}
