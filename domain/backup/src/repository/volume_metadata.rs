use async_trait::async_trait;
use uuid::Uuid;

use crate::model::vo::MetaMap;

/// Access to the three metadata classes of a volume.
///
/// `update_*` merges the given keys into what the volume already has.
#[async_trait]
pub trait VolumeMetadataRepo: Send + Sync {
    async fn get_base(&self, volume_id: Uuid) -> anyhow::Result<MetaMap>;
    async fn get_user(&self, volume_id: Uuid) -> anyhow::Result<MetaMap>;
    async fn get_glance(&self, volume_id: Uuid) -> anyhow::Result<MetaMap>;
    async fn update_base(&self, volume_id: Uuid, metadata: MetaMap) -> anyhow::Result<()>;
    async fn update_user(&self, volume_id: Uuid, metadata: MetaMap) -> anyhow::Result<()>;
    async fn update_glance(&self, volume_id: Uuid, metadata: MetaMap) -> anyhow::Result<()>;
}
