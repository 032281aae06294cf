use async_trait::async_trait;
use uuid::Uuid;

use crate::model::entity::{Volume, VolumeStatus};

#[async_trait]
pub trait VolumeRepo: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Volume>;
    async fn update_status(&self, id: Uuid, status: VolumeStatus) -> anyhow::Result<()>;
}
