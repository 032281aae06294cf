use async_trait::async_trait;
use uuid::Uuid;

use crate::model::entity::{Backup, BackupStatus};

#[async_trait]
pub trait BackupRepo: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Backup>;
    async fn get_all_by_volume_id(&self, volume_id: Uuid) -> anyhow::Result<Vec<Backup>>;
    async fn update(&self, backup: &Backup) -> anyhow::Result<()>;
    async fn update_status(
        &self,
        id: Uuid,
        status: BackupStatus,
        fail_reason: Option<String>,
    ) -> anyhow::Result<()>;
    async fn delete(&self, id: Uuid) -> anyhow::Result<()>;
}
