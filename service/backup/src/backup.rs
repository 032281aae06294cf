use std::sync::Arc;

use async_trait::async_trait;
use domain_backup::{
    exception::{BackupException, BackupResult},
    model::entity::{Backup, BackupStatus, VolumeStatus},
    repository::{BackupRepo, VolumeRepo},
    service::{BackupDriver, BackupService, TransferEndpoint},
};
use typed_builder::TypedBuilder;
use uuid::Uuid;

#[derive(TypedBuilder)]
pub struct BackupServiceImpl {
    backup_repo: Arc<dyn BackupRepo>,
    volume_repo: Arc<dyn VolumeRepo>,
    driver: Arc<dyn BackupDriver>,
}

#[async_trait]
impl BackupService for BackupServiceImpl {
    async fn create(
        &self,
        backup_id: Uuid,
        source: &mut dyn TransferEndpoint,
    ) -> BackupResult<Backup> {
        let mut backup = self.backup_repo.get_by_id(backup_id).await?;
        let volume = self.volume_repo.get_by_id(backup.volume_id).await?;
        if !matches!(volume.status, VolumeStatus::Available | VolumeStatus::InUse) {
            let e = BackupException::invalid_parameter(format!(
                "volume: {} must be available or in-use to be backed up, but is {:?}",
                volume.id, volume.status
            ));
            self.backup_repo
                .update_status(backup.id, BackupStatus::Error, Some(e.to_string()))
                .await?;
            return Err(e);
        }
        self.volume_repo
            .update_status(volume.id, VolumeStatus::BackingUp)
            .await?;
        backup.status = BackupStatus::Creating;
        let result = match self
            .backup_repo
            .update_status(backup.id, BackupStatus::Creating, None)
            .await
        {
            Ok(()) => self.driver.backup(&mut backup, source).await,
            Err(e) => Err(e.into()),
        };

        // The record is settled first, a failing volume update must not leave it creating.
        let recorded = match &result {
            Ok(()) => {
                backup.status = BackupStatus::Available;
                backup.fail_reason = None;
                self.backup_repo.update(&backup).await
            }
            Err(e) => {
                tracing::error!("Backup: {backup_id} failed: {e}");
                self.backup_repo
                    .update_status(backup.id, BackupStatus::Error, Some(e.to_string()))
                    .await
            }
        };
        let volume_restored = self.volume_repo.update_status(volume.id, volume.status).await;
        result?;
        recorded?;
        volume_restored?;
        Ok(backup)
    }

    async fn restore(
        &self,
        backup_id: Uuid,
        volume_id: Uuid,
        destination: &mut dyn TransferEndpoint,
    ) -> BackupResult<()> {
        let backup = self.backup_repo.get_by_id(backup_id).await?;
        if backup.status != BackupStatus::Available {
            return Err(BackupException::invalid_backup(format!(
                "backup: {backup_id} must be available to be restored, but is {:?}",
                backup.status
            )));
        }
        self.backup_repo
            .update_status(backup_id, BackupStatus::Restoring, None)
            .await?;
        self.volume_repo
            .update_status(volume_id, VolumeStatus::RestoringBackup)
            .await?;

        let result = self.driver.restore(&backup, volume_id, destination).await;
        let recorded = self
            .backup_repo
            .update_status(backup_id, BackupStatus::Available, None)
            .await;
        let volume_status = match &result {
            Ok(()) => VolumeStatus::Available,
            Err(e) => {
                tracing::error!("Restore of backup: {backup_id} to volume: {volume_id} failed: {e}");
                VolumeStatus::ErrorRestoring
            }
        };
        let volume_updated = self.volume_repo.update_status(volume_id, volume_status).await;
        result?;
        recorded?;
        volume_updated?;
        Ok(())
    }

    async fn delete(&self, backup_id: Uuid) -> BackupResult<()> {
        let backup = self.backup_repo.get_by_id(backup_id).await?;
        if !matches!(
            backup.status,
            BackupStatus::Available | BackupStatus::Error | BackupStatus::ErrorDeleting
        ) {
            return Err(BackupException::invalid_backup(format!(
                "backup: {backup_id} can't be deleted while {:?}",
                backup.status
            )));
        }
        self.backup_repo
            .update_status(backup_id, BackupStatus::Deleting, None)
            .await?;
        match self.driver.delete(&backup).await {
            Ok(()) => {
                self.backup_repo.delete(backup_id).await?;
                tracing::info!("Backup: {backup_id} deleted.");
                Ok(())
            }
            Err(e) => {
                tracing::error!("Delete of backup: {backup_id} failed: {e}");
                self.backup_repo
                    .update_status(backup_id, BackupStatus::ErrorDeleting, Some(e.to_string()))
                    .await?;
                Err(e)
            }
        }
    }

    async fn list_by_volume(&self, volume_id: Uuid) -> BackupResult<Vec<Backup>> {
        Ok(self.backup_repo.get_all_by_volume_id(volume_id).await?)
    }
}
