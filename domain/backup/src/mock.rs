use crate::{
    model::{
        entity::{Backup, BackupStatus, Volume, VolumeStatus},
        vo::{
            BlockImage, DeleteOutcome, DiffTransfer, ImageFeature, ImageRef, ImageSpec, MetaMap,
        },
    },
    repository::{BackupRepo, VolumeMetadataRepo, VolumeRepo},
    service::{SnapshotCapableBackend, TransferEndpoint},
};
use async_trait::async_trait;
use mockall::mock;
use uuid::Uuid;

mock! {
    pub TransferEndpoint {}
    #[async_trait]
    impl TransferEndpoint for TransferEndpoint {
        async fn size(&self) -> anyhow::Result<u64>;
        async fn read(&mut self, offset: u64, length: usize) -> anyhow::Result<Vec<u8>>;
        async fn write(&mut self, data: &[u8], offset: u64) -> anyhow::Result<()>;
        async fn flush(&mut self) -> anyhow::Result<()>;
        fn supports_discard(&self) -> bool;
        async fn discard(&mut self, offset: u64, length: u64) -> anyhow::Result<()>;
        async fn close(&mut self) -> anyhow::Result<()>;
        fn block_image(&self) -> Option<BlockImage>;
    }
}

mock! {
    pub SnapshotCapableBackend {}
    #[async_trait]
    impl SnapshotCapableBackend for SnapshotCapableBackend {
        fn backend_type(&self) -> String;
        fn supported_features(&self) -> Vec<ImageFeature>;
        async fn image_exists(&self, image: &ImageRef) -> anyhow::Result<bool>;
        async fn create_image(&self, image: &ImageRef, spec: &ImageSpec) -> anyhow::Result<()>;
        async fn image_size(&self, image: &ImageRef) -> anyhow::Result<u64>;
        async fn resize_image(&self, image: &ImageRef, size: u64) -> anyhow::Result<()>;
        async fn remove_image(&self, image: &ImageRef) -> anyhow::Result<DeleteOutcome>;
        async fn list_snapshots(&self, image: &ImageRef) -> anyhow::Result<Vec<String>>;
        async fn create_snapshot(&self, image: &ImageRef, snapshot: &str) -> anyhow::Result<()>;
        async fn remove_snapshot(&self, image: &ImageRef, snapshot: &str) -> anyhow::Result<DeleteOutcome>;
        async fn has_extents(&self, image: &ImageRef) -> anyhow::Result<bool>;
        async fn open_image(&self, image: &ImageRef) -> anyhow::Result<Box<dyn TransferEndpoint>>;
        async fn diff_transfer(&self, transfer: &DiffTransfer) -> anyhow::Result<()>;
        async fn write_object(&self, pool: &str, name: &str, data: &[u8]) -> anyhow::Result<()>;
        async fn read_object(&self, pool: &str, name: &str) -> anyhow::Result<Option<Vec<u8>>>;
        async fn remove_object(&self, pool: &str, name: &str) -> anyhow::Result<DeleteOutcome>;
    }
}

mock! {
    pub BackupRepo {}
    #[async_trait]
    impl BackupRepo for BackupRepo {
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
}

mock! {
    pub VolumeRepo {}
    #[async_trait]
    impl VolumeRepo for VolumeRepo {
        async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Volume>;
        async fn update_status(&self, id: Uuid, status: VolumeStatus) -> anyhow::Result<()>;
    }
}

mock! {
    pub VolumeMetadataRepo {}
    #[async_trait]
    impl VolumeMetadataRepo for VolumeMetadataRepo {
        async fn get_base(&self, volume_id: Uuid) -> anyhow::Result<MetaMap>;
        async fn get_user(&self, volume_id: Uuid) -> anyhow::Result<MetaMap>;
        async fn get_glance(&self, volume_id: Uuid) -> anyhow::Result<MetaMap>;
        async fn update_base(&self, volume_id: Uuid, metadata: MetaMap) -> anyhow::Result<()>;
        async fn update_user(&self, volume_id: Uuid, metadata: MetaMap) -> anyhow::Result<()>;
        async fn update_glance(&self, volume_id: Uuid, metadata: MetaMap) -> anyhow::Result<()>;
    }
}

