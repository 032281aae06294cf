use async_trait::async_trait;

use super::TransferEndpoint;
use crate::model::vo::{DeleteOutcome, DiffTransfer, ImageFeature, ImageRef, ImageSpec};

/// Block storage backend able to hold backup images and snapshot chains.
///
/// Snapshot operations act on the image head, the `snapshot` part of the
/// given [`ImageRef`] is ignored by them.
#[async_trait]
pub trait SnapshotCapableBackend: Send + Sync {
    /// Backend kind, endpoints of the same kind allow differential transfer.
    fn backend_type(&self) -> String;
    /// Image features this backend can create images with.
    fn supported_features(&self) -> Vec<ImageFeature>;

    async fn image_exists(&self, image: &ImageRef) -> anyhow::Result<bool>;
    async fn create_image(&self, image: &ImageRef, spec: &ImageSpec) -> anyhow::Result<()>;
    async fn image_size(&self, image: &ImageRef) -> anyhow::Result<u64>;
    async fn resize_image(&self, image: &ImageRef, size: u64) -> anyhow::Result<()>;
    async fn remove_image(&self, image: &ImageRef) -> anyhow::Result<DeleteOutcome>;

    async fn list_snapshots(&self, image: &ImageRef) -> anyhow::Result<Vec<String>>;
    async fn create_snapshot(&self, image: &ImageRef, snapshot: &str) -> anyhow::Result<()>;
    async fn remove_snapshot(&self, image: &ImageRef, snapshot: &str)
        -> anyhow::Result<DeleteOutcome>;
    /// Whether any extent of the image has ever been written.
    async fn has_extents(&self, image: &ImageRef) -> anyhow::Result<bool>;

    /// Open an image for chunked transfer, read only when `image` names a snapshot.
    async fn open_image(&self, image: &ImageRef) -> anyhow::Result<Box<dyn TransferEndpoint>>;
    async fn diff_transfer(&self, transfer: &DiffTransfer) -> anyhow::Result<()>;

    async fn write_object(&self, pool: &str, name: &str, data: &[u8]) -> anyhow::Result<()>;
    async fn read_object(&self, pool: &str, name: &str) -> anyhow::Result<Option<Vec<u8>>>;
    async fn remove_object(&self, pool: &str, name: &str) -> anyhow::Result<DeleteOutcome>;
}
