use async_trait::async_trait;

use crate::model::vo::BlockImage;

/// Something volume data can be read from or written to: a plain file, a
/// mapped block device, an image of a snapshot capable backend.
#[async_trait]
pub trait TransferEndpoint: Send + Sync {
    /// Size in bytes.
    async fn size(&self) -> anyhow::Result<u64>;
    /// Read up to `length` bytes at `offset`. An empty result means end of data.
    async fn read(&mut self, offset: u64, length: usize) -> anyhow::Result<Vec<u8>>;
    async fn write(&mut self, data: &[u8], offset: u64) -> anyhow::Result<()>;
    async fn flush(&mut self) -> anyhow::Result<()>;

    /// Whether [`TransferEndpoint::discard`] deallocates without transferring data.
    fn supports_discard(&self) -> bool {
        false
    }

    async fn discard(&mut self, offset: u64, length: u64) -> anyhow::Result<()> {
        anyhow::bail!("discard of {length} bytes at {offset} is not supported by this endpoint")
    }

    /// Release whatever the endpoint holds on the backend.
    async fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// `Some` when the endpoint is an image of a snapshot capable backend.
    fn block_image(&self) -> Option<BlockImage> {
        None
    }
}
