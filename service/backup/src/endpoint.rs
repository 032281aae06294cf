use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use domain_backup::service::TransferEndpoint;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Plain file or block device node used as a transfer endpoint.
pub struct FileEndpoint {
    path: PathBuf,
    file: File,
}

impl FileEndpoint {
    /// Open an existing file for reading and writing.
    pub async fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path).await?;
        Ok(Self { path, file })
    }

    pub async fn open_read_only(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).open(&path).await?;
        Ok(Self { path, file })
    }

    /// Create (or truncate) a file of `size` bytes.
    pub async fn create(path: impl AsRef<Path>, size: u64) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .await?;
        file.set_len(size).await?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TransferEndpoint for FileEndpoint {
    async fn size(&self) -> anyhow::Result<u64> {
        Ok(self.file.metadata().await?.len())
    }

    async fn read(&mut self, offset: u64, length: usize) -> anyhow::Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        let mut data = Vec::with_capacity(length);
        (&mut self.file).take(length as u64).read_to_end(&mut data).await?;
        Ok(data)
    }

    async fn write(&mut self, data: &[u8], offset: u64) -> anyhow::Result<()> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        self.file.write_all(data).await?;
        Ok(())
    }

    async fn flush(&mut self) -> anyhow::Result<()> {
        self.file.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.file.sync_all().await?;
        Ok(())
    }
}
