use std::time::Instant;

use async_trait::async_trait;
use domain_backup::service::{ChunkedTransferService, TransferEndpoint, TransferSummary};
use typed_builder::TypedBuilder;

const MIB: usize = 1024 * 1024;

#[derive(TypedBuilder, Clone)]
pub struct ChunkedTransferServiceImpl {
    #[builder(default = 128 * MIB)]
    chunk_size: usize,
    /// Discard what the destination holds past a short source.
    #[builder(default = true)]
    discard_excess_bytes: bool,
}

#[async_trait]
impl ChunkedTransferService for ChunkedTransferServiceImpl {
    async fn transfer(
        &self,
        src: &mut dyn TransferEndpoint,
        dst: &mut dyn TransferEndpoint,
        length: u64,
    ) -> anyhow::Result<TransferSummary> {
        anyhow::ensure!(self.chunk_size > 0, "Chunk size must be positive.");
        let mut hasher = blake3::Hasher::new();
        let mut offset = 0u64;
        while offset < length {
            let wanted = (length - offset).min(self.chunk_size as u64) as usize;
            let started = Instant::now();
            let mut data = src.read(offset, wanted).await?;
            if data.is_empty() {
                let excess = length - offset;
                tracing::debug!("Source ended at {offset} of {length} bytes.");
                if self.discard_excess_bytes {
                    self.discard_bytes(dst, offset, excess).await?;
                }
                break;
            }
            data.truncate(wanted);
            dst.write(&data, offset).await?;
            dst.flush().await?;
            hasher.update(&data);
            offset += data.len() as u64;

            let elapsed = started.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                tracing::debug!(
                    "Transferred chunk ending at {offset} of {length} bytes, {:.2} MiB/s.",
                    data.len() as f64 / MIB as f64 / elapsed
                );
            }
        }
        Ok(TransferSummary {
            bytes: offset,
            digest: hasher.finalize().to_hex().to_string(),
        })
    }

    async fn discard_bytes(
        &self,
        endpoint: &mut dyn TransferEndpoint,
        offset: u64,
        length: u64,
    ) -> anyhow::Result<()> {
        if length == 0 {
            return Ok(());
        }
        if endpoint.supports_discard() {
            tracing::debug!("Discarding {length} bytes at {offset}.");
            return endpoint.discard(offset, length).await;
        }
        anyhow::ensure!(self.chunk_size > 0, "Chunk size must be positive.");
        tracing::debug!("Endpoint can't discard, zeroing {length} bytes at {offset}.");
        let zeroes = vec![0u8; length.min(self.chunk_size as u64) as usize];
        let end = offset + length;
        let mut position = offset;
        while position < end {
            let size = (end - position).min(zeroes.len() as u64) as usize;
            endpoint.write(&zeroes[..size], position).await?;
            endpoint.flush().await?;
            position += size as u64;
        }
        Ok(())
    }
}
