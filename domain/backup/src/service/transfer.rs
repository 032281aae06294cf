use async_trait::async_trait;

use super::TransferEndpoint;

/// What a chunked transfer moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSummary {
    /// Bytes read from the source and written to the destination.
    pub bytes: u64,
    /// Hex BLAKE3 digest of those bytes.
    pub digest: String,
}

/// Backend agnostic copy between two endpoints.
#[async_trait]
pub trait ChunkedTransferService: Send + Sync {
    /// Copy `length` bytes from the start of `src` to the start of `dst`.
    async fn transfer(
        &self,
        src: &mut dyn TransferEndpoint,
        dst: &mut dyn TransferEndpoint,
        length: u64,
    ) -> anyhow::Result<TransferSummary>;

    /// Deallocate `[offset, offset + length)` of the endpoint, or zero it
    /// when the endpoint can't discard.
    async fn discard_bytes(
        &self,
        endpoint: &mut dyn TransferEndpoint,
        offset: u64,
        length: u64,
    ) -> anyhow::Result<()>;
}
