//! Adapter boundary for the rateless erasure code.
//!
//! A codec owns per-session encoder/decoder state. Dropping the state frees
//! it, so a state that has been moved elsewhere (for example from a decoder
//! into an encoder) is released exactly once by its final owner.

use std::sync::Once;

use blockfec_core::{Chunk, ChunkId, CHUNK_SIZE};
use thiserror::Error;

/// Errors reported by a codec adapter.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid codec parameters: {0}")]
    InvalidParameters(&'static str),
    #[error("chunk id {id} outside codec range (limit {limit})")]
    IdOutOfRange { id: ChunkId, limit: ChunkId },
    #[error("decoder has not finished")]
    NotDecoded,
    #[error("position {position} out of range for {chunk_count} chunks")]
    PositionOutOfRange { position: usize, chunk_count: usize },
    #[error("codec backend failure: {0}")]
    Backend(&'static str),
}

/// Stateful rateless erasure code.
///
/// Chunk ids below the session's chunk count are systematic positions;
/// ids in `[chunk_count, repair_id_limit)` are repair symbols.
pub trait RatelessCodec {
    type Encoder;
    type Decoder;

    /// Starts an encoding session over `data`.
    fn init_encoder(&self, data: &[u8]) -> Result<Self::Encoder, CodecError>;

    /// Starts a decoding session for a blob of `data_size` bytes.
    fn init_decoder(&self, data_size: usize) -> Result<Self::Decoder, CodecError>;

    /// Writes chunk `id` into `out`, returning how many bytes are meaningful.
    ///
    /// Only the final systematic chunk may be short; the caller zero-pads.
    fn encoder_write(
        &self,
        encoder: &mut Self::Encoder,
        id: ChunkId,
        out: &mut Chunk,
    ) -> Result<usize, CodecError>;

    /// Feeds one chunk, returning `true` while more chunks are needed.
    fn decoder_read(
        &self,
        decoder: &mut Self::Decoder,
        id: ChunkId,
        chunk: &Chunk,
    ) -> Result<bool, CodecError>;

    /// Reproduces the original chunk at `position` once decoding finished.
    fn decoder_reconstruct(
        &self,
        decoder: &mut Self::Decoder,
        position: usize,
        out: &mut Chunk,
    ) -> Result<(), CodecError>;

    /// Turns a finished decoder into an encoder for the same blob.
    fn decoder_into_encoder(&self, decoder: Self::Decoder) -> Result<Self::Encoder, CodecError>;

    /// Exclusive upper bound for repair ids of a `chunk_count` session.
    fn repair_id_limit(&self, chunk_count: usize) -> ChunkId;
}

static INIT: Once = Once::new();

/// Runs process-wide codec setup. Safe to call from any thread, any number
/// of times; only the first call does work.
pub fn ensure_initialized() {
    INIT.call_once(|| {
        crate::raptor::init_plan_cache();
        tracing::debug!(chunk_size = CHUNK_SIZE, "blockfec codec initialized");
    });
}
