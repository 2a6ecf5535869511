//! Block erasure coding over fixed-size chunks.
//!
//! Turns a byte blob into a stream of redundant `CHUNK_SIZE` chunks and
//! reassembles it from any sufficiently large subset, delivered in any order.
//! Three coding modes are selected by chunk count:
//!
//! - one chunk: plain repetition ([`repetition`]),
//! - a small number of chunks: an MDS Reed-Solomon code ([`small_code`]),
//! - everything larger: RaptorQ behind the [`codec::RatelessCodec`] adapter.

pub mod codec;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod raptor;
pub mod repetition;
pub mod small_code;
pub mod storage;
pub mod tracker;

#[cfg(test)]
pub(crate) mod mock_codec;

pub use blockfec_core::{chunk_count, Chunk, ChunkId, FecChunks, CHUNK_SIZE};
pub use codec::{ensure_initialized, CodecError, RatelessCodec};
pub use config::{CodingMode, FecConfig};
pub use decoder::FecDecoder;
pub use encoder::FecEncoder;
pub use error::FecError;
pub use raptor::RaptorQCodec;
pub use tracker::ChunkPresenceTracker;

/// Fills every slot of `chunks` with coded data for `data`.
///
/// Slots below the data chunk count receive systematic chunks; the rest
/// receive repair chunks with freshly drawn ids.
pub fn build_fec_chunks(data: &[u8], chunks: &mut FecChunks) -> Result<(), FecError> {
    build_fec_chunks_with_config(data, chunks, &FecConfig::default())
}

/// [`build_fec_chunks`] with an explicit coding configuration.
pub fn build_fec_chunks_with_config(
    data: &[u8],
    chunks: &mut FecChunks,
    config: &FecConfig,
) -> Result<(), FecError> {
    let slots = chunks.len();
    let mut encoder = FecEncoder::with_config(data, chunks, config)?;
    for slot in 0..slots {
        encoder.build_chunk(slot, false)?;
    }
    Ok(())
}
