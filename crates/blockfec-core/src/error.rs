use thiserror::Error;

use crate::types::CHUNK_SIZE;

/// Shared lightweight error type for chunk primitive operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A chunk payload did not have exactly `CHUNK_SIZE` bytes.
    #[error("chunk has {actual} bytes, expected {CHUNK_SIZE}")]
    ChunkLength { actual: usize },
    /// A destination slot index past the end of the chunk buffer.
    #[error("slot {slot} out of range for {slots} slots")]
    SlotOutOfRange { slot: usize, slots: usize },
}
