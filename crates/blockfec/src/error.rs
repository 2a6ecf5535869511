use blockfec_core::{ChunkId, CoreError};
use thiserror::Error;

use crate::codec::CodecError;
use crate::storage::StorageError;

/// Errors returned by encoder/decoder operations.
#[derive(Debug, Error)]
pub enum FecError {
    #[error("empty data")]
    EmptyData,
    #[error("data of {size} bytes exceeds the {max} byte limit")]
    DataTooLarge { size: usize, max: usize },
    #[error("{slots} slots exceed the {max} distinct chunks this mode can produce")]
    TooManySlots { slots: usize, max: usize },
    #[error("chunk id {0} is outside this session's id space")]
    InvalidChunkId(ChunkId),
    #[error("decode not ready")]
    NotReady,
    #[error("position {position} out of range for {chunk_count} data chunks")]
    PositionOutOfRange { position: usize, chunk_count: usize },
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("reed-solomon error: {0}")]
    ReedSolomon(reed_solomon_erasure::Error),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
