//! Core blockfec primitives shared across crates.
//!
//! Includes the fixed-size chunk block, chunk identifiers, the destination
//! chunk buffer filled by encoders, and base errors.

pub mod chunks;
pub mod error;
pub mod types;

pub use chunks::FecChunks;
pub use error::CoreError;
pub use types::{chunk_count, Chunk, ChunkId, CHUNK_SIZE};
