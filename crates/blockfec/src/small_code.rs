//! Combinatorial small-N code: systematic Reed-Solomon over GF(256).
//!
//! The code always spans the full 256-symbol field, so chunk ids are the
//! codeword indexes themselves: `[0, k)` for data and `[k, 256)` for repair.
//! Any `k` distinct chunks reconstruct the data.

use blockfec_core::{Chunk, ChunkId, CHUNK_SIZE};
use reed_solomon_erasure::galois_8::ReedSolomon;

use crate::error::FecError;

/// Codeword length of the GF(256) code.
pub const MAX_TOTAL_SYMBOLS: usize = 256;

/// Number of distinct repair ids available to a `chunk_count` session.
pub fn repair_capacity(chunk_count: usize) -> usize {
    MAX_TOTAL_SYMBOLS.saturating_sub(chunk_count)
}

fn reed_solomon(chunk_count: usize) -> Result<ReedSolomon, FecError> {
    ReedSolomon::new(chunk_count, repair_capacity(chunk_count)).map_err(FecError::ReedSolomon)
}

/// Estimated multiply-adds to recover `missing` data chunks: one matrix
/// inversion plus one row product per missing chunk.
pub fn solve_cost(chunk_count: usize, missing: usize) -> u64 {
    let k = chunk_count as u64;
    if missing == 0 {
        return 0;
    }
    missing as u64 * k * CHUNK_SIZE as u64 + k * k * k
}

/// Encoder over an in-memory copy of the data chunks.
///
/// Repair chunks are computed together on first use and cached.
pub struct SmallCodeEncoder {
    rs: ReedSolomon,
    data: Vec<Chunk>,
    repair: Option<Vec<Chunk>>,
}

impl SmallCodeEncoder {
    pub fn new(data: &[u8]) -> Result<Self, FecError> {
        Self::from_chunks(data.chunks(CHUNK_SIZE).map(Chunk::padded).collect())
    }

    /// Builds an encoder from already padded data chunks.
    pub fn from_chunks(data: Vec<Chunk>) -> Result<Self, FecError> {
        Ok(Self {
            rs: reed_solomon(data.len())?,
            data,
            repair: None,
        })
    }

    pub fn chunk_count(&self) -> usize {
        self.data.len()
    }

    /// Writes codeword symbol `id` into `out`.
    pub fn write(&mut self, id: ChunkId, out: &mut Chunk) -> Result<(), FecError> {
        let idx = id as usize;
        let k = self.data.len();
        if idx < k {
            *out = self.data[idx];
            return Ok(());
        }
        if idx >= MAX_TOTAL_SYMBOLS {
            return Err(FecError::InvalidChunkId(id));
        }
        let repair = match self.repair.take() {
            Some(repair) => repair,
            None => {
                let mut repair = vec![Chunk::zeroed(); repair_capacity(k)];
                self.rs
                    .encode_sep(&self.data, &mut repair)
                    .map_err(FecError::ReedSolomon)?;
                tracing::trace!(chunk_count = k, "small code repair chunks computed");
                repair
            }
        };
        *out = repair[idx - k];
        self.repair = Some(repair);
        Ok(())
    }
}

/// Recovers all `chunk_count` data chunks from at least `chunk_count`
/// distinct `(id, chunk)` pairs.
pub fn reconstruct(
    chunk_count: usize,
    received: impl IntoIterator<Item = (ChunkId, Chunk)>,
) -> Result<Vec<Chunk>, FecError> {
    let rs = reed_solomon(chunk_count)?;
    let mut shards: Vec<Option<Vec<u8>>> = vec![None; MAX_TOTAL_SYMBOLS];
    for (id, chunk) in received {
        let slot = shards
            .get_mut(id as usize)
            .ok_or(FecError::InvalidChunkId(id))?;
        *slot = Some(chunk.0.to_vec());
    }
    rs.reconstruct_data(&mut shards)
        .map_err(FecError::ReedSolomon)?;

    shards
        .into_iter()
        .take(chunk_count)
        .map(|shard| -> Result<Chunk, FecError> {
            let bytes = shard.ok_or(FecError::NotReady)?;
            Ok(Chunk::from_slice(&bytes)?)
        })
        .collect()
}
