use std::path::PathBuf;

use blockfec_core::CHUNK_SIZE;
use serde::{Deserialize, Serialize};

use crate::error::FecError;
use crate::raptor::MAX_SOURCE_SYMBOLS;
use crate::small_code::MAX_TOTAL_SYMBOLS;

/// Tunable coding policy shared by encoders and decoders.
///
/// Both ends of a session must agree on `small_code_max_chunks`, since it
/// decides which code produced the repair chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FecConfig {
    /// Largest chunk count coded with the small Reed-Solomon code.
    pub small_code_max_chunks: usize,
    /// Work budget, in GF(256) multiply-adds, for one small-code solve.
    pub small_code_work_budget: u64,
    /// Extra chunks past the chunk count after which an over-budget solve
    /// runs anyway.
    pub small_code_max_deferred_chunks: usize,
    /// Stored chunk bytes above which a decoder spills to a temp file.
    pub spill_threshold_bytes: usize,
    /// Directory for spill files. `None` uses the OS temp dir.
    pub spill_dir: Option<PathBuf>,
    /// Largest accepted blob.
    pub max_data_size: usize,
}

impl Default for FecConfig {
    fn default() -> Self {
        Self {
            small_code_max_chunks: 27,
            small_code_work_budget: 8_000_000,
            small_code_max_deferred_chunks: 16,
            spill_threshold_bytes: 1024 * 1024,
            spill_dir: None,
            max_data_size: MAX_SOURCE_SYMBOLS * CHUNK_SIZE,
        }
    }
}

impl FecConfig {
    pub fn validate(&self) -> Result<(), FecError> {
        if self.small_code_max_chunks > MAX_TOTAL_SYMBOLS / 2 {
            return Err(FecError::InvalidConfig(
                "small_code_max_chunks must leave room for repair ids",
            ));
        }
        if self.max_data_size == 0 || self.max_data_size > MAX_SOURCE_SYMBOLS * CHUNK_SIZE {
            return Err(FecError::InvalidConfig(
                "max_data_size must fit one rateless source block",
            ));
        }
        Ok(())
    }

    pub fn spill_dir(&self) -> PathBuf {
        self.spill_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Validates a blob size against this config, returning its chunk count.
    pub(crate) fn check_data_size(&self, data_size: usize) -> Result<usize, FecError> {
        if data_size == 0 {
            return Err(FecError::EmptyData);
        }
        if data_size > self.max_data_size {
            return Err(FecError::DataTooLarge {
                size: data_size,
                max: self.max_data_size,
            });
        }
        Ok(blockfec_core::chunk_count(data_size))
    }
}

/// Which code a session of a given chunk count uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CodingMode {
    /// One chunk, repeated verbatim.
    Repetition,
    /// Systematic Reed-Solomon over GF(256) with at most 256 distinct chunks.
    SmallCode,
    /// RaptorQ through the rateless codec adapter.
    Rateless,
}

impl CodingMode {
    pub fn select(chunk_count: usize, config: &FecConfig) -> Self {
        if chunk_count < 2 {
            Self::Repetition
        } else if chunk_count <= config.small_code_max_chunks {
            Self::SmallCode
        } else {
            Self::Rateless
        }
    }
}
