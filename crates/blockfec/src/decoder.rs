//! Stateful chunk decoder.
//!
//! Accepts chunks in any order, drops duplicates, and reports readiness once
//! the blob can be rebuilt. Received chunk bytes go to a [`ChunkStorage`],
//! which spills to a temp file for large sessions.

use blockfec_core::{Chunk, ChunkId, CHUNK_SIZE};

use crate::codec::RatelessCodec;
use crate::config::{CodingMode, FecConfig};
use crate::error::FecError;
use crate::raptor::RaptorQCodec;
use crate::repetition::RepetitionDecoder;
use crate::small_code::{self, MAX_TOTAL_SYMBOLS};
use crate::storage::ChunkStorage;
use crate::tracker::ChunkPresenceTracker;

enum DecodeState<D> {
    Repetition(RepetitionDecoder),
    /// Data chunks by position, filled in once solved.
    SmallCode { data: Option<Vec<Chunk>> },
    Rateless { state: D, id_limit: ChunkId },
}

/// Decoded content handed to an encoder by recovery construction.
pub(crate) enum DecodedSource<D> {
    Repetition(Box<Chunk>),
    SmallCode(Vec<Chunk>),
    Rateless(D),
}

pub(crate) struct DecodedSession<C: RatelessCodec> {
    pub(crate) codec: C,
    pub(crate) chunk_count: usize,
    pub(crate) storage: ChunkStorage,
    pub(crate) source: DecodedSource<C::Decoder>,
}

/// Reassembles one blob from chunks delivered in any order.
pub struct FecDecoder<C: RatelessCodec = RaptorQCodec> {
    codec: C,
    config: FecConfig,
    data_size: usize,
    chunk_count: usize,
    chunks_received: usize,
    ready: bool,
    tracker: ChunkPresenceTracker,
    storage: ChunkStorage,
    state: DecodeState<C::Decoder>,
    scratch: Box<Chunk>,
}

impl FecDecoder {
    /// Decoder for a blob of `data_size` bytes with the default config.
    pub fn new(data_size: usize) -> Result<Self, FecError> {
        Self::with_config(data_size, &FecConfig::default())
    }

    pub fn with_config(data_size: usize, config: &FecConfig) -> Result<Self, FecError> {
        Self::with_codec(data_size, config, RaptorQCodec)
    }
}

impl<C: RatelessCodec> FecDecoder<C> {
    /// Decoder that uses `codec` for rateless-mode sessions.
    pub fn with_codec(data_size: usize, config: &FecConfig, codec: C) -> Result<Self, FecError> {
        crate::codec::ensure_initialized();
        config.validate()?;
        let chunk_count = config.check_data_size(data_size)?;
        let state = match CodingMode::select(chunk_count, config) {
            CodingMode::Repetition => DecodeState::Repetition(RepetitionDecoder::default()),
            CodingMode::SmallCode => DecodeState::SmallCode { data: None },
            CodingMode::Rateless => DecodeState::Rateless {
                state: codec.init_decoder(data_size)?,
                id_limit: codec.repair_id_limit(chunk_count),
            },
        };
        Ok(Self {
            codec,
            config: config.clone(),
            data_size,
            chunk_count,
            chunks_received: 0,
            ready: false,
            tracker: ChunkPresenceTracker::new(chunk_count),
            storage: ChunkStorage::new(config.spill_threshold_bytes, config.spill_dir()),
            state,
            scratch: Box::new(Chunk::zeroed()),
        })
    }

    /// Feeds one chunk of exactly `CHUNK_SIZE` bytes.
    pub fn provide_chunk(&mut self, bytes: &[u8], id: ChunkId) -> Result<(), FecError> {
        let chunk = Chunk::from_slice(bytes)?;
        self.provide(&chunk, id)
    }

    /// Feeds one chunk.
    ///
    /// Duplicates and chunks arriving after readiness are accepted and
    /// ignored. An error leaves the session unusable: the caller should
    /// discard it.
    pub fn provide(&mut self, chunk: &Chunk, id: ChunkId) -> Result<(), FecError> {
        if self.ready {
            return Ok(());
        }
        let in_range = match &self.state {
            DecodeState::Repetition(_) => true,
            DecodeState::SmallCode { .. } => (id as usize) < MAX_TOTAL_SYMBOLS,
            DecodeState::Rateless { id_limit, .. } => id < *id_limit,
        };
        if !in_range {
            return Err(FecError::InvalidChunkId(id));
        }
        if self.tracker.mark_and_check_present(id) {
            return Ok(());
        }
        self.chunks_received += 1;

        let done = match &mut self.state {
            DecodeState::Repetition(dec) => dec.provide(chunk),
            DecodeState::SmallCode { .. } => {
                self.storage.push(id, chunk)?;
                self.storage.len() >= self.chunk_count && self.try_small_code_solve()?
            }
            DecodeState::Rateless { state, .. } => {
                self.storage.push(id, chunk)?;
                !self.codec.decoder_read(state, id, chunk)?
            }
        };
        if done {
            self.ready = true;
            tracing::debug!(
                chunk_count = self.chunk_count,
                chunks_received = self.chunks_received,
                "decode ready"
            );
        }
        Ok(())
    }

    /// Attempts the small-code solve, returning `true` once every data
    /// position is available.
    ///
    /// A solve whose estimated cost exceeds the work budget is deferred
    /// while more chunks may still complete the data set. It runs anyway
    /// once `small_code_max_deferred_chunks` chunks beyond the chunk count
    /// are stored, so a lost data chunk cannot stall the session.
    fn try_small_code_solve(&mut self) -> Result<bool, FecError> {
        let k = self.chunk_count;
        let mut present = vec![false; k];
        for id in self.storage.ids() {
            if let Some(flag) = present.get_mut(*id as usize) {
                *flag = true;
            }
        }
        let missing = present.iter().filter(|p| !**p).count();
        let cost = small_code::solve_cost(k, missing);
        let extra = self.storage.len().saturating_sub(k);
        if cost > self.config.small_code_work_budget
            && extra < self.config.small_code_max_deferred_chunks
        {
            tracing::debug!(
                chunk_count = k,
                missing,
                cost,
                budget = self.config.small_code_work_budget,
                "small code solve deferred"
            );
            return Ok(false);
        }

        let mut received = Vec::with_capacity(self.storage.len());
        let mut chunk = Chunk::zeroed();
        for slot in 0..self.storage.len() {
            let id = self.storage.ids()[slot];
            // With no data chunk missing the repair chunks are not needed.
            if missing == 0 && id as usize >= k {
                continue;
            }
            self.storage.read(slot, &mut chunk)?;
            received.push((id, chunk));
        }
        let data = small_code::reconstruct(k, received)?;
        self.state = DecodeState::SmallCode { data: Some(data) };
        Ok(true)
    }

    /// `true` if decoding finished or `id` was already accepted.
    pub fn has_chunk(&self, id: ChunkId) -> bool {
        self.ready || self.tracker.check_present(id)
    }

    pub fn decode_ready(&self) -> bool {
        self.ready
    }

    /// Original chunk at data `position`.
    ///
    /// The returned reference points into a scratch buffer that the next
    /// call overwrites.
    pub fn data_chunk(&mut self, position: usize) -> Result<&Chunk, FecError> {
        if !self.ready {
            return Err(FecError::NotReady);
        }
        if position >= self.chunk_count {
            return Err(FecError::PositionOutOfRange {
                position,
                chunk_count: self.chunk_count,
            });
        }
        match &mut self.state {
            DecodeState::Repetition(dec) => dec.chunk().ok_or(FecError::NotReady),
            DecodeState::SmallCode { data: Some(data) } => Ok(&data[position]),
            DecodeState::SmallCode { data: None } => Err(FecError::NotReady),
            DecodeState::Rateless { state, .. } => {
                self.codec
                    .decoder_reconstruct(state, position, &mut self.scratch)?;
                Ok(&*self.scratch)
            }
        }
    }

    /// The whole decoded blob, trimmed to its original length.
    pub fn decoded_data(&mut self) -> Result<Vec<u8>, FecError> {
        let mut out = Vec::with_capacity(self.chunk_count * CHUNK_SIZE);
        for position in 0..self.chunk_count {
            out.extend_from_slice(&self.data_chunk(position)?.0);
        }
        out.truncate(self.data_size);
        Ok(out)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn chunks_received(&self) -> usize {
        self.chunks_received
    }

    pub fn data_size(&self) -> usize {
        self.data_size
    }

    pub fn mode(&self) -> CodingMode {
        match self.state {
            DecodeState::Repetition(_) => CodingMode::Repetition,
            DecodeState::SmallCode { .. } => CodingMode::SmallCode,
            DecodeState::Rateless { .. } => CodingMode::Rateless,
        }
    }

    /// Ids of the received chunks held in storage, in arrival order.
    ///
    /// Data chunks rebuilt by a solve are kept apart and never listed.
    pub fn stored_chunk_ids(&self) -> &[ChunkId] {
        self.storage.ids()
    }

    pub fn is_spilled(&self) -> bool {
        self.storage.is_spilled()
    }

    pub fn spill_path(&self) -> Option<&std::path::Path> {
        self.storage.spill_path()
    }

    pub(crate) fn into_decoded(self) -> Result<DecodedSession<C>, FecError> {
        if !self.ready {
            return Err(FecError::NotReady);
        }
        let source = match self.state {
            DecodeState::Repetition(dec) => {
                DecodedSource::Repetition(dec.into_chunk().ok_or(FecError::NotReady)?)
            }
            DecodeState::SmallCode { data: Some(data) } => DecodedSource::SmallCode(data),
            DecodeState::SmallCode { data: None } => return Err(FecError::NotReady),
            DecodeState::Rateless { state, .. } => DecodedSource::Rateless(state),
        };
        Ok(DecodedSession {
            codec: self.codec,
            chunk_count: self.chunk_count,
            storage: self.storage,
            source,
        })
    }
}
