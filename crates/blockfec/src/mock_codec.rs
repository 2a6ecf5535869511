//! Deterministic stand-in for the rateless codec, used to test session
//! bookkeeping without running real erasure math.
//!
//! Repair chunk `id` carries the bytes of systematic chunk `id % k`, so any
//! `k` distinct ids whose residues cover every position reconstruct exactly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use blockfec_core::{chunk_count, Chunk, ChunkId, CHUNK_SIZE};

use crate::codec::{CodecError, RatelessCodec};

#[derive(Debug, Default)]
pub struct Counters {
    pub encoder_inits: AtomicUsize,
    pub decoder_inits: AtomicUsize,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
    pub frees: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockCodec {
    pub counters: Arc<Counters>,
    pub fail_reads: bool,
    pub fail_writes: bool,
}

pub struct MockEncoder {
    chunks: Vec<Chunk>,
    data_size: usize,
    counters: Arc<Counters>,
}

pub struct MockDecoder {
    chunk_count: usize,
    data_size: usize,
    received: HashMap<usize, Chunk>,
    distinct: usize,
    counters: Arc<Counters>,
}

impl Drop for MockEncoder {
    fn drop(&mut self) {
        self.counters.frees.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for MockDecoder {
    fn drop(&mut self) {
        self.counters.frees.fetch_add(1, Ordering::SeqCst);
    }
}

impl MockCodec {
    pub const ID_LIMIT: ChunkId = 1 << 20;
}

impl RatelessCodec for MockCodec {
    type Encoder = MockEncoder;
    type Decoder = MockDecoder;

    fn init_encoder(&self, data: &[u8]) -> Result<Self::Encoder, CodecError> {
        if data.is_empty() {
            return Err(CodecError::InvalidParameters("empty data"));
        }
        self.counters.encoder_inits.fetch_add(1, Ordering::SeqCst);
        Ok(MockEncoder {
            chunks: data.chunks(CHUNK_SIZE).map(Chunk::padded).collect(),
            data_size: data.len(),
            counters: Arc::clone(&self.counters),
        })
    }

    fn init_decoder(&self, data_size: usize) -> Result<Self::Decoder, CodecError> {
        if data_size == 0 {
            return Err(CodecError::InvalidParameters("empty data"));
        }
        self.counters.decoder_inits.fetch_add(1, Ordering::SeqCst);
        Ok(MockDecoder {
            chunk_count: chunk_count(data_size),
            data_size,
            received: HashMap::new(),
            distinct: 0,
            counters: Arc::clone(&self.counters),
        })
    }

    fn encoder_write(
        &self,
        encoder: &mut Self::Encoder,
        id: ChunkId,
        out: &mut Chunk,
    ) -> Result<usize, CodecError> {
        if self.fail_writes {
            return Err(CodecError::Backend("injected write failure"));
        }
        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        let k = encoder.chunks.len();
        let position = id as usize % k;
        *out = encoder.chunks[position];
        if id as usize == k - 1 {
            return Ok(encoder.data_size - (k - 1) * CHUNK_SIZE);
        }
        Ok(CHUNK_SIZE)
    }

    fn decoder_read(
        &self,
        decoder: &mut Self::Decoder,
        id: ChunkId,
        chunk: &Chunk,
    ) -> Result<bool, CodecError> {
        if self.fail_reads {
            return Err(CodecError::Backend("injected read failure"));
        }
        if id >= Self::ID_LIMIT {
            return Err(CodecError::IdOutOfRange {
                id,
                limit: Self::ID_LIMIT,
            });
        }
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        decoder.distinct += 1;
        decoder
            .received
            .entry(id as usize % decoder.chunk_count)
            .or_insert(*chunk);
        Ok(decoder.distinct < decoder.chunk_count)
    }

    fn decoder_reconstruct(
        &self,
        decoder: &mut Self::Decoder,
        position: usize,
        out: &mut Chunk,
    ) -> Result<(), CodecError> {
        if decoder.distinct < decoder.chunk_count {
            return Err(CodecError::NotDecoded);
        }
        *out = decoder
            .received
            .get(&position)
            .copied()
            .unwrap_or(Chunk([0xEE; CHUNK_SIZE]));
        Ok(())
    }

    fn decoder_into_encoder(&self, decoder: Self::Decoder) -> Result<Self::Encoder, CodecError> {
        if decoder.distinct < decoder.chunk_count {
            return Err(CodecError::NotDecoded);
        }
        let chunks = (0..decoder.chunk_count)
            .map(|p| decoder.received.get(&p).copied().unwrap_or_default())
            .collect();
        Ok(MockEncoder {
            chunks,
            data_size: decoder.data_size,
            counters: Arc::clone(&decoder.counters),
        })
    }

    fn repair_id_limit(&self, _chunk_count: usize) -> ChunkId {
        Self::ID_LIMIT
    }
}
