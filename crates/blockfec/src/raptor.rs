//! RaptorQ (RFC 6330) binding for the [`RatelessCodec`] adapter.
//!
//! Each session is a single RaptorQ source block whose symbols are chunks.
//! Chunk ids are encoding symbol ids: `raptorq` tags repair packets with
//! them and maps them past the extended block's padding symbols itself.
//! The repair id limit keeps that internal index within 24 bits.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, OnceLock};

use blockfec_core::{chunk_count, Chunk, ChunkId, CHUNK_SIZE};
use lru::LruCache;
use raptorq::{
    extended_source_block_symbols, EncodingPacket, ObjectTransmissionInformation, PayloadId,
    SourceBlockDecoder, SourceBlockEncoder, SourceBlockEncodingPlan,
};

use crate::codec::{CodecError, RatelessCodec};

/// Largest number of source symbols in one RaptorQ source block.
pub const MAX_SOURCE_SYMBOLS: usize = 56403;

/// Symbol indexes are 24 bits wide on the wire.
const SYMBOL_INDEX_LIMIT: u32 = 1 << 24;

const PLAN_CACHE_CAPACITY: usize = 16;

type PlanCache = Mutex<LruCache<u16, Arc<SourceBlockEncodingPlan>>>;

static PLAN_CACHE: OnceLock<PlanCache> = OnceLock::new();

pub(crate) fn init_plan_cache() -> &'static PlanCache {
    PLAN_CACHE.get_or_init(|| {
        let capacity = NonZeroUsize::new(PLAN_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Mutex::new(LruCache::new(capacity))
    })
}

/// Encoding plans are costly to generate and only depend on the symbol count.
fn encoding_plan(source_symbols: u16) -> Arc<SourceBlockEncodingPlan> {
    let cache = init_plan_cache();
    if let Some(plan) = cache
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .get(&source_symbols)
    {
        return Arc::clone(plan);
    }

    let plan = Arc::new(SourceBlockEncodingPlan::generate(source_symbols));
    cache
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .put(source_symbols, Arc::clone(&plan));
    plan
}

fn transmission_info(block_length: usize) -> ObjectTransmissionInformation {
    ObjectTransmissionInformation::new(block_length as u64, CHUNK_SIZE as u16, 1, 1, 8)
}

fn padding_symbols(source_symbols: usize) -> u32 {
    let k = source_symbols as u32;
    extended_source_block_symbols(k) - k
}

fn validate_size(data_size: usize) -> Result<usize, CodecError> {
    if data_size == 0 {
        return Err(CodecError::InvalidParameters("empty data"));
    }
    let k = chunk_count(data_size);
    if k > MAX_SOURCE_SYMBOLS {
        return Err(CodecError::InvalidParameters(
            "data exceeds a single source block",
        ));
    }
    Ok(k)
}

/// Production [`RatelessCodec`] backed by the `raptorq` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct RaptorQCodec;

/// Encoder session state. Holds the zero-padded source block.
pub struct RaptorQEncoderState {
    inner: SourceBlockEncoder,
    block: Vec<u8>,
    data_size: usize,
    chunk_count: usize,
    id_limit: ChunkId,
}

impl RaptorQEncoderState {
    fn from_block(block: Vec<u8>, data_size: usize, chunk_count: usize) -> Self {
        let plan = encoding_plan(chunk_count as u16);
        let inner = SourceBlockEncoder::with_encoding_plan(
            0,
            &transmission_info(block.len()),
            &block,
            &plan,
        );
        Self {
            inner,
            block,
            data_size,
            chunk_count,
            id_limit: RaptorQCodec.repair_id_limit(chunk_count),
        }
    }
}

/// Decoder session state.
pub struct RaptorQDecoderState {
    inner: SourceBlockDecoder,
    data_size: usize,
    chunk_count: usize,
    id_limit: ChunkId,
    decoded: Option<Vec<u8>>,
}

impl RatelessCodec for RaptorQCodec {
    type Encoder = RaptorQEncoderState;
    type Decoder = RaptorQDecoderState;

    fn init_encoder(&self, data: &[u8]) -> Result<Self::Encoder, CodecError> {
        crate::codec::ensure_initialized();
        let k = validate_size(data.len())?;
        let mut block = Vec::with_capacity(k * CHUNK_SIZE);
        block.extend_from_slice(data);
        block.resize(k * CHUNK_SIZE, 0);
        Ok(RaptorQEncoderState::from_block(block, data.len(), k))
    }

    fn init_decoder(&self, data_size: usize) -> Result<Self::Decoder, CodecError> {
        crate::codec::ensure_initialized();
        let k = validate_size(data_size)?;
        let block_length = k * CHUNK_SIZE;
        Ok(RaptorQDecoderState {
            inner: SourceBlockDecoder::new(
                0,
                &transmission_info(block_length),
                block_length as u64,
            ),
            data_size,
            chunk_count: k,
            id_limit: self.repair_id_limit(k),
            decoded: None,
        })
    }

    fn encoder_write(
        &self,
        encoder: &mut Self::Encoder,
        id: ChunkId,
        out: &mut Chunk,
    ) -> Result<usize, CodecError> {
        let position = id as usize;
        if position < encoder.chunk_count {
            let start = position * CHUNK_SIZE;
            let len = encoder.data_size.saturating_sub(start).min(CHUNK_SIZE);
            out.fill_padded(&encoder.block[start..start + len]);
            return Ok(len);
        }
        if id >= encoder.id_limit {
            return Err(CodecError::IdOutOfRange {
                id,
                limit: encoder.id_limit,
            });
        }

        let packet = encoder
            .inner
            .repair_packets(id - encoder.chunk_count as u32, 1)
            .into_iter()
            .next()
            .ok_or(CodecError::Backend("no repair packet produced"))?;
        if packet.data().len() != CHUNK_SIZE {
            return Err(CodecError::Backend("repair packet has unexpected size"));
        }
        out.0.copy_from_slice(packet.data());
        Ok(CHUNK_SIZE)
    }

    fn decoder_read(
        &self,
        decoder: &mut Self::Decoder,
        id: ChunkId,
        chunk: &Chunk,
    ) -> Result<bool, CodecError> {
        if decoder.decoded.is_some() {
            return Ok(false);
        }
        if id >= decoder.id_limit {
            return Err(CodecError::IdOutOfRange {
                id,
                limit: decoder.id_limit,
            });
        }

        let packet = EncodingPacket::new(PayloadId::new(0, id), chunk.0.to_vec());
        match decoder.inner.decode(std::iter::once(packet)) {
            Some(block) => {
                decoder.decoded = Some(block);
                Ok(false)
            }
            None => Ok(true),
        }
    }

    fn decoder_reconstruct(
        &self,
        decoder: &mut Self::Decoder,
        position: usize,
        out: &mut Chunk,
    ) -> Result<(), CodecError> {
        let block = decoder.decoded.as_ref().ok_or(CodecError::NotDecoded)?;
        if position >= decoder.chunk_count {
            return Err(CodecError::PositionOutOfRange {
                position,
                chunk_count: decoder.chunk_count,
            });
        }
        let start = position * CHUNK_SIZE;
        out.fill_padded(block.get(start..).unwrap_or_default());
        Ok(())
    }

    fn decoder_into_encoder(&self, decoder: Self::Decoder) -> Result<Self::Encoder, CodecError> {
        let mut block = decoder.decoded.ok_or(CodecError::NotDecoded)?;
        let block_length = decoder.chunk_count * CHUNK_SIZE;
        block.resize(block_length, 0);
        // Bytes past the blob are padding and must be zero to match a fresh encoder.
        block[decoder.data_size..].fill(0);
        Ok(RaptorQEncoderState::from_block(
            block,
            decoder.data_size,
            decoder.chunk_count,
        ))
    }

    fn repair_id_limit(&self, chunk_count: usize) -> ChunkId {
        if chunk_count == 0 || chunk_count > MAX_SOURCE_SYMBOLS {
            return chunk_count.min(MAX_SOURCE_SYMBOLS) as ChunkId;
        }
        SYMBOL_INDEX_LIMIT - padding_symbols(chunk_count)
    }
}
