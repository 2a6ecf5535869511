//! Chunk encoder writing into a caller-owned [`FecChunks`] buffer.

use blockfec_core::{Chunk, ChunkId, CoreError, FecChunks, CHUNK_SIZE};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::codec::RatelessCodec;
use crate::config::{CodingMode, FecConfig};
use crate::decoder::{DecodedSource, FecDecoder};
use crate::error::FecError;
use crate::raptor::RaptorQCodec;
use crate::repetition;
use crate::small_code::{self, SmallCodeEncoder, MAX_TOTAL_SYMBOLS};
use crate::storage::ChunkStorage;

enum EncodeState<E> {
    Repetition(Box<Chunk>),
    /// `start` offsets the repair id sequence so that independent encoders
    /// of the same blob tend to emit different repair chunks.
    SmallCode { encoder: SmallCodeEncoder, start: usize },
    Rateless { state: E, id_limit: ChunkId },
}

/// Builds coded chunks for one blob into a borrowed slot buffer.
///
/// Slot `i < chunk_count` always holds data chunk `i`. Remaining slots get
/// repair chunks with ids chosen by the coding mode.
pub struct FecEncoder<'a, C: RatelessCodec = RaptorQCodec> {
    codec: C,
    state: EncodeState<C::Encoder>,
    chunk_count: usize,
    chunks: &'a mut FecChunks,
    rng: StdRng,
    // Spill storage of a finished decoder, kept alive for the encoder's
    // lifetime and released with it.
    _inherited: Option<ChunkStorage>,
}

impl<'a> FecEncoder<'a> {
    pub fn new(data: &[u8], chunks: &'a mut FecChunks) -> Result<Self, FecError> {
        Self::with_config(data, chunks, &FecConfig::default())
    }

    pub fn with_config(
        data: &[u8],
        chunks: &'a mut FecChunks,
        config: &FecConfig,
    ) -> Result<Self, FecError> {
        Self::with_codec(data, chunks, config, RaptorQCodec, StdRng::from_entropy())
    }

    /// Encoder whose repair id choices are reproducible from `seed`.
    pub fn with_seed(data: &[u8], chunks: &'a mut FecChunks, seed: u64) -> Result<Self, FecError> {
        Self::with_codec(
            data,
            chunks,
            &FecConfig::default(),
            RaptorQCodec,
            StdRng::seed_from_u64(seed),
        )
    }
}

impl<'a, C: RatelessCodec> FecEncoder<'a, C> {
    pub fn with_codec(
        data: &[u8],
        chunks: &'a mut FecChunks,
        config: &FecConfig,
        codec: C,
        rng: StdRng,
    ) -> Result<Self, FecError> {
        crate::codec::ensure_initialized();
        config.validate()?;
        let chunk_count = config.check_data_size(data.len())?;
        let state = match CodingMode::select(chunk_count, config) {
            CodingMode::Repetition => {
                let mut chunk = Box::new(Chunk::zeroed());
                repetition::fill_chunk(data, &mut chunk);
                EncodeState::Repetition(chunk)
            }
            CodingMode::SmallCode => EncodeState::SmallCode {
                encoder: SmallCodeEncoder::new(data)?,
                start: 0,
            },
            CodingMode::Rateless => EncodeState::Rateless {
                state: codec.init_encoder(data)?,
                id_limit: codec.repair_id_limit(chunk_count),
            },
        };
        Self::assemble(codec, state, chunk_count, chunks, rng, None)
    }

    /// Turns a finished decoder into an encoder of the same blob.
    ///
    /// The decoder is consumed; its backing storage, including any spill
    /// file, now lives as long as the encoder.
    pub fn from_decoder(decoder: FecDecoder<C>, chunks: &'a mut FecChunks) -> Result<Self, FecError> {
        let session = decoder.into_decoded()?;
        let state = match session.source {
            DecodedSource::Repetition(chunk) => EncodeState::Repetition(chunk),
            DecodedSource::SmallCode(data) => EncodeState::SmallCode {
                encoder: SmallCodeEncoder::from_chunks(data)?,
                start: 0,
            },
            DecodedSource::Rateless(state) => EncodeState::Rateless {
                id_limit: session.codec.repair_id_limit(session.chunk_count),
                state: session.codec.decoder_into_encoder(state)?,
            },
        };
        tracing::debug!(
            chunk_count = session.chunk_count,
            spilled = session.storage.is_spilled(),
            "decoder handed over to encoder"
        );
        Self::assemble(
            session.codec,
            state,
            session.chunk_count,
            chunks,
            StdRng::from_entropy(),
            Some(session.storage),
        )
    }

    fn assemble(
        codec: C,
        mut state: EncodeState<C::Encoder>,
        chunk_count: usize,
        chunks: &'a mut FecChunks,
        mut rng: StdRng,
        inherited: Option<ChunkStorage>,
    ) -> Result<Self, FecError> {
        if let EncodeState::SmallCode { start, .. } = &mut state {
            if chunks.len() > MAX_TOTAL_SYMBOLS {
                return Err(FecError::TooManySlots {
                    slots: chunks.len(),
                    max: MAX_TOTAL_SYMBOLS,
                });
            }
            *start = rng.gen_range(0..small_code::repair_capacity(chunk_count));
        }
        Ok(Self {
            codec,
            state,
            chunk_count,
            chunks,
            rng,
            _inherited: inherited,
        })
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn mode(&self) -> CodingMode {
        match self.state {
            EncodeState::Repetition(_) => CodingMode::Repetition,
            EncodeState::SmallCode { .. } => CodingMode::SmallCode,
            EncodeState::Rateless { .. } => CodingMode::Rateless,
        }
    }

    fn next_id(&mut self, slot: usize) -> ChunkId {
        let k = self.chunk_count;
        match &self.state {
            EncodeState::Repetition(_) => slot as ChunkId,
            _ if slot < k => slot as ChunkId,
            EncodeState::SmallCode { start, .. } => {
                (k + (*start + slot - k) % small_code::repair_capacity(k)) as ChunkId
            }
            // The range starts at chunk_count >= 2, so the tracker's
            // sentinel id 0 is never drawn.
            EncodeState::Rateless { id_limit, .. } => self.rng.gen_range(k as ChunkId..*id_limit),
        }
    }

    /// Fills `slot` with a coded chunk and records its id.
    ///
    /// A slot that already holds a chunk is left alone unless `overwrite`
    /// is set; overwriting a repair slot may pick a new id.
    pub fn build_chunk(&mut self, slot: usize, overwrite: bool) -> Result<(), FecError> {
        let slots = self.chunks.len();
        if slot >= slots {
            return Err(CoreError::SlotOutOfRange { slot, slots }.into());
        }
        if !overwrite && self.chunks.is_built(slot) {
            return Ok(());
        }
        let id = self.next_id(slot);
        let out = self.chunks.slot_mut(slot)?;
        match &mut self.state {
            EncodeState::Repetition(chunk) => *out = **chunk,
            EncodeState::SmallCode { encoder, .. } => encoder.write(id, out)?,
            EncodeState::Rateless { state, .. } => {
                let len = self.codec.encoder_write(state, id, out)?;
                if len < CHUNK_SIZE {
                    out.0[len..].fill(0);
                }
            }
        }
        self.chunks.set_id(slot, id)?;
        Ok(())
    }

    /// Builds the last slot so a relay can forward it ahead of the rest.
    pub fn prefill_chunks(&mut self) -> Result<(), FecError> {
        match self.chunks.len() {
            0 => Ok(()),
            slots => self.build_chunk(slots - 1, false),
        }
    }
}

#[cfg(test)]
mod tests {
    use blockfec_core::{Chunk, FecChunks, CHUNK_SIZE};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::FecEncoder;
    use crate::config::{CodingMode, FecConfig};
    use crate::decoder::FecDecoder;
    use crate::error::FecError;
    use crate::mock_codec::{Counters, MockCodec};

    fn blob(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn mock_config() -> FecConfig {
        FecConfig {
            small_code_max_chunks: 1,
            ..FecConfig::default()
        }
    }

    #[test]
    fn systematic_slots_hold_data() {
        let data = blob(3000);
        let mut chunks = FecChunks::new(5);
        let mut encoder = FecEncoder::with_seed(&data, &mut chunks, 1).expect("encoder");
        assert_eq!(encoder.mode(), CodingMode::SmallCode);
        assert_eq!(encoder.chunk_count(), 3);
        for slot in 0..5 {
            encoder.build_chunk(slot, false).expect("build");
        }
        drop(encoder);

        for slot in 0..3 {
            assert_eq!(chunks.id(slot), Some(slot as u32));
        }
        let last = chunks.chunk(2).expect("slot 2");
        assert_eq!(&last.0[..3000 - 2 * CHUNK_SIZE], &data[2 * CHUNK_SIZE..]);
        assert!(last.0[3000 - 2 * CHUNK_SIZE..].iter().all(|b| *b == 0));
        for slot in 3..5 {
            let id = chunks.id(slot).expect("repair id");
            assert!((3..256).contains(&id));
        }
        assert_ne!(chunks.id(3), chunks.id(4));
    }

    #[test]
    fn repetition_ids_follow_slots() {
        let mut chunks = FecChunks::new(3);
        let mut encoder = FecEncoder::new(b"0123456789", &mut chunks).expect("encoder");
        assert_eq!(encoder.mode(), CodingMode::Repetition);
        for slot in 0..3 {
            encoder.build_chunk(slot, false).expect("build");
        }
        drop(encoder);
        for (slot, (id, chunk)) in chunks.built().enumerate() {
            assert_eq!(id, slot as u32);
            assert_eq!(&chunk.0[..10], b"0123456789");
        }
    }

    #[test]
    fn built_slot_is_kept_without_overwrite() {
        let data = blob(3000);
        let mut chunks = FecChunks::new(4);
        let mut encoder = FecEncoder::with_seed(&data, &mut chunks, 2).expect("encoder");
        encoder.build_chunk(3, false).expect("build");
        encoder.build_chunk(3, false).expect("skip");
        drop(encoder);
        let id = chunks.id(3).expect("built");
        *chunks.slot_mut(3).expect("slot") = Chunk([0x55; CHUNK_SIZE]);
        chunks.set_id(3, id).expect("id");

        let mut encoder = FecEncoder::with_seed(&data, &mut chunks, 2).expect("encoder");
        encoder.build_chunk(3, false).expect("skip");
        drop(encoder);
        assert_eq!(chunks.chunk(3), Some(&Chunk([0x55; CHUNK_SIZE])));

        let mut encoder = FecEncoder::with_seed(&data, &mut chunks, 2).expect("encoder");
        encoder.build_chunk(3, true).expect("overwrite");
        drop(encoder);
        assert_ne!(chunks.chunk(3), Some(&Chunk([0x55; CHUNK_SIZE])));
    }

    #[test]
    fn slot_out_of_range() {
        let mut chunks = FecChunks::new(2);
        let mut encoder = FecEncoder::new(&blob(100), &mut chunks).expect("encoder");
        assert!(matches!(encoder.build_chunk(2, false), Err(FecError::Core(_))));
    }

    #[test]
    fn small_code_caps_slots() {
        let mut chunks = FecChunks::new(257);
        assert!(matches!(
            FecEncoder::new(&blob(3000), &mut chunks),
            Err(FecError::TooManySlots {
                slots: 257,
                max: 256
            })
        ));
    }

    #[test]
    fn empty_and_oversized_data_rejected() {
        let mut chunks = FecChunks::new(2);
        assert!(matches!(
            FecEncoder::new(&[], &mut chunks),
            Err(FecError::EmptyData)
        ));
        let config = FecConfig {
            max_data_size: 100,
            ..FecConfig::default()
        };
        assert!(matches!(
            FecEncoder::with_config(&blob(101), &mut chunks, &config),
            Err(FecError::DataTooLarge { size: 101, max: 100 })
        ));
    }

    #[test]
    fn prefill_builds_last_slot_only() {
        let data = blob(5000);
        let mut chunks = FecChunks::new(7);
        let mut encoder = FecEncoder::new(&data, &mut chunks).expect("encoder");
        encoder.prefill_chunks().expect("prefill");
        drop(encoder);
        assert!(chunks.is_built(6));
        assert!((0..6).all(|slot| !chunks.is_built(slot)));
    }

    #[test]
    fn rateless_repair_ids_are_in_range_and_padded() {
        let codec = MockCodec::default();
        let counters = codec.counters.clone();
        let data = blob(3 * CHUNK_SIZE + 10);
        let mut chunks = FecChunks::new(10);
        let mut encoder = FecEncoder::with_codec(
            &data,
            &mut chunks,
            &mock_config(),
            codec,
            StdRng::seed_from_u64(4),
        )
        .expect("encoder");
        assert_eq!(encoder.mode(), CodingMode::Rateless);
        for slot in 0..10 {
            encoder.build_chunk(slot, false).expect("build");
        }
        drop(encoder);

        assert_eq!(Counters::get(&counters.encoder_inits), 1);
        assert_eq!(Counters::get(&counters.writes), 10);
        assert_eq!(Counters::get(&counters.frees), 1);
        let last = chunks.chunk(3).expect("last data chunk");
        assert!(last.0[10..].iter().all(|b| *b == 0));
        for slot in 4..10 {
            let id = chunks.id(slot).expect("id");
            assert!((4..MockCodec::ID_LIMIT).contains(&id));
        }
    }

    #[test]
    fn codec_write_failure_leaves_slot_unbuilt() {
        let codec = MockCodec {
            fail_writes: true,
            ..MockCodec::default()
        };
        let mut chunks = FecChunks::new(5);
        let mut encoder = FecEncoder::with_codec(
            &blob(4 * CHUNK_SIZE),
            &mut chunks,
            &mock_config(),
            codec,
            StdRng::seed_from_u64(0),
        )
        .expect("encoder");
        assert!(matches!(encoder.build_chunk(4, false), Err(FecError::Codec(_))));
        drop(encoder);
        assert!(!chunks.is_built(4));
    }

    #[test]
    fn recovery_requires_finished_decoder() {
        let decoder = FecDecoder::new(3000).expect("decoder");
        let mut chunks = FecChunks::new(4);
        assert!(matches!(
            FecEncoder::from_decoder(decoder, &mut chunks),
            Err(FecError::NotReady)
        ));
    }

    #[test]
    fn recovered_encoder_matches_original_data_chunks() {
        let data = blob(5 * CHUNK_SIZE - 3);
        let mut sent = FecChunks::new(9);
        let mut encoder = FecEncoder::with_seed(&data, &mut sent, 8).expect("encoder");
        for slot in 0..9 {
            encoder.build_chunk(slot, false).expect("build");
        }
        drop(encoder);

        let mut decoder = FecDecoder::new(data.len()).expect("decoder");
        for (id, chunk) in sent.built().skip(3) {
            decoder.provide(chunk, id).expect("provide");
        }
        assert!(decoder.decode_ready());

        let mut relayed = FecChunks::new(9);
        let mut relay = FecEncoder::from_decoder(decoder, &mut relayed).expect("recovered");
        for slot in 0..9 {
            relay.build_chunk(slot, false).expect("build");
        }
        drop(relay);
        for slot in 0..5 {
            assert_eq!(relayed.chunk(slot), sent.chunk(slot));
        }

        // Relayed repair chunks decode on their own.
        let mut downstream = FecDecoder::new(data.len()).expect("decoder");
        for (id, chunk) in relayed.built().skip(4) {
            downstream.provide(chunk, id).expect("provide");
        }
        assert!(downstream.decode_ready());
        assert_eq!(downstream.decoded_data().expect("data"), data);
    }

    #[test]
    fn recovery_keeps_rateless_state() {
        let codec = MockCodec::default();
        let counters = codec.counters.clone();
        let data = blob(4 * CHUNK_SIZE);
        let mut decoder =
            FecDecoder::with_codec(data.len(), &mock_config(), codec).expect("decoder");
        for position in 0..4 {
            let start = position * CHUNK_SIZE;
            decoder
                .provide(&Chunk::padded(&data[start..start + CHUNK_SIZE]), position as u32 + 4)
                .expect("provide");
        }
        assert!(decoder.decode_ready());

        let mut chunks = FecChunks::new(4);
        let mut encoder = FecEncoder::from_decoder(decoder, &mut chunks).expect("recovered");
        assert_eq!(encoder.mode(), CodingMode::Rateless);
        for slot in 0..4 {
            encoder.build_chunk(slot, false).expect("build");
        }
        drop(encoder);
        assert_eq!(Counters::get(&counters.encoder_inits), 0);
        // One for the consumed decoder state, one for the encoder.
        assert_eq!(Counters::get(&counters.frees), 2);
        for slot in 0..4 {
            let start = slot * CHUNK_SIZE;
            assert_eq!(&chunks.chunk(slot).expect("built").0[..], &data[start..start + CHUNK_SIZE]);
        }
    }
}
