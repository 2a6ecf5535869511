//! Lossy-link simulations driving the encoder and decoder end to end.

pub mod scenarios;

use std::time::Instant;

use blockfec::{
    build_fec_chunks_with_config, Chunk, ChunkId, CodingMode, FecChunks, FecConfig, FecDecoder,
    FecEncoder, FecError,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};
use serde::Serialize;

pub use scenarios::{practical_baseline, LossScenario, PRACTICAL_BASELINE};

#[derive(Debug, Clone)]
pub struct BroadcastParams {
    pub data_size: usize,
    pub loss_percent: u8,
    /// Repair slots sent on top of the data chunks.
    pub repair_slots: usize,
    pub seed: u64,
    /// Re-encode at an intermediate hop and send a second lossy leg.
    pub relay: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HopReport {
    pub sent: usize,
    pub lost: usize,
    pub chunks_received: usize,
    pub decoded: bool,
    pub data_matches: bool,
    pub spilled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastReport {
    pub seed: u64,
    pub data_size: usize,
    pub chunk_count: usize,
    pub mode: CodingMode,
    pub loss_percent: u8,
    pub first_hop: HopReport,
    pub relay_hop: Option<HopReport>,
    pub elapsed_ms: u128,
}

impl BroadcastReport {
    pub fn delivered(&self) -> bool {
        let relay_ok = self.relay_hop.as_ref().map_or(true, |hop| hop.data_matches);
        self.first_hop.data_matches && relay_ok
    }
}

fn random_blob(rng: &mut StdRng, len: usize) -> Vec<u8> {
    let mut out = vec![0_u8; len];
    rng.fill_bytes(&mut out);
    out
}

/// Shuffles `chunks`, drops each with `loss_percent` probability and feeds
/// the survivors to `decoder`.
fn lossy_leg(
    rng: &mut StdRng,
    chunks: &FecChunks,
    loss_percent: u8,
    decoder: &mut FecDecoder,
) -> Result<(usize, usize), FecError> {
    let mut sent: Vec<(ChunkId, Chunk)> = chunks.built().map(|(id, c)| (id, *c)).collect();
    sent.shuffle(rng);
    let mut lost = 0;
    for (id, chunk) in &sent {
        if rng.gen_range(0..100) < u32::from(loss_percent) {
            lost += 1;
            continue;
        }
        decoder.provide(chunk, *id)?;
    }
    Ok((sent.len(), lost))
}

fn hop_report(
    decoder: &mut FecDecoder,
    data: &[u8],
    sent: usize,
    lost: usize,
) -> Result<HopReport, FecError> {
    let decoded = decoder.decode_ready();
    let data_matches = decoded && decoder.decoded_data()? == data;
    Ok(HopReport {
        sent,
        lost,
        chunks_received: decoder.chunks_received(),
        decoded,
        data_matches,
        spilled: decoder.is_spilled(),
    })
}

/// Sends one random blob over one or two lossy legs and reports what
/// arrived.
pub fn run_broadcast(
    params: &BroadcastParams,
    config: &FecConfig,
) -> Result<BroadcastReport, FecError> {
    let started = Instant::now();
    let mut rng = StdRng::seed_from_u64(params.seed);
    let data = random_blob(&mut rng, params.data_size);

    let mut decoder = FecDecoder::with_config(data.len(), config)?;
    let chunk_count = decoder.chunk_count();
    let slots = chunk_count + params.repair_slots;
    let mut chunks = FecChunks::new(slots);
    build_fec_chunks_with_config(&data, &mut chunks, config)?;

    let (sent, lost) = lossy_leg(&mut rng, &chunks, params.loss_percent, &mut decoder)?;
    let first_hop = hop_report(&mut decoder, &data, sent, lost)?;
    tracing::info!(
        seed = params.seed,
        chunk_count,
        sent,
        lost,
        decoded = first_hop.decoded,
        "first hop finished"
    );
    let mode = decoder.mode();

    let relay_hop = if params.relay && first_hop.decoded {
        let mut forward = FecChunks::new(slots);
        let mut encoder = FecEncoder::from_decoder(decoder, &mut forward)?;
        encoder.prefill_chunks()?;
        for slot in 0..slots {
            encoder.build_chunk(slot, false)?;
        }
        drop(encoder);

        let mut downstream = FecDecoder::with_config(data.len(), config)?;
        let (sent, lost) = lossy_leg(&mut rng, &forward, params.loss_percent, &mut downstream)?;
        let hop = hop_report(&mut downstream, &data, sent, lost)?;
        tracing::info!(sent, lost, decoded = hop.decoded, "relay hop finished");
        Some(hop)
    } else {
        if params.relay {
            tracing::warn!("first hop did not decode, skipping relay");
        }
        None
    };

    Ok(BroadcastReport {
        seed: params.seed,
        data_size: params.data_size,
        chunk_count,
        mode,
        loss_percent: params.loss_percent,
        first_hop,
        relay_hop,
        elapsed_ms: started.elapsed().as_millis(),
    })
}
