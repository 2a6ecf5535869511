//! Fixed-rate fallback for blobs that fit in a single chunk.
//!
//! Every coded chunk is the blob itself, zero-padded; any one chunk decodes.

use blockfec_core::{Chunk, CHUNK_SIZE};

/// Writes the single-chunk blob `data` into `out`.
pub fn fill_chunk(data: &[u8], out: &mut Chunk) {
    debug_assert!(data.len() <= CHUNK_SIZE);
    out.fill_padded(data);
}

/// Decoder side: keeps the first chunk delivered and ignores the rest.
#[derive(Debug, Clone, Default)]
pub struct RepetitionDecoder {
    chunk: Option<Box<Chunk>>,
}

impl RepetitionDecoder {
    /// Accepts a chunk, returning `true` if it completed decoding.
    pub fn provide(&mut self, chunk: &Chunk) -> bool {
        if self.chunk.is_some() {
            return false;
        }
        self.chunk = Some(Box::new(*chunk));
        true
    }

    pub fn is_ready(&self) -> bool {
        self.chunk.is_some()
    }

    pub fn chunk(&self) -> Option<&Chunk> {
        self.chunk.as_deref()
    }

    pub fn into_chunk(self) -> Option<Box<Chunk>> {
        self.chunk
    }
}
