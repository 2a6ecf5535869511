use std::fmt;

use crate::error::CoreError;

/// Size in bytes of every chunk exchanged across the coding boundary.
pub const CHUNK_SIZE: usize = 1152;

/// Identifier of one chunk within a coding session.
///
/// Ids below the session's data chunk count address systematic chunks by
/// position; larger ids are repair chunks and carry no meaning beyond
/// uniqueness.
pub type ChunkId = u32;

const _: () = assert!(CHUNK_SIZE % 16 == 0);
const _: () = assert!(std::mem::size_of::<Chunk>() == CHUNK_SIZE);

/// One fixed-size, 16-byte aligned chunk block.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(C, align(16))]
pub struct Chunk(pub [u8; CHUNK_SIZE]);

impl Chunk {
    /// All-zero chunk.
    pub const fn zeroed() -> Self {
        Self([0_u8; CHUNK_SIZE])
    }

    /// Copies an exactly chunk-sized payload.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        let arr: [u8; CHUNK_SIZE] = bytes
            .try_into()
            .map_err(|_| CoreError::ChunkLength {
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Copies at most `CHUNK_SIZE` bytes of `bytes`, zero-padding the rest.
    pub fn padded(bytes: &[u8]) -> Self {
        let mut chunk = Self::zeroed();
        chunk.fill_padded(bytes);
        chunk
    }

    /// Overwrites this chunk with `bytes` followed by zero padding.
    pub fn fill_padded(&mut self, bytes: &[u8]) {
        let len = bytes.len().min(CHUNK_SIZE);
        self.0[..len].copy_from_slice(&bytes[..len]);
        self.0[len..].fill(0);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl Default for Chunk {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl AsRef<[u8]> for Chunk {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl AsMut<[u8]> for Chunk {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Chunk({:02x}{:02x}{:02x}{:02x}..)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

/// Number of chunks needed to carry `data_size` bytes.
pub const fn chunk_count(data_size: usize) -> usize {
    data_size.div_ceil(CHUNK_SIZE)
}
