//! Decoder backing store for received chunk bytes.
//!
//! Chunks are kept in memory until their total size crosses a threshold,
//! after which every stored chunk moves into a uniquely named temp file and
//! later chunks are appended there. The file lives exactly as long as the
//! storage value, so moving the storage moves responsibility for deleting it.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use blockfec_core::{Chunk, ChunkId, CHUNK_SIZE};
use tempfile::NamedTempFile;
use thiserror::Error;

static SPILL_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Errors returned by chunk storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to create spill file in {dir}: {source}")]
    CreateSpill { dir: PathBuf, source: io::Error },
    #[error("failed to write spill file: {0}")]
    Write(io::Error),
    #[error("failed to read spill file: {0}")]
    Read(io::Error),
    #[error("slot {slot} out of range for {len} stored chunks")]
    SlotOutOfRange { slot: usize, len: usize },
}

/// Append-only sequence of `(id, chunk)` slots.
#[derive(Debug)]
pub struct ChunkStorage {
    ids: Vec<ChunkId>,
    memory: Vec<Chunk>,
    spill: Option<NamedTempFile>,
    spill_threshold_bytes: usize,
    spill_dir: PathBuf,
}

impl ChunkStorage {
    pub fn new(spill_threshold_bytes: usize, spill_dir: PathBuf) -> Self {
        Self {
            ids: Vec::new(),
            memory: Vec::new(),
            spill: None,
            spill_threshold_bytes,
            spill_dir,
        }
    }

    /// Appends a chunk, returning its slot.
    pub fn push(&mut self, id: ChunkId, chunk: &Chunk) -> Result<usize, StorageError> {
        let slot = self.ids.len();
        if self.spill.is_none() && (slot + 1) * CHUNK_SIZE > self.spill_threshold_bytes {
            self.spill_to_file()?;
        }
        match self.spill.as_mut() {
            Some(file) => write_slot(file.as_file_mut(), slot, chunk).map_err(StorageError::Write)?,
            None => self.memory.push(*chunk),
        }
        self.ids.push(id);
        Ok(slot)
    }

    /// Copies the chunk stored at `slot` into `out`.
    pub fn read(&mut self, slot: usize, out: &mut Chunk) -> Result<(), StorageError> {
        if slot >= self.ids.len() {
            return Err(StorageError::SlotOutOfRange {
                slot,
                len: self.ids.len(),
            });
        }
        match self.spill.as_mut() {
            Some(file) => {
                let file = file.as_file_mut();
                file.seek(SeekFrom::Start((slot * CHUNK_SIZE) as u64))
                    .map_err(StorageError::Read)?;
                file.read_exact(&mut out.0).map_err(StorageError::Read)
            }
            None => {
                *out = self.memory[slot];
                Ok(())
            }
        }
    }

    /// Chunk ids in slot order.
    pub fn ids(&self) -> &[ChunkId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn is_spilled(&self) -> bool {
        self.spill.is_some()
    }

    pub fn spill_path(&self) -> Option<&Path> {
        self.spill.as_ref().map(NamedTempFile::path)
    }

    fn spill_to_file(&mut self) -> Result<(), StorageError> {
        let prefix = format!(
            "blockfec-{}-{}-",
            std::process::id(),
            SPILL_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let mut file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".chunks")
            .tempfile_in(&self.spill_dir)
            .map_err(|source| StorageError::CreateSpill {
                dir: self.spill_dir.clone(),
                source,
            })?;
        for (slot, chunk) in self.memory.iter().enumerate() {
            write_slot(file.as_file_mut(), slot, chunk).map_err(StorageError::Write)?;
        }
        tracing::debug!(
            path = %file.path().display(),
            chunks = self.memory.len(),
            "spilling received chunks to file"
        );
        self.memory = Vec::new();
        self.spill = Some(file);
        Ok(())
    }
}

fn write_slot(file: &mut std::fs::File, slot: usize, chunk: &Chunk) -> io::Result<()> {
    file.seek(SeekFrom::Start((slot * CHUNK_SIZE) as u64))?;
    file.write_all(&chunk.0)
}

impl Drop for ChunkStorage {
    fn drop(&mut self) {
        if let Some(file) = self.spill.take() {
            let path = file.path().to_path_buf();
            if let Err(err) = file.close() {
                tracing::warn!(path = %path.display(), %err, "failed to remove spill file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use blockfec_core::{Chunk, CHUNK_SIZE};
    use tempfile::tempdir;

    use super::{ChunkStorage, StorageError};

    fn chunk(tag: u8) -> Chunk {
        Chunk([tag; CHUNK_SIZE])
    }

    #[test]
    fn stays_in_memory_below_threshold() {
        let dir = tempdir().expect("tempdir");
        let mut storage = ChunkStorage::new(4 * CHUNK_SIZE, dir.path().to_path_buf());
        for tag in 0..4 {
            storage.push(u32::from(tag) + 10, &chunk(tag)).expect("push");
        }
        assert!(!storage.is_spilled());
        assert_eq!(storage.ids(), &[10, 11, 12, 13]);

        let mut out = Chunk::zeroed();
        storage.read(2, &mut out).expect("read");
        assert_eq!(out, chunk(2));
    }

    #[test]
    fn spills_past_threshold_and_reads_back_every_slot() {
        let dir = tempdir().expect("tempdir");
        let mut storage = ChunkStorage::new(2 * CHUNK_SIZE, dir.path().to_path_buf());
        for tag in 0..5 {
            storage.push(u32::from(tag), &chunk(tag)).expect("push");
        }
        assert!(storage.is_spilled());
        let path = storage.spill_path().expect("spilled").to_path_buf();
        assert!(path.starts_with(dir.path()));
        assert_eq!(
            std::fs::metadata(&path).expect("spill file").len(),
            (5 * CHUNK_SIZE) as u64
        );

        let mut out = Chunk::zeroed();
        for slot in (0..5).rev() {
            storage.read(slot, &mut out).expect("read");
            assert_eq!(out, chunk(slot as u8));
        }
    }

    #[test]
    fn spill_file_is_removed_by_final_owner() {
        let dir = tempdir().expect("tempdir");
        let mut storage = ChunkStorage::new(0, dir.path().to_path_buf());
        storage.push(1, &chunk(1)).expect("push");
        let path = storage.spill_path().expect("spilled").to_path_buf();

        let moved = storage;
        assert!(path.exists(), "moving storage must not delete the file");
        drop(moved);
        assert!(!path.exists());
    }

    #[test]
    fn concurrent_storages_get_distinct_files() {
        let dir = tempdir().expect("tempdir");
        let mut storages: Vec<_> = (0..8)
            .map(|_| ChunkStorage::new(0, dir.path().to_path_buf()))
            .collect();
        for storage in &mut storages {
            storage.push(0, &chunk(0)).expect("push");
        }
        let paths: HashSet<_> = storages
            .iter()
            .map(|s| s.spill_path().expect("spilled").to_path_buf())
            .collect();
        assert_eq!(paths.len(), 8);
    }

    #[test]
    fn missing_spill_dir_is_reported() {
        let dir = tempdir().expect("tempdir");
        let mut storage = ChunkStorage::new(0, dir.path().join("does-not-exist"));
        let err = storage.push(0, &chunk(0)).expect_err("spill must fail");
        assert!(matches!(err, StorageError::CreateSpill { .. }));
        assert!(storage.is_empty());
    }

    #[test]
    fn out_of_range_read_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let mut storage = ChunkStorage::new(CHUNK_SIZE, dir.path().to_path_buf());
        let mut out = Chunk::zeroed();
        assert!(matches!(
            storage.read(0, &mut out),
            Err(StorageError::SlotOutOfRange { slot: 0, len: 0 })
        ));
    }
}
