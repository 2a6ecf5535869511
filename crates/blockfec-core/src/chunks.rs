use crate::error::CoreError;
use crate::types::{Chunk, ChunkId};

/// Destination buffer filled by an encoder: one chunk plus one id per slot.
///
/// A slot id is `None` until the slot has been built.
#[derive(Debug, Clone)]
pub struct FecChunks {
    chunks: Vec<Chunk>,
    ids: Vec<Option<ChunkId>>,
}

impl FecChunks {
    /// Allocates `slots` zeroed, unbuilt slots.
    pub fn new(slots: usize) -> Self {
        Self {
            chunks: vec![Chunk::zeroed(); slots],
            ids: vec![None; slots],
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunk(&self, slot: usize) -> Option<&Chunk> {
        self.chunks.get(slot)
    }

    /// Id assigned to `slot`, if built.
    pub fn id(&self, slot: usize) -> Option<ChunkId> {
        self.ids.get(slot).copied().flatten()
    }

    pub fn is_built(&self, slot: usize) -> bool {
        self.id(slot).is_some()
    }

    /// Iterates `(id, chunk)` over every built slot in slot order.
    pub fn built(&self) -> impl Iterator<Item = (ChunkId, &Chunk)> + '_ {
        self.ids
            .iter()
            .zip(self.chunks.iter())
            .filter_map(|(id, chunk)| id.map(|id| (id, chunk)))
    }

    /// Mutable access to a slot's chunk bytes, clearing its id until the
    /// caller records a new one with [`FecChunks::set_id`].
    pub fn slot_mut(&mut self, slot: usize) -> Result<&mut Chunk, CoreError> {
        let slots = self.chunks.len();
        let id = self
            .ids
            .get_mut(slot)
            .ok_or(CoreError::SlotOutOfRange { slot, slots })?;
        *id = None;
        Ok(&mut self.chunks[slot])
    }

    pub fn set_id(&mut self, slot: usize, id: ChunkId) -> Result<(), CoreError> {
        let slots = self.ids.len();
        let entry = self
            .ids
            .get_mut(slot)
            .ok_or(CoreError::SlotOutOfRange { slot, slots })?;
        *entry = Some(id);
        Ok(())
    }
}
