//! Presence tracking for received chunk ids.
//!
//! Data chunk ids index a dense flag vector directly. Repair ids span a range
//! of millions but only a few thousand ever arrive, so they go into a small
//! insert-only open-addressed set.

use blockfec_core::ChunkId;

const EMPTY: ChunkId = 0;
const MIN_CAPACITY: usize = 16;

/// Insert-only open-addressed set of non-zero ids.
///
/// `0` marks an empty bucket and must never be inserted.
#[derive(Debug, Clone)]
struct SparseIdSet {
    buckets: Vec<ChunkId>,
    len: usize,
}

impl SparseIdSet {
    fn new() -> Self {
        Self {
            buckets: vec![EMPTY; MIN_CAPACITY],
            len: 0,
        }
    }

    fn bucket_of(id: ChunkId, mask: usize) -> usize {
        // Odd multiplier keeps the mapping bijective on the low bits.
        (id.wrapping_mul(0x9E37_79B9) as usize) & mask
    }

    fn contains(&self, id: ChunkId) -> bool {
        let mask = self.buckets.len() - 1;
        let mut idx = Self::bucket_of(id, mask);
        loop {
            match self.buckets[idx] {
                EMPTY => return false,
                found if found == id => return true,
                _ => idx = (idx + 1) & mask,
            }
        }
    }

    /// Returns `true` if `id` was newly inserted.
    fn insert(&mut self, id: ChunkId) -> bool {
        debug_assert_ne!(id, EMPTY, "sentinel id inserted into sparse set");
        if (self.len + 1) * 2 > self.buckets.len() {
            self.grow();
        }
        let mask = self.buckets.len() - 1;
        let mut idx = Self::bucket_of(id, mask);
        loop {
            match self.buckets[idx] {
                EMPTY => {
                    self.buckets[idx] = id;
                    self.len += 1;
                    return true;
                }
                found if found == id => return false,
                _ => idx = (idx + 1) & mask,
            }
        }
    }

    fn grow(&mut self) {
        let doubled = vec![EMPTY; self.buckets.len() * 2];
        let old = std::mem::replace(&mut self.buckets, doubled);
        let mask = self.buckets.len() - 1;
        for id in old.into_iter().filter(|id| *id != EMPTY) {
            let mut idx = Self::bucket_of(id, mask);
            while self.buckets[idx] != EMPTY {
                idx = (idx + 1) & mask;
            }
            self.buckets[idx] = id;
        }
    }
}

/// Tracks which chunk ids a decoder has already accepted.
///
/// Presence is monotonic: there is no removal.
#[derive(Debug, Clone)]
pub struct ChunkPresenceTracker {
    data_chunks: Vec<bool>,
    repair_chunks: SparseIdSet,
}

impl ChunkPresenceTracker {
    /// Creates a tracker whose dense range covers `[0, data_chunks)`.
    ///
    /// The dense range always includes id 0, which the sparse set cannot
    /// hold, so `data_chunks` is raised to at least 1.
    pub fn new(data_chunks: usize) -> Self {
        Self {
            data_chunks: vec![false; data_chunks.max(1)],
            repair_chunks: SparseIdSet::new(),
        }
    }

    /// Marks `id` present, returning `true` if it already was.
    ///
    /// Ids outside the dense range must be non-zero.
    pub fn mark_and_check_present(&mut self, id: ChunkId) -> bool {
        match self.data_chunks.get_mut(id as usize) {
            Some(flag) => std::mem::replace(flag, true),
            None => !self.repair_chunks.insert(id),
        }
    }

    pub fn check_present(&self, id: ChunkId) -> bool {
        match self.data_chunks.get(id as usize) {
            Some(flag) => *flag,
            None => self.repair_chunks.contains(id),
        }
    }

    /// Number of ids that went to the sparse range.
    pub fn repair_count(&self) -> usize {
        self.repair_chunks.len
    }
}
