#![no_main]

use std::collections::HashSet;

use blockfec::ChunkPresenceTracker;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&data_chunks, rest)) = data.split_first() else {
        return;
    };
    let mut tracker = ChunkPresenceTracker::new(usize::from(data_chunks));
    let mut seen = HashSet::new();
    for raw in rest.chunks_exact(4) {
        let id = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let fresh = seen.insert(id);
        assert_eq!(tracker.mark_and_check_present(id), !fresh);
        assert!(tracker.check_present(id));
    }
});
