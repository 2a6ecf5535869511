#![no_main]

use blockfec::{Chunk, FecDecoder, CHUNK_SIZE};
use libfuzzer_sys::fuzz_target;

// Input: 4-byte blob size, then repeated (4-byte id, chunk seed byte).
fuzz_target!(|data: &[u8]| {
    let Some((size, rest)) = data.split_first_chunk::<4>() else {
        return;
    };
    let size = u32::from_le_bytes(*size) as usize % (64 * CHUNK_SIZE);
    let Ok(mut decoder) = FecDecoder::new(size) else {
        return;
    };
    for record in rest.chunks_exact(5) {
        let id = u32::from_le_bytes([record[0], record[1], record[2], record[3]]);
        let chunk = Chunk([record[4]; CHUNK_SIZE]);
        if decoder.provide(&chunk, id).is_err() {
            continue;
        }
        if decoder.decode_ready() {
            let decoded = decoder.decoded_data().expect("ready decoder yields data");
            assert_eq!(decoded.len(), size);
            break;
        }
    }
});
