#![no_main]

use habbo_protocol::core::codec::{decode, FrameAssembler};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Single-buffer unframing and every reader on whatever comes out
    if let Ok(mut packet) = decode(data) {
        let _ = packet.pop_int();
        let _ = packet.pop_string();
        let _ = packet.pop_boolean();
        let _ = packet.pop_double();
        let _ = packet.pop_long();
        let _ = packet.dump_hex();
    }

    // Reassembly over the same bytes, split in two
    let mut assembler = FrameAssembler::new(8192);
    let (head, tail) = data.split_at(data.len() / 2);
    for chunk in [head, tail] {
        assembler.extend(chunk);
        for _ in 0..64 {
            match assembler.next_frame(|_: &mut [u8]| {}) {
                Ok(Some(_)) | Err(_) => continue,
                Ok(None) => break,
            }
        }
    }
});
