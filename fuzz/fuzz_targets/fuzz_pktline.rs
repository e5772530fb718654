//! Fuzz target for pkt-line parsing.
//!
//! The reader must handle arbitrary input without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    let mut reader = skillgit_git::PktLineReader::new(Cursor::new(data));

    // Bounded so crafted input cannot loop forever
    for _ in 0..100 {
        match reader.read() {
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(_) => break,
        }
    }
});
