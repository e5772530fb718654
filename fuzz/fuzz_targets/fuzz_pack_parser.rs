//! Fuzz target for pack file parsing.
//!
//! The parser must reject malformed packs with an error, never a panic.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = skillgit_git::PackParser::new(data).parse();
});
