//! Fuzz target for upload-pack request bodies.

#![no_main]

use libfuzzer_sys::fuzz_target;
use skillgit_git::ObjectId;

fuzz_target!(|data: &[u8]| {
    let request = skillgit_git::parse_upload_pack_request(data);

    // Every id the parser accepted must be a well-formed object id
    for id in request.wants.iter().chain(&request.haves).chain(&request.shallows) {
        assert!(ObjectId::from_hex(id).is_ok());
    }
});
