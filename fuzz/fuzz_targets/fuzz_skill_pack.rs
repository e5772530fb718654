//! Fuzz target for repository synthesis.
//!
//! Arbitrary skill content either fails with an error or produces a pack
//! that parses back to exactly the synthesized objects.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::collections::BTreeMap;

#[derive(Debug, Arbitrary)]
struct SkillInput {
    identifier: String,
    primary: String,
    files: BTreeMap<String, String>,
}

fuzz_target!(|input: SkillInput| {
    let pack = match skillgit_git::create_git_pack(
        &input.identifier,
        &input.primary,
        Some(&input.files),
    ) {
        Ok(pack) => pack,
        Err(_) => return,
    };

    let packfile = match skillgit_git::generate_packfile(&pack) {
        Ok(packfile) => packfile,
        Err(_) => return,
    };
    let parsed = skillgit_git::PackParser::new(&packfile)
        .parse()
        .expect("synthesized pack must parse");

    assert_eq!(parsed.len(), pack.len());
    for object in parsed {
        assert!(pack.objects.contains_key(&object.id));
    }
});
