//! Git pack file format implementation.
//!
//! Pack files are the format used by git for efficient object transfer.
//! Objects are always stored whole; no deltas are produced or accepted.
//! See: https://git-scm.com/docs/pack-format

use crate::builder::GitPack;
use crate::object::{GitObject, ObjectId, ObjectType};
use crate::{GitError, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use sha1::{Digest, Sha1};
use std::io::{Read, Write};

/// Magic bytes at the start of a pack file.
const PACK_SIGNATURE: &[u8; 4] = b"PACK";
/// Pack file version we support.
const PACK_VERSION: u32 = 2;
/// Header plus trailer.
const PACK_MIN_LEN: usize = 12 + 20;

/// Builds a pack file from a set of objects.
#[derive(Debug, Default)]
pub struct PackBuilder {
    entries: Vec<(ObjectType, Vec<u8>)>,
}

impl PackBuilder {
    /// Creates a new pack builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an object to the pack, recovering its raw content from the
    /// compressed loose form.
    pub fn add(&mut self, object: &GitObject) -> Result<()> {
        let content = object.content()?;
        self.entries.push((object.object_type, content));
        Ok(())
    }

    /// Number of objects added so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no object was added.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds the pack file.
    pub fn build(self) -> Result<Vec<u8>> {
        let mut pack = Vec::new();

        // Write header
        pack.extend_from_slice(PACK_SIGNATURE);
        pack.extend_from_slice(&PACK_VERSION.to_be_bytes());
        pack.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());

        for (object_type, content) in &self.entries {
            Self::write_object(&mut pack, *object_type, content)?;
        }

        // Trailer covers everything written so far
        let mut hasher = Sha1::new();
        hasher.update(&pack);
        let checksum = hasher.finalize();
        pack.extend_from_slice(&checksum);

        Ok(pack)
    }

    /// Writes a single object entry.
    fn write_object(pack: &mut Vec<u8>, object_type: ObjectType, content: &[u8]) -> Result<()> {
        let size = content.len();

        // First byte: (MSB=more bytes) (3 bits type) (4 bits size)
        let mut first_byte = (object_type.pack_type() << 4) | ((size & 0x0F) as u8);
        let mut remaining_size = size >> 4;

        if remaining_size > 0 {
            first_byte |= 0x80;
        }
        pack.push(first_byte);

        // Additional size bytes (7 bits each, MSB=continue)
        while remaining_size > 0 {
            let mut byte = (remaining_size & 0x7F) as u8;
            remaining_size >>= 7;
            if remaining_size > 0 {
                byte |= 0x80;
            }
            pack.push(byte);
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(content)
            .map_err(|e| GitError::Compression(e.to_string()))?;
        let compressed = encoder
            .finish()
            .map_err(|e| GitError::Compression(e.to_string()))?;
        pack.extend_from_slice(&compressed);

        Ok(())
    }
}

/// Serializes every object of `pack` into a pack file.
///
/// Entries are ordered commit, trees, blobs and then by id, so the same
/// repository always yields the same bytes.
pub fn generate_packfile(pack: &GitPack) -> Result<Vec<u8>> {
    let mut objects: Vec<&GitObject> = pack.objects.values().collect();
    objects.sort_by_key(|o| (o.object_type.pack_type(), o.id));

    let mut builder = PackBuilder::new();
    for object in objects {
        builder.add(object)?;
    }

    let count = builder.len();
    let bytes = builder.build()?;
    tracing::trace!(objects = count, bytes = bytes.len(), "generated packfile");
    Ok(bytes)
}

/// An object recovered from a pack file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedObject {
    /// Id computed from the recovered content.
    pub id: ObjectId,
    /// The type of object.
    pub object_type: ObjectType,
    /// Raw content, without a loose header.
    pub content: Vec<u8>,
}

/// Parses a pack file and extracts objects.
pub struct PackParser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PackParser<'a> {
    /// Creates a new pack parser.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Verifies the pack and returns its objects in stream order.
    pub fn parse(&mut self) -> Result<Vec<ParsedObject>> {
        if self.data.len() < PACK_MIN_LEN {
            return Err(GitError::InvalidPack("pack too small".to_string()));
        }

        if &self.data[0..4] != PACK_SIGNATURE {
            return Err(GitError::InvalidPack("invalid signature".to_string()));
        }

        let version = u32::from_be_bytes([self.data[4], self.data[5], self.data[6], self.data[7]]);
        if version != PACK_VERSION {
            return Err(GitError::InvalidPack(format!(
                "unsupported version: {}",
                version
            )));
        }

        let checksum_start = self.data.len() - 20;
        let mut hasher = Sha1::new();
        hasher.update(&self.data[..checksum_start]);
        if hasher.finalize().as_slice() != &self.data[checksum_start..] {
            return Err(GitError::InvalidPack("checksum mismatch".to_string()));
        }

        let object_count =
            u32::from_be_bytes([self.data[8], self.data[9], self.data[10], self.data[11]]) as usize;

        self.pos = 12;

        let mut objects = Vec::with_capacity(object_count.min(1024));
        for _ in 0..object_count {
            objects.push(self.parse_object(checksum_start)?);
        }

        if self.pos != checksum_start {
            return Err(GitError::InvalidPack(format!(
                "{} trailing bytes after last object",
                checksum_start - self.pos
            )));
        }

        Ok(objects)
    }

    /// Parses a single object.
    fn parse_object(&mut self, end: usize) -> Result<ParsedObject> {
        let mut next_byte = |pos: &mut usize| -> Result<u8> {
            if *pos >= end {
                return Err(GitError::InvalidPack("unexpected end of pack".to_string()));
            }
            let byte = self.data[*pos];
            *pos += 1;
            Ok(byte)
        };

        let first_byte = next_byte(&mut self.pos)?;
        let obj_type_code = (first_byte >> 4) & 0x07;
        let mut size = (first_byte & 0x0F) as usize;
        let mut shift = 4;

        let mut more = first_byte & 0x80 != 0;
        while more {
            if shift > 57 {
                return Err(GitError::InvalidPack("object size overflow".to_string()));
            }
            let byte = next_byte(&mut self.pos)?;
            size |= ((byte & 0x7F) as usize) << shift;
            shift += 7;
            more = byte & 0x80 != 0;
        }

        let object_type = ObjectType::from_pack_type(obj_type_code)?;

        let mut decoder = ZlibDecoder::new(&self.data[self.pos..end]);
        let mut content = Vec::with_capacity(size.min(1 << 20));
        decoder
            .read_to_end(&mut content)
            .map_err(|e| GitError::InvalidPack(format!("decompression failed: {}", e)))?;
        if content.len() != size {
            return Err(GitError::InvalidPack(format!(
                "size mismatch: header says {}, inflated {}",
                size,
                content.len()
            )));
        }
        self.pos += decoder.total_in() as usize;

        Ok(ParsedObject {
            id: ObjectId::hash_object(object_type, &content),
            object_type,
            content,
        })
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: Pack roundtrip preserves blob content
        #[test]
        fn prop_pack_roundtrip_blob(data in prop::collection::vec(any::<u8>(), 0..10000)) {
            let object = GitObject::new(ObjectType::Blob, &data).unwrap();

            let mut builder = PackBuilder::new();
            builder.add(&object).unwrap();
            let pack = builder.build().unwrap();

            let objects = PackParser::new(&pack).parse().unwrap();
            prop_assert_eq!(objects.len(), 1);
            prop_assert_eq!(objects[0].id, object.id);
            prop_assert_eq!(&objects[0].content, &data);
        }

        /// Property: Invalid pack data doesn't panic
        #[test]
        fn prop_invalid_pack_no_panic(data in prop::collection::vec(any::<u8>(), 0..1000)) {
            let _ = PackParser::new(&data).parse();
        }

        /// Property: Corrupted checksum is detected
        #[test]
        fn prop_corrupted_checksum_detected(
            content in prop::collection::vec(any::<u8>(), 1..1000),
            corrupt_byte in 0usize..20
        ) {
            let object = GitObject::new(ObjectType::Blob, &content).unwrap();
            let mut builder = PackBuilder::new();
            builder.add(&object).unwrap();
            let mut pack = builder.build().unwrap();

            let len = pack.len();
            pack[len - 1 - corrupt_byte] ^= 0xFF;

            prop_assert!(PackParser::new(&pack).parse().is_err());
        }
    }
}
