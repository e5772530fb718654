//! Git object types and utilities.

use crate::{GitError, Result};
use bytes::Bytes;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use sha1::{Digest, Sha1};
use std::cmp::Ordering;
use std::fmt;
use std::io::{Read, Write};

/// A 20-byte SHA-1 object identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    /// Creates an ObjectId from raw bytes.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Creates an ObjectId from a hex string. Upper-case digits are accepted.
    pub fn from_hex(hex: &str) -> Result<Self> {
        if hex.len() != 40 {
            return Err(GitError::InvalidObjectId(format!(
                "invalid object id length: {}",
                hex.len()
            )));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(hex, &mut bytes)
            .map_err(|e| GitError::InvalidObjectId(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Returns the lowercase hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Computes the SHA-1 of `content` under a git object header.
    pub fn hash_object(object_type: ObjectType, content: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(object_type.header(content.len()));
        hasher.update(content);
        let result = hasher.finalize();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&result);
        Self(bytes)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Git object types this crate produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    /// File content.
    Blob,
    /// Directory listing.
    Tree,
    /// Commit object.
    Commit,
}

impl ObjectType {
    /// Returns the name used in loose object headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
        }
    }

    /// Parses an object type from its loose header name.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "blob" => Ok(Self::Blob),
            "tree" => Ok(Self::Tree),
            "commit" => Ok(Self::Commit),
            _ => Err(GitError::InvalidObject(format!(
                "unknown object type: {}",
                s
            ))),
        }
    }

    /// Returns the type code used in pack files.
    pub fn pack_type(&self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
        }
    }

    /// Parses an object type from a pack file type code.
    pub fn from_pack_type(code: u8) -> Result<Self> {
        match code {
            1 => Ok(Self::Commit),
            2 => Ok(Self::Tree),
            3 => Ok(Self::Blob),
            6 | 7 => Err(GitError::InvalidPack(format!(
                "delta objects are not supported (type {})",
                code
            ))),
            _ => Err(GitError::InvalidPack(format!("unknown pack type: {}", code))),
        }
    }

    /// Returns the loose object header `"{type} {len}\0"`.
    pub fn header(&self, len: usize) -> Vec<u8> {
        format!("{} {}\0", self.as_str(), len).into_bytes()
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored git object.
///
/// `data` holds the zlib-compressed loose form `"{type} {len}\0{content}"`,
/// which is exactly what the dumb protocol serves from `objects/xx/yyyy`.
#[derive(Debug, Clone)]
pub struct GitObject {
    /// SHA-1 of the uncompressed header and content.
    pub id: ObjectId,
    /// The type of object.
    pub object_type: ObjectType,
    /// Compressed loose object bytes.
    pub data: Bytes,
}

impl GitObject {
    /// Creates an object from its uncompressed content.
    pub fn new(object_type: ObjectType, content: &[u8]) -> Result<Self> {
        let id = ObjectId::hash_object(object_type, content);

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&object_type.header(content.len()))
            .map_err(|e| GitError::Compression(e.to_string()))?;
        encoder
            .write_all(content)
            .map_err(|e| GitError::Compression(e.to_string()))?;
        let data = encoder
            .finish()
            .map_err(|e| GitError::Compression(e.to_string()))?;

        Ok(Self {
            id,
            object_type,
            data: Bytes::from(data),
        })
    }

    /// Inflates the loose form, header included.
    pub fn inflate(&self) -> Result<Vec<u8>> {
        let mut decoder = ZlibDecoder::new(self.data.as_ref());
        let mut raw = Vec::new();
        decoder
            .read_to_end(&mut raw)
            .map_err(|e| GitError::Compression(e.to_string()))?;
        Ok(raw)
    }

    /// Inflates the loose form and returns the content without its header.
    pub fn content(&self) -> Result<Vec<u8>> {
        let mut raw = self.inflate()?;

        let null_pos = raw
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| GitError::InvalidObject("missing null byte in header".to_string()))?;

        let header = std::str::from_utf8(&raw[..null_pos])
            .map_err(|_| GitError::InvalidObject("header is not utf-8".to_string()))?;
        let (type_name, size) = header
            .split_once(' ')
            .ok_or_else(|| GitError::InvalidObject(format!("invalid header: {}", header)))?;

        if ObjectType::parse(type_name)? != self.object_type {
            return Err(GitError::InvalidObject(format!(
                "header type {} does not match {}",
                type_name, self.object_type
            )));
        }
        let size: usize = size
            .parse()
            .map_err(|_| GitError::InvalidObject(format!("invalid size: {}", size)))?;
        if raw.len() - null_pos - 1 != size {
            return Err(GitError::InvalidObject(format!(
                "size mismatch: header says {}, found {}",
                size,
                raw.len() - null_pos - 1
            )));
        }

        Ok(raw.split_off(null_pos + 1))
    }
}

/// File mode of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryMode {
    /// Regular file, `100644`.
    Regular,
    /// Executable file, `100755`.
    Executable,
    /// Subdirectory, `40000`.
    Directory,
}

impl EntryMode {
    /// Returns the octal mode as written in tree objects.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "100644",
            Self::Executable => "100755",
            Self::Directory => "40000",
        }
    }
}

/// A single entry of a tree object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// File mode.
    pub mode: EntryMode,
    /// Path segment, without slashes.
    pub name: String,
    /// Object the entry points at.
    pub id: ObjectId,
}

impl TreeEntry {
    /// Creates a new tree entry.
    pub fn new(mode: EntryMode, name: impl Into<String>, id: ObjectId) -> Self {
        Self {
            mode,
            name: name.into(),
            id,
        }
    }

    /// Orders entries the way git does: byte-wise by name, with directory
    /// names compared as if they ended in `/`.
    pub fn git_cmp(&self, other: &Self) -> Ordering {
        let suffix = |e: &Self| (e.mode == EntryMode::Directory).then_some(b'/');
        self.name
            .bytes()
            .chain(suffix(self))
            .cmp(other.name.bytes().chain(suffix(other)))
    }

    /// Appends `"{mode} {name}\0"` and the 20 raw id bytes to `out`.
    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.mode.as_str().as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.name.as_bytes());
        out.push(0);
        out.extend_from_slice(self.id.as_bytes());
    }
}
