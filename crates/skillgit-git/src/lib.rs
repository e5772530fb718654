//! Git repository synthesis for skillgit.
//!
//! This crate builds a minimal git repository (blobs, trees and a single
//! commit) from in-memory content and renders it for both the dumb and the
//! smart git HTTP protocols, so that a stock `git clone` can fetch content
//! that was never stored as a repository.
//!
//! Every function takes its inputs explicitly and returns fresh bytes or
//! structures; nothing here performs I/O or keeps state between calls.

mod builder;
mod error;
mod object;
mod pack;
mod pktline;
mod protocol;
mod request;

pub use builder::{
    create_git_pack, create_git_pack_at, GitPack, ObjectBuilder, Signature,
    DEFAULT_COMMIT_TIMESTAMP, HEAD_REF, MAIN_REF, PRIMARY_FILE_NAME,
};
pub use error::GitError;
pub use object::{EntryMode, GitObject, ObjectId, ObjectType, TreeEntry};
pub use pack::{generate_packfile, PackBuilder, PackParser, ParsedObject};
pub use pktline::{write_sideband, Band, PktLine, PktLineReader, PktLineWriter};
pub use protocol::{
    generate_head, generate_info_refs, generate_shallow_update, generate_smart_info_refs,
    generate_upload_pack_response, get_object, parse_object_path, respond_to_upload_pack,
    service_announcement, CAPABILITIES, UPLOAD_PACK_SERVICE,
};
pub use request::{parse_upload_pack_request, UploadPackRequest};

/// Result type for git operations.
pub type Result<T> = std::result::Result<T, GitError>;
