//! Git error types.

use thiserror::Error;

/// Errors that can occur while building or encoding git data.
#[derive(Debug, Error)]
pub enum GitError {
    /// Deflate or inflate failed.
    #[error("compression error: {0}")]
    Compression(String),

    /// Invalid pack file format.
    #[error("invalid pack file: {0}")]
    InvalidPack(String),

    /// Invalid pkt-line format.
    #[error("invalid pkt-line: {0}")]
    InvalidPktLine(String),

    /// A tree entry cannot be serialized.
    #[error("invalid tree entry: {0}")]
    InvalidTreeEntry(String),

    /// A file path cannot be placed in the repository.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Malformed object id.
    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    /// Malformed loose object.
    #[error("invalid object: {0}")]
    InvalidObject(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
