//! Error types for filesystem operations

use thiserror::Error;

/// Filesystem operation result type
pub type Result<T> = std::result::Result<T, AfsError>;

/// Filesystem operation errors
#[derive(Error, Debug)]
pub enum AfsError {
    /// Malformed or shard-mismatched path segment (never auto-corrected)
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Unknown version tag
    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    /// Well-formed identifier/path with no backing data
    #[error("Not found: {0}")]
    NotFound(String),

    /// Tar header at an indexed offset does not match expectations;
    /// signals index/archive drift requiring out-of-band repair
    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    /// Any mutating call (the filesystem is read-only)
    #[error("Filesystem is read-only")]
    ReadOnly,

    /// Mount-time configuration problem
    #[error("Invalid mount configuration: {0}")]
    Config(String),

    /// Underlying storage error during archive access
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Identifier index query failed
    #[error("Index error: {0}")]
    Index(#[from] rusqlite::Error),
}

impl AfsError {
    /// POSIX errno for the transport boundary.
    ///
    /// Every error is recovered here and translated; none should crash the
    /// serving process.
    pub fn errno(&self) -> i32 {
        match self {
            AfsError::InvalidPath(_) | AfsError::InvalidVersion(_) | AfsError::NotFound(_) => {
                libc::ENOENT
            }
            AfsError::ReadOnly => libc::EROFS,
            AfsError::CorruptIndex(_)
            | AfsError::Config(_)
            | AfsError::Io(_)
            | AfsError::Index(_) => libc::EIO,
        }
    }
}
