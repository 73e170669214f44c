//! # alphafold-fs — Virtual Filesystem over Packed AlphaFold Archives
//!
//! `alphafold-fs` exposes 280M+ predicted structure files, physically packed
//! across millions of tar archives, as a browsable read-only filesystem
//! without ever unpacking an archive. Navigation works by PDB ID, taxonomy
//! ID, or UniProt accession; a requested path resolves to exact bytes inside
//! one tar archive, honoring a downward-only multi-version fallback rule.
//!
//! - **Identifier index**: a prebuilt SQLite file maps identifiers and
//!   versions to `{archive, offset, length}` locations
//! - **Indexed tar access**: one 512-byte header re-parse per open, clipped
//!   positional reads, LRU-bounded descriptor cache
//! - **Version fallback**: `/v4/uniprot/P00963.cif` serves the v3 bytes when
//!   no v4 structure exists, never the other way around
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use alphafold_fs::{AlphaFoldFs, MountConfig, Result};
//!
//! # fn main() -> Result<()> {
//! let config = MountConfig::from_options(
//!     "alphafold_dir=/data/alphafold,sqlpath=/data/alphafold.sqlite",
//! )?;
//! let fs = AlphaFoldFs::mount(&config)?;
//!
//! // List a PDB accession's structures
//! for name in fs.readdir("/v3/pdb/2/A/12AS")? {
//!     println!("{}", name?);
//! }
//!
//! // Read a structure, falling back to an older version if needed
//! let bytes = fs.read("/v4/uniprot/P00963.cif", 0, 1 << 20)?;
//! # let _ = bytes;
//! # Ok(())
//! # }
//! ```
//!
//! The offline index builder and the kernel transport binding live outside
//! this crate; [`AlphaFoldFs`] is the operation surface a transport adapts,
//! and [`AfsError::errno`] maps every failure to its POSIX error code.

pub mod archive;
pub mod config;
pub mod error;
pub mod fs;
pub mod index;
pub mod path;
pub mod version;

pub use archive::{ArchiveReader, ArchiveSlice, FileStat, DEFAULT_HANDLE_CACHE};
pub use config::MountConfig;
pub use error::{AfsError, Result};
pub use fs::{AlphaFoldFs, DirStream, FileAttr, FileHandle, FileKind, README};
pub use index::{shard_key, ArchiveLocation, Section, ShardCursor, StructureIndex, UniProtEntry};
pub use path::Route;
pub use version::{Version, VersionSet};
