//! Filesystem operation adapter
//!
//! Translates the generic operations the kernel transport dispatches
//! (attribute lookup, directory listing, open, read) into namespace
//! resolution, version fallback, and archive reads. Every error is recovered
//! here into the closed `AfsError` taxonomy; the transport maps it onward
//! with [`AfsError::errno`]. A single bad path or corrupt archive entry
//! never affects concurrent unrelated requests.

use crate::archive::{ArchiveReader, ArchiveSlice};
use crate::config::MountConfig;
use crate::error::{AfsError, Result};
use crate::index::{ArchiveLocation, Section, ShardCursor, StructureIndex};
use crate::path::Route;
use crate::version::{Version, VersionSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Contents of the virtual `/README.md`
pub const README: &str = "\
# AlphaFold structure filesystem

Read-only view over the packed AlphaFold structure archives.

    /<version>/pdb/<c3>/<c2>/<pdb_id>/<uniprot_id>_<version>.cif
    /<version>/taxonomy/<c3>/<c2>/<taxonomy_id>/<uniprot_id>_<version>.cif
    /<version>/uniprot/<c3>/<c2>/<uniprot_id>_<version>.cif
    /<version>/uniprot/<uniprot_id>[.cif]

<c3> and <c2> are the third-from-last and second-from-last characters of the
identifier listed below them. Requesting a version a structure does not exist
at falls back to the highest older version; the bytes served are those of the
fallback version under the requested filename.
";

/// File or directory kind as the transport sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    Regular,
}

/// Attributes answered by `getattr`.
///
/// Directories are synthetic and report fixed attributes; file size and
/// mtime come from the archive's tar header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttr {
    pub kind: FileKind,
    pub size: u64,
    pub mtime: i64,
    pub perm: u16,
}

impl FileAttr {
    fn directory() -> Self {
        FileAttr {
            kind: FileKind::Directory,
            size: 0,
            mtime: 0,
            perm: 0o555,
        }
    }

    fn regular(size: u64, mtime: i64) -> Self {
        FileAttr {
            kind: FileKind::Regular,
            size,
            mtime,
            perm: 0o444,
        }
    }
}

/// Lazy, name-only directory listing.
///
/// Attribute fetches are deferred to per-entry `getattr` calls so listing a
/// shard of hundreds of thousands of entries stays cheap. Dropping the
/// stream mid-listing abandons it cleanly.
pub type DirStream = Box<dyn Iterator<Item = Result<String>> + Send>;

/// An opened file; holds the underlying archive handle until dropped
#[derive(Debug)]
pub enum FileHandle {
    Readme,
    Archive(ArchiveSlice),
}

impl FileHandle {
    /// Payload length in bytes
    pub fn len(&self) -> u64 {
        match self {
            FileHandle::Readme => README.len() as u64,
            FileHandle::Archive(slice) => slice.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read up to `length` bytes at `offset`, clipped to the payload end
    pub fn read(&self, offset: u64, length: usize) -> Result<Vec<u8>> {
        match self {
            FileHandle::Readme => {
                let bytes = README.as_bytes();
                if offset >= bytes.len() as u64 {
                    return Ok(Vec::new());
                }
                let start = offset as usize;
                let end = bytes.len().min(start + length);
                Ok(bytes[start..end].to_vec())
            }
            FileHandle::Archive(slice) => slice.read(offset, length),
        }
    }
}

/// The mounted filesystem: shared immutable index state plus the archive
/// reader, safe under arbitrary concurrent invocation.
pub struct AlphaFoldFs {
    index: Arc<StructureIndex>,
    reader: ArchiveReader,
}

impl AlphaFoldFs {
    /// Validate the configuration, load the index, and prepare the reader
    pub fn mount(config: &MountConfig) -> Result<Self> {
        config.validate()?;
        let index = Arc::new(StructureIndex::open(&config.sqlpath, config.index_pool)?);
        let reader = ArchiveReader::new(&config.alphafold_dir, config.handle_cache);
        info!(
            archive_root = %config.alphafold_dir.display(),
            versions = index.versions().iter().count(),
            "alphafold-fs mounted"
        );
        Ok(AlphaFoldFs { index, reader })
    }

    /// The version set this mount serves
    pub fn versions(&self) -> &VersionSet {
        self.index.versions()
    }

    /// Resolve a leaf file: index lookup plus downward version fallback
    fn resolve_file(
        &self,
        uniprot_id: &str,
        requested: Version,
    ) -> Result<(ArchiveLocation, Version)> {
        let entry = self.index.lookup_uniprot(uniprot_id)?;
        let resolved = self.index.versions().resolve(&entry, requested)?;
        debug!(
            uniprot_id,
            requested = %requested,
            effective = %resolved.1,
            "resolved structure file"
        );
        Ok(resolved)
    }

    /// Attribute lookup
    pub fn getattr(&self, path: &str) -> Result<FileAttr> {
        debug!(path, "getattr");
        match Route::parse(path, self.index.versions())? {
            Route::Root
            | Route::VersionRoot(_)
            | Route::SectionListing { .. }
            | Route::ShardListing { .. }
            | Route::EntryListing { .. } => Ok(FileAttr::directory()),
            Route::IdDirectory {
                section, ref id, ..
            } => {
                // Existence check only; contents are resolved lazily.
                self.linked_uniprot_ids(section, id)?;
                Ok(FileAttr::directory())
            }
            Route::Readme => Ok(FileAttr::regular(README.len() as u64, 0)),
            Route::File {
                version,
                ref uniprot_id,
            } => {
                let (location, _) = self.resolve_file(uniprot_id, version)?;
                let stat = self.reader.stat(&location)?;
                Ok(FileAttr::regular(stat.size, stat.mtime))
            }
        }
    }

    /// Directory listing: names only, produced lazily
    pub fn readdir(&self, path: &str) -> Result<DirStream> {
        debug!(path, "readdir");
        match Route::parse(path, self.index.versions())? {
            Route::Root => {
                let mut names = vec!["README.md".to_string()];
                names.extend(self.index.versions().iter().map(|v| v.to_string()));
                Ok(fixed(names))
            }
            Route::VersionRoot(_) => Ok(fixed(
                [Section::Pdb, Section::Taxonomy, Section::Uniprot]
                    .iter()
                    .map(|s| s.as_str().to_string())
                    .collect(),
            )),
            Route::SectionListing { section, .. } => {
                let chars = self.index.shard_initials(section)?;
                Ok(fixed(chars.into_iter().map(String::from).collect()))
            }
            Route::ShardListing { section, c3, .. } => {
                let chars = self.index.shard_seconds(section, c3)?;
                Ok(fixed(chars.into_iter().map(String::from).collect()))
            }
            Route::EntryListing {
                version,
                section,
                c3,
                c2,
            } => match section {
                // PDB and taxonomy IDs are directories of linked structures.
                Section::Pdb | Section::Taxonomy => Ok(Box::new(ShardCursor::new(
                    Arc::clone(&self.index),
                    section,
                    c3,
                    c2,
                    None,
                ))),
                // UniProt IDs are the structure files themselves, named with
                // the requested version; entries with no location at or
                // below it are excluded so every listed name opens.
                Section::Uniprot => {
                    let cursor =
                        ShardCursor::new(Arc::clone(&self.index), section, c3, c2, Some(version));
                    Ok(Box::new(
                        cursor.map(move |id| id.map(|id| format!("{id}_{version}.cif"))),
                    ))
                }
            },
            Route::IdDirectory {
                version,
                section,
                ref id,
            } => {
                // Projected filenames carry the path's version; fallback for
                // unresolved versions happens lazily on open, with no
                // existence re-check here.
                let ids = self.linked_uniprot_ids(section, id)?;
                Ok(fixed(
                    ids.into_iter()
                        .map(|id| format!("{id}_{version}.cif"))
                        .collect(),
                ))
            }
            Route::Readme | Route::File { .. } => {
                Err(AfsError::InvalidPath(format!("{path} is not a directory")))
            }
        }
    }

    /// Open a file for reading. Any write intent fails `ReadOnly`.
    pub fn open(&self, path: &str, write: bool) -> Result<FileHandle> {
        debug!(path, write, "open");
        if write {
            return Err(AfsError::ReadOnly);
        }
        match Route::parse(path, self.index.versions())? {
            Route::Readme => Ok(FileHandle::Readme),
            Route::File {
                version,
                ref uniprot_id,
            } => {
                let (location, _) = self.resolve_file(uniprot_id, version)?;
                Ok(FileHandle::Archive(self.reader.open(&location)?))
            }
            _ => Err(AfsError::InvalidPath(format!("{path} is not a file"))),
        }
    }

    /// Convenience for transports that re-resolve per read call.
    ///
    /// Resolution is a pure function of the immutable index, so repeated
    /// resolution within one open/read session is guaranteed consistent.
    pub fn read(&self, path: &str, offset: u64, length: usize) -> Result<Vec<u8>> {
        self.open(path, false)?.read(offset, length)
    }

    fn linked_uniprot_ids(&self, section: Section, id: &str) -> Result<Vec<String>> {
        match section {
            Section::Pdb => self.index.lookup_by_pdb(id),
            Section::Taxonomy => self.index.lookup_by_taxonomy(id),
            // Routing never produces a uniprot ID directory.
            Section::Uniprot => Err(AfsError::InvalidPath(id.to_string())),
        }
    }
}

fn fixed(names: Vec<String>) -> DirStream {
    Box::new(names.into_iter().map(Ok))
}
