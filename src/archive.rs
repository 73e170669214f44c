//! Indexed random access into tar archives
//!
//! The index records where each structure's tar header sits inside which
//! archive; this module opens the archive, re-parses that one 512-byte
//! header to confirm the index still matches the data on disk, and serves
//! clipped positional reads out of the payload. Archives are never unpacked.
//!
//! Open descriptors are bounded by an LRU cache keyed on archive path.
//! Eviction only drops the cache's reference: a reader holding a slice keeps
//! the descriptor alive through its `Arc` until the read finishes.

use crate::error::{AfsError, Result};
use crate::index::ArchiveLocation;
use lru::LruCache;
use parking_lot::Mutex;
use std::fs::File;
use std::io::ErrorKind;
use std::num::NonZeroUsize;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Tar block and header length
pub const BLOCK_LEN: u64 = 512;

/// Default bound on simultaneously open archive descriptors
pub const DEFAULT_HANDLE_CACHE: usize = 256;

const SIZE_FIELD: std::ops::Range<usize> = 124..136;
const MTIME_FIELD: std::ops::Range<usize> = 136..148;
const CHKSUM_FIELD: std::ops::Range<usize> = 148..156;
const TYPEFLAG: usize = 156;

/// The header fields we trust after validation
#[derive(Debug, Clone, Copy)]
struct TarHeader {
    size: u64,
    mtime: i64,
}

/// Attributes of a packed structure file, derived from its tar header alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub mtime: i64,
}

fn parse_octal(field: &[u8], what: &str, context: &str) -> Result<u64> {
    let text = std::str::from_utf8(field)
        .map_err(|_| AfsError::CorruptIndex(format!("non-ASCII {what} field in {context}")))?;
    let trimmed = text.trim_matches(|c| c == ' ' || c == '\0');
    if trimmed.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(trimmed, 8)
        .map_err(|_| AfsError::CorruptIndex(format!("bad octal {what} field in {context}")))
}

/// Parse and validate one tar header block.
///
/// The record must be a regular file with a checksum that matches; anything
/// else at an indexed offset means the index and the archive have drifted.
fn parse_header(block: &[u8; BLOCK_LEN as usize], context: &str) -> Result<TarHeader> {
    if block.iter().all(|b| *b == 0) {
        return Err(AfsError::CorruptIndex(format!(
            "empty tar block at {context}"
        )));
    }

    let stored = parse_octal(&block[CHKSUM_FIELD], "checksum", context)?;
    let computed: u64 = block
        .iter()
        .enumerate()
        .map(|(i, b)| {
            if CHKSUM_FIELD.contains(&i) {
                b' ' as u64
            } else {
                *b as u64
            }
        })
        .sum();
    if stored != computed {
        return Err(AfsError::CorruptIndex(format!(
            "tar checksum mismatch at {context}: stored {stored:o}, computed {computed:o}"
        )));
    }

    // Regular file records only; '0' in ustar, NUL in pre-POSIX archives.
    let typeflag = block[TYPEFLAG];
    if typeflag != b'0' && typeflag != 0 {
        return Err(AfsError::CorruptIndex(format!(
            "not a regular file record at {context} (typeflag {typeflag:#x})"
        )));
    }

    Ok(TarHeader {
        size: parse_octal(&block[SIZE_FIELD], "size", context)?,
        mtime: parse_octal(&block[MTIME_FIELD], "mtime", context)? as i64,
    })
}

/// An open archive descriptor, shared between the cache and in-flight reads
#[derive(Debug)]
pub struct ArchiveHandle {
    file: File,
    path: PathBuf,
}

/// One structure's payload inside an open archive.
///
/// Holds the archive handle alive; dropping the slice is the only release a
/// cancelled read needs.
#[derive(Debug)]
pub struct ArchiveSlice {
    handle: Arc<ArchiveHandle>,
    payload_offset: u64,
    payload_len: u64,
    mtime: i64,
}

impl ArchiveSlice {
    /// Total payload length in bytes
    pub fn len(&self) -> u64 {
        self.payload_len
    }

    pub fn is_empty(&self) -> bool {
        self.payload_len == 0
    }

    /// Header mtime as epoch seconds
    pub fn mtime(&self) -> i64 {
        self.mtime
    }

    /// Read up to `length` bytes starting at `offset` within the payload.
    ///
    /// Clipped to the payload's end: reading past it returns only the
    /// remaining bytes (possibly none), never an error and never bytes from
    /// the neighbouring record. Short reads inside the payload surface as
    /// I/O failures.
    pub fn read(&self, offset: u64, length: usize) -> Result<Vec<u8>> {
        if offset >= self.payload_len {
            return Ok(Vec::new());
        }
        let available = (self.payload_len - offset).min(length as u64) as usize;
        let mut buf = vec![0u8; available];
        self.handle
            .file
            .read_exact_at(&mut buf, self.payload_offset + offset)?;
        Ok(buf)
    }
}

/// Opens tar archives under the root and extracts byte ranges on demand
pub struct ArchiveReader {
    root: PathBuf,
    handles: Mutex<LruCache<PathBuf, Arc<ArchiveHandle>>>,
}

impl ArchiveReader {
    pub fn new<P: AsRef<Path>>(root: P, handle_cache: usize) -> Self {
        let capacity =
            NonZeroUsize::new(handle_cache).unwrap_or(NonZeroUsize::new(DEFAULT_HANDLE_CACHE).unwrap());
        ArchiveReader {
            root: root.as_ref().to_path_buf(),
            handles: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Open (or reuse) the archive holding `location` and validate the tar
    /// header the index points at.
    pub fn open(&self, location: &ArchiveLocation) -> Result<ArchiveSlice> {
        let handle = self.handle_for(&location.archive_path)?;
        let context = format!(
            "{}@{}",
            handle.path.display(),
            location.byte_offset
        );

        let mut block = [0u8; BLOCK_LEN as usize];
        handle
            .file
            .read_exact_at(&mut block, location.byte_offset)
            .map_err(|e| {
                if e.kind() == ErrorKind::UnexpectedEof {
                    AfsError::CorruptIndex(format!("indexed offset beyond archive end at {context}"))
                } else {
                    AfsError::Io(e)
                }
            })?;

        let header = parse_header(&block, &context).map_err(|e| {
            warn!(error = %e, "index/archive drift detected");
            e
        })?;

        if header.size != location.byte_length {
            let e = AfsError::CorruptIndex(format!(
                "payload length mismatch at {context}: header {}, index {}",
                header.size, location.byte_length
            ));
            warn!(error = %e, "index/archive drift detected");
            return Err(e);
        }

        Ok(ArchiveSlice {
            handle,
            payload_offset: location.byte_offset + BLOCK_LEN,
            payload_len: location.byte_length,
            mtime: header.mtime,
        })
    }

    /// Attribute query from the tar header, without touching the payload
    pub fn stat(&self, location: &ArchiveLocation) -> Result<FileStat> {
        let slice = self.open(location)?;
        Ok(FileStat {
            size: slice.len(),
            mtime: slice.mtime(),
        })
    }

    fn handle_for(&self, relpath: &str) -> Result<Arc<ArchiveHandle>> {
        let path = self.root.join(relpath);

        if let Some(handle) = self.handles.lock().get(&path) {
            return Ok(Arc::clone(handle));
        }

        // Open outside the lock so a slow disk doesn't stall unrelated
        // readers already in cache.
        let file = File::open(&path)?;
        let handle = Arc::new(ArchiveHandle {
            file,
            path: path.clone(),
        });

        let mut handles = self.handles.lock();
        if let Some(existing) = handles.get(&path) {
            // Lost the race; keep the handle everyone else sees.
            return Ok(Arc::clone(existing));
        }
        if let Some((evicted, _)) = handles.push(path, Arc::clone(&handle)) {
            debug!(archive = %evicted.display(), "evicted archive handle");
        }
        Ok(handle)
    }
}
