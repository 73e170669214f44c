//! Read-only identifier index backed by the prebuilt SQLite file
//!
//! The index builder scans the raw AlphaFold archive tree offline and writes
//! a SQLite file with the `files`, `pdb`, `taxonomy`, `taxonomy_unique` and
//! `versions` tables, plus `substr(id, -3, 2)` shard expression indexes.
//! This module only ever reads it: exact-key lookups and shard-scoped lazy
//! enumeration. Nothing here mutates after load, so arbitrary concurrent
//! readers are safe; a small round-robin pool of connections keeps concurrent
//! queries from serializing on a single SQLite handle.

use crate::error::{AfsError, Result};
use crate::version::{Version, VersionSet};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Rows fetched per shard-cursor batch
const SHARD_BATCH: usize = 1024;

/// Top-level identifier namespaces of the virtual tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Pdb,
    Taxonomy,
    Uniprot,
}

impl Section {
    pub fn from_segment(segment: &str) -> Option<Section> {
        match segment {
            "pdb" => Some(Section::Pdb),
            "taxonomy" => Some(Section::Taxonomy),
            "uniprot" => Some(Section::Uniprot),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Pdb => "pdb",
            Section::Taxonomy => "taxonomy",
            Section::Uniprot => "uniprot",
        }
    }
}

/// Where a packed structure record lives: the tar archive (relative to the
/// archive root), the offset of its tar header, and the stored payload length
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLocation {
    pub archive_path: String,
    pub byte_offset: u64,
    pub byte_length: u64,
}

/// One UniProt accession and its per-version archive locations.
///
/// An entry present in the index always has at least one version.
#[derive(Debug, Clone)]
pub struct UniProtEntry {
    pub uniprot_id: String,
    locations: BTreeMap<Version, ArchiveLocation>,
}

impl UniProtEntry {
    pub fn new(uniprot_id: String) -> Self {
        UniProtEntry {
            uniprot_id,
            locations: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, version: Version, location: ArchiveLocation) {
        self.locations.insert(version, location);
    }

    /// The stored location for an exact version, if any
    pub fn location(&self, version: Version) -> Option<&ArchiveLocation> {
        self.locations.get(&version)
    }

    /// The lowest version this entry exists at
    pub fn lowest_version(&self) -> Option<Version> {
        self.locations.keys().next().copied()
    }
}

/// Directory fan-out key: the (third-from-last, second-from-last) characters
/// of an identifier. Identifiers shorter than three characters have none and
/// cannot appear under a sharded path.
pub fn shard_key(id: &str) -> Option<(char, char)> {
    let chars: Vec<char> = id.chars().collect();
    if chars.len() < 3 {
        return None;
    }
    Some((chars[chars.len() - 3], chars[chars.len() - 2]))
}

/// Read-only queryable store mapping identifiers to archive locations.
///
/// Loaded once at mount time; immutable for the lifetime of the mount.
pub struct StructureIndex {
    pool: Vec<Mutex<Connection>>,
    next: AtomicUsize,
    versions: VersionSet,
}

impl StructureIndex {
    /// Open the prebuilt index with `pool_size` read-only connections and
    /// load the known version set.
    pub fn open<P: AsRef<Path>>(path: P, pool_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let mut pool = Vec::with_capacity(pool_size.max(1));
        for _ in 0..pool_size.max(1) {
            pool.push(Mutex::new(Connection::open_with_flags(path, flags)?));
        }

        let versions = {
            let conn = pool[0].lock();
            let mut stmt = conn.prepare("SELECT version FROM versions ORDER BY version")?;
            let tags = stmt
                .query_map([], |row| row.get::<_, u32>(0))?
                .collect::<rusqlite::Result<Vec<u32>>>()?;
            VersionSet::new(tags.into_iter().map(Version).collect())?
        };

        info!(
            index = %path.display(),
            connections = pool.len(),
            baseline = %versions.baseline(),
            "structure index loaded"
        );

        Ok(StructureIndex {
            pool,
            next: AtomicUsize::new(0),
            versions,
        })
    }

    /// The version set fixed at index-build time
    pub fn versions(&self) -> &VersionSet {
        &self.versions
    }

    /// Run a query on one of the pooled connections (round-robin)
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let slot = self.next.fetch_add(1, Ordering::Relaxed) % self.pool.len();
        let conn = self.pool[slot].lock();
        f(&conn)
    }

    /// UniProt IDs a PDB accession maps to. Many-to-many; `NotFound` when no
    /// mapping exists.
    pub fn lookup_by_pdb(&self, pdb_id: &str) -> Result<Vec<String>> {
        let ids = self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT DISTINCT uniprot_id FROM pdb WHERE pdb_id = ?1 ORDER BY uniprot_id",
            )?;
            let rows = stmt
                .query_map(params![pdb_id], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(rows)
        })?;
        if ids.is_empty() {
            return Err(AfsError::NotFound(format!("PDB ID {pdb_id}")));
        }
        Ok(ids)
    }

    /// UniProt IDs belonging to a taxonomy (organism) ID
    pub fn lookup_by_taxonomy(&self, taxonomy_id: &str) -> Result<Vec<String>> {
        let ids = self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT DISTINCT uniprot_id FROM taxonomy WHERE taxonomy_id = ?1 \
                 ORDER BY uniprot_id",
            )?;
            let rows = stmt
                .query_map(params![taxonomy_id], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(rows)
        })?;
        if ids.is_empty() {
            return Err(AfsError::NotFound(format!("taxonomy ID {taxonomy_id}")));
        }
        Ok(ids)
    }

    /// All per-version archive locations for a UniProt accession
    pub fn lookup_uniprot(&self, uniprot_id: &str) -> Result<UniProtEntry> {
        let entry = self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT version, relpath, offset, size FROM files WHERE uniprot_id = ?1",
            )?;
            let mut entry = UniProtEntry::new(uniprot_id.to_string());
            let rows = stmt.query_map(params![uniprot_id], |row| {
                Ok((
                    row.get::<_, u32>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u64>(2)?,
                    row.get::<_, u64>(3)?,
                ))
            })?;
            for row in rows {
                let (version, relpath, offset, size) = row?;
                entry.insert(
                    Version(version),
                    ArchiveLocation {
                        archive_path: relpath,
                        byte_offset: offset,
                        byte_length: size,
                    },
                );
            }
            Ok(entry)
        })?;
        if entry.lowest_version().is_none() {
            return Err(AfsError::NotFound(format!("UniProt ID {uniprot_id}")));
        }
        Ok(entry)
    }

    /// Distinct third-from-last identifier characters in a section, the
    /// first fan-out directory level
    pub fn shard_initials(&self, section: Section) -> Result<Vec<char>> {
        let sql = match section {
            Section::Pdb => {
                "SELECT DISTINCT substr(pdb_id, -3, 1) FROM pdb \
                 WHERE length(pdb_id) >= 3 ORDER BY 1"
            }
            Section::Taxonomy => {
                "SELECT DISTINCT substr(taxonomy_id, -3, 1) FROM taxonomy_unique \
                 WHERE length(taxonomy_id) >= 3 ORDER BY 1"
            }
            Section::Uniprot => {
                "SELECT DISTINCT substr(uniprot_id, -3, 1) FROM files \
                 WHERE length(uniprot_id) >= 3 ORDER BY 1"
            }
        };
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(sql)?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(single_chars(rows))
        })
    }

    /// Distinct second-from-last characters among identifiers whose
    /// third-from-last character is `c3`, the second fan-out level
    pub fn shard_seconds(&self, section: Section, c3: char) -> Result<Vec<char>> {
        let sql = match section {
            Section::Pdb => {
                "SELECT DISTINCT substr(pdb_id, -2, 1) FROM pdb \
                 WHERE substr(pdb_id, -3, 1) = ?1 AND length(pdb_id) >= 3 ORDER BY 1"
            }
            Section::Taxonomy => {
                "SELECT DISTINCT substr(taxonomy_id, -2, 1) FROM taxonomy_unique \
                 WHERE substr(taxonomy_id, -3, 1) = ?1 AND length(taxonomy_id) >= 3 ORDER BY 1"
            }
            Section::Uniprot => {
                "SELECT DISTINCT substr(uniprot_id, -2, 1) FROM files \
                 WHERE substr(uniprot_id, -3, 1) = ?1 AND length(uniprot_id) >= 3 ORDER BY 1"
            }
        };
        let key = c3.to_string();
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(sql)?;
            let rows = stmt
                .query_map(params![key], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(single_chars(rows))
        })
    }

    /// One keyset-paginated batch for a shard cursor
    fn shard_batch(
        &self,
        section: Section,
        shard: &str,
        max_version: Option<Version>,
        after: &str,
    ) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let rows = match (section, max_version) {
                (Section::Pdb, _) => {
                    let mut stmt = conn.prepare_cached(
                        "SELECT DISTINCT pdb_id FROM pdb \
                         WHERE substr(pdb_id, -3, 2) = ?1 AND pdb_id > ?2 \
                         ORDER BY pdb_id LIMIT ?3",
                    )?;
                    let rows = stmt.query_map(params![shard, after, SHARD_BATCH as i64], |row| {
                        row.get::<_, String>(0)
                    })?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                    rows
                }
                (Section::Taxonomy, _) => {
                    let mut stmt = conn.prepare_cached(
                        "SELECT taxonomy_id FROM taxonomy_unique \
                         WHERE substr(taxonomy_id, -3, 2) = ?1 AND taxonomy_id > ?2 \
                         ORDER BY taxonomy_id LIMIT ?3",
                    )?;
                    let rows = stmt.query_map(params![shard, after, SHARD_BATCH as i64], |row| {
                        row.get::<_, String>(0)
                    })?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                    rows
                }
                (Section::Uniprot, Some(cap)) => {
                    let mut stmt = conn.prepare_cached(
                        "SELECT DISTINCT uniprot_id FROM files \
                         WHERE substr(uniprot_id, -3, 2) = ?1 AND version <= ?2 \
                         AND uniprot_id > ?3 ORDER BY uniprot_id LIMIT ?4",
                    )?;
                    let rows = stmt.query_map(params![shard, cap.0, after, SHARD_BATCH as i64], |row| {
                        row.get::<_, String>(0)
                    })?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                    rows
                }
                (Section::Uniprot, None) => {
                    let mut stmt = conn.prepare_cached(
                        "SELECT DISTINCT uniprot_id FROM files \
                         WHERE substr(uniprot_id, -3, 2) = ?1 AND uniprot_id > ?2 \
                         ORDER BY uniprot_id LIMIT ?3",
                    )?;
                    let rows = stmt.query_map(params![shard, after, SHARD_BATCH as i64], |row| {
                        row.get::<_, String>(0)
                    })?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                    rows
                }
            };
            Ok(rows)
        })
    }
}

fn single_chars(rows: Vec<String>) -> Vec<char> {
    rows.iter()
        .filter_map(|s| {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(c),
                _ => None,
            }
        })
        .collect()
}

/// Finite, restartable cursor over one shard of a section.
///
/// Dropping the cursor mid-enumeration releases nothing shared: each batch
/// borrows a pooled connection only for the duration of the fetch.
pub struct ShardCursor {
    index: Arc<StructureIndex>,
    section: Section,
    shard: String,
    max_version: Option<Version>,
    last: Option<String>,
    buf: VecDeque<String>,
    done: bool,
}

impl ShardCursor {
    /// Lazily enumerate the top-level identifiers of `section` whose shard
    /// key is `(c3, c2)`.
    ///
    /// Backed by batched keyset pagination over the shard expression index;
    /// a shard of hundreds of thousands of entries never materializes fully.
    /// For the uniprot section, `max_version` drops entries whose lowest
    /// stored version is above the current path version, so that every
    /// listed name can actually be opened.
    pub fn new(
        index: Arc<StructureIndex>,
        section: Section,
        c3: char,
        c2: char,
        max_version: Option<Version>,
    ) -> ShardCursor {
        ShardCursor {
            index,
            section,
            shard: format!("{c3}{c2}"),
            max_version,
            last: None,
            buf: VecDeque::new(),
            done: false,
        }
    }

    /// Restart enumeration from the beginning
    pub fn rewind(&mut self) {
        self.last = None;
        self.buf.clear();
        self.done = false;
    }

    fn fill(&mut self) -> Result<()> {
        let after = self.last.as_deref().unwrap_or("");
        let batch = self
            .index
            .shard_batch(self.section, &self.shard, self.max_version, after)?;
        debug!(
            section = self.section.as_str(),
            shard = %self.shard,
            fetched = batch.len(),
            "shard cursor batch"
        );
        if batch.len() < SHARD_BATCH {
            self.done = true;
        }
        if let Some(last) = batch.last() {
            self.last = Some(last.clone());
        }
        self.buf.extend(batch);
        Ok(())
    }
}

impl Iterator for ShardCursor {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() {
            if self.done {
                return None;
            }
            if let Err(e) = self.fill() {
                self.done = true;
                return Some(Err(e));
            }
        }
        self.buf.pop_front().map(Ok)
    }
}
