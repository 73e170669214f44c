//! On-disk fixtures: real tar archives plus a populated SQLite index,
//! laid out the way the offline index builder produces them.

#![allow(dead_code)]

use alphafold_fs::{AlphaFoldFs, MountConfig};
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;

/// A built fixture; keep it alive while the filesystem is in use.
pub struct Fixture {
    root: TempDir,
    pub config: MountConfig,
}

impl Fixture {
    pub fn mount(&self) -> AlphaFoldFs {
        AlphaFoldFs::mount(&self.config).unwrap()
    }

    pub fn sqlpath(&self) -> PathBuf {
        self.config.sqlpath.clone()
    }
}

struct Structure {
    uniprot_id: String,
    version: u32,
    payload: Option<Vec<u8>>,
}

#[derive(Default)]
pub struct FixtureBuilder {
    versions: Vec<u32>,
    structures: Vec<Structure>,
    pdb: Vec<(String, String)>,
    taxonomy: Vec<(String, String)>,
}

impl FixtureBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Versions known to the index (independent of which structures exist)
    pub fn versions(mut self, versions: &[u32]) -> Self {
        self.versions = versions.to_vec();
        self
    }

    /// A structure with real payload bytes packed into a tar archive
    pub fn structure(mut self, uniprot_id: &str, version: u32, payload: &[u8]) -> Self {
        self.structures.push(Structure {
            uniprot_id: uniprot_id.to_string(),
            version,
            payload: Some(payload.to_vec()),
        });
        self
    }

    /// An index row with no backing archive, enough for listing tests
    pub fn indexed_only(mut self, uniprot_id: &str, version: u32) -> Self {
        self.structures.push(Structure {
            uniprot_id: uniprot_id.to_string(),
            version,
            payload: None,
        });
        self
    }

    pub fn pdb_link(mut self, pdb_id: &str, uniprot_id: &str) -> Self {
        self.pdb.push((pdb_id.to_string(), uniprot_id.to_string()));
        self
    }

    pub fn taxonomy_link(mut self, taxonomy_id: &str, uniprot_id: &str) -> Self {
        self.taxonomy
            .push((taxonomy_id.to_string(), uniprot_id.to_string()));
        self
    }

    pub fn build(self) -> Fixture {
        let root = TempDir::new().unwrap();
        let archives = root.path().join("proteomes");
        std::fs::create_dir(&archives).unwrap();

        // One archive per version, every payload-bearing structure packed in.
        let mut tars: BTreeMap<u32, Vec<u8>> = BTreeMap::new();
        let mut rows = Vec::new();
        for s in &self.structures {
            match &s.payload {
                Some(payload) => {
                    let tar = tars.entry(s.version).or_default();
                    let name = format!("AF-{}-F1-model_v{}.cif.gz", s.uniprot_id, s.version);
                    let mtime = 1_600_000_000 + u64::from(s.version) * 1000;
                    let offset = append_entry(tar, &name, payload, mtime);
                    rows.push((
                        format!("chunk-v{}.tar", s.version),
                        s.version,
                        s.uniprot_id.clone(),
                        offset,
                        payload.len() as u64,
                        mtime,
                    ));
                }
                None => {
                    rows.push((
                        "unbacked.tar".to_string(),
                        s.version,
                        s.uniprot_id.clone(),
                        0,
                        0,
                        0,
                    ));
                }
            }
        }
        for (version, tar) in &tars {
            let mut f = File::create(archives.join(format!("chunk-v{version}.tar"))).unwrap();
            f.write_all(tar).unwrap();
        }

        let sqlpath = root.path().join("alphafold.sqlite");
        let conn = Connection::open(&sqlpath).unwrap();
        conn.execute_batch(
            "CREATE TABLE files (relpath TEXT, version INT, uniprot_id TEXT,
                                 offset NUMERIC, size NUMERIC, expanded_size NUMERIC,
                                 modification_time NUMERIC,
                                 PRIMARY KEY (uniprot_id, version)) WITHOUT ROWID;
             CREATE INDEX uniprot_substr ON files(substr(uniprot_id, -3, 2));
             CREATE TABLE pdb (uniprot_id TEXT, pdb_id TEXT,
                               PRIMARY KEY (uniprot_id, pdb_id)) WITHOUT ROWID;
             CREATE INDEX pdb_index ON pdb(pdb_id);
             CREATE INDEX pdb_substr ON pdb(substr(pdb_id, -3, 2));
             CREATE TABLE taxonomy (uniprot_id TEXT, taxonomy_id TEXT,
                                    PRIMARY KEY (uniprot_id, taxonomy_id)) WITHOUT ROWID;
             CREATE INDEX taxon_index ON taxonomy(taxonomy_id);
             CREATE TABLE taxonomy_unique (taxonomy_id TEXT PRIMARY KEY) WITHOUT ROWID;
             CREATE INDEX taxon_substr ON taxonomy_unique(substr(taxonomy_id, -3, 2));
             CREATE TABLE versions (version INT);",
        )
        .unwrap();

        for (relpath, version, uniprot_id, offset, size, mtime) in rows {
            conn.execute(
                "INSERT INTO files (relpath, version, uniprot_id, offset, size,
                                    expanded_size, modification_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![relpath, version, uniprot_id, offset, size, size, mtime],
            )
            .unwrap();
        }
        for (pdb_id, uniprot_id) in &self.pdb {
            conn.execute(
                "INSERT INTO pdb (uniprot_id, pdb_id) VALUES (?1, ?2)",
                params![uniprot_id, pdb_id],
            )
            .unwrap();
        }
        for (taxonomy_id, uniprot_id) in &self.taxonomy {
            conn.execute(
                "INSERT INTO taxonomy (uniprot_id, taxonomy_id) VALUES (?1, ?2)",
                params![uniprot_id, taxonomy_id],
            )
            .unwrap();
            conn.execute(
                "INSERT OR IGNORE INTO taxonomy_unique (taxonomy_id) VALUES (?1)",
                params![taxonomy_id],
            )
            .unwrap();
        }
        for version in &self.versions {
            conn.execute("INSERT INTO versions (version) VALUES (?1)", params![version])
                .unwrap();
        }
        drop(conn);

        let config = MountConfig::new(archives, sqlpath);
        Fixture { root, config }
    }
}

/// Append one ustar regular-file record; returns the header offset.
fn append_entry(tar: &mut Vec<u8>, name: &str, payload: &[u8], mtime: u64) -> u64 {
    let offset = tar.len() as u64;
    let mut block = [0u8; 512];
    block[..name.len()].copy_from_slice(name.as_bytes());
    block[100..108].copy_from_slice(b"0000644\0");
    block[108..116].copy_from_slice(b"0000000\0");
    block[116..124].copy_from_slice(b"0000000\0");
    block[124..136].copy_from_slice(format!("{:011o}\0", payload.len()).as_bytes());
    block[136..148].copy_from_slice(format!("{mtime:011o}\0").as_bytes());
    block[148..156].copy_from_slice(b"        ");
    block[156] = b'0';
    block[257..263].copy_from_slice(b"ustar\0");
    block[263..265].copy_from_slice(b"00");
    let sum: u64 = block.iter().map(|b| *b as u64).sum();
    block[148..155].copy_from_slice(format!("{sum:06o}\0").as_bytes());
    block[155] = b' ';

    tar.extend_from_slice(&block);
    tar.extend_from_slice(payload);
    let pad = (512 - payload.len() % 512) % 512;
    tar.extend(std::iter::repeat(0u8).take(pad));
    offset
}
