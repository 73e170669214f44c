//! Mount-time configuration
//!
//! Options arrive the way FUSE mounts deliver them, as a comma-separated
//! `-o` string: `alphafold_dir=/data/alphafold,sqlpath=/data/alphafold.sqlite`
//! plus the bare `foreground` flag. `alphafold_dir` and `sqlpath` are
//! required; the rest have defaults.

use crate::archive::DEFAULT_HANDLE_CACHE;
use crate::error::{AfsError, Result};
use std::path::PathBuf;

/// Default number of pooled index connections
pub const DEFAULT_INDEX_POOL: usize = 8;

#[derive(Debug, Clone)]
pub struct MountConfig {
    /// Root of the raw AlphaFold archive tree
    pub alphafold_dir: PathBuf,
    /// Path to the prebuilt SQLite index
    pub sqlpath: PathBuf,
    /// Keep the process attached to the invoking terminal
    pub foreground: bool,
    /// Bound on simultaneously open archive descriptors
    pub handle_cache: usize,
    /// Read-only index connections
    pub index_pool: usize,
}

impl MountConfig {
    pub fn new(alphafold_dir: impl Into<PathBuf>, sqlpath: impl Into<PathBuf>) -> Self {
        MountConfig {
            alphafold_dir: alphafold_dir.into(),
            sqlpath: sqlpath.into(),
            foreground: false,
            handle_cache: DEFAULT_HANDLE_CACHE,
            index_pool: DEFAULT_INDEX_POOL,
        }
    }

    /// Parse a mount option string (`key=value,...`)
    pub fn from_options(options: &str) -> Result<Self> {
        let mut alphafold_dir = None;
        let mut sqlpath = None;
        let mut foreground = false;
        let mut handle_cache = DEFAULT_HANDLE_CACHE;
        let mut index_pool = DEFAULT_INDEX_POOL;

        for option in options.split(',').filter(|o| !o.is_empty()) {
            match option.split_once('=') {
                Some(("alphafold_dir", v)) => alphafold_dir = Some(PathBuf::from(v)),
                Some(("sqlpath", v)) => sqlpath = Some(PathBuf::from(v)),
                Some(("handle_cache", v)) => {
                    handle_cache = v.parse().map_err(|_| {
                        AfsError::Config(format!("handle_cache is not a number: {v}"))
                    })?;
                }
                Some(("index_pool", v)) => {
                    index_pool = v
                        .parse()
                        .map_err(|_| AfsError::Config(format!("index_pool is not a number: {v}")))?;
                }
                None if option == "foreground" => foreground = true,
                _ => return Err(AfsError::Config(format!("unrecognized option: {option}"))),
            }
        }

        let alphafold_dir =
            alphafold_dir.ok_or_else(|| AfsError::Config("alphafold_dir is required".into()))?;
        let sqlpath = sqlpath.ok_or_else(|| AfsError::Config("sqlpath is required".into()))?;

        Ok(MountConfig {
            alphafold_dir,
            sqlpath,
            foreground,
            handle_cache,
            index_pool,
        })
    }

    /// Check the configured paths actually exist before mounting
    pub fn validate(&self) -> Result<()> {
        if !self.alphafold_dir.is_dir() {
            return Err(AfsError::Config(format!(
                "alphafold_dir is not a directory: {}",
                self.alphafold_dir.display()
            )));
        }
        if !self.sqlpath.is_file() {
            return Err(AfsError::Config(format!(
                "sqlpath is not a file: {}",
                self.sqlpath.display()
            )));
        }
        Ok(())
    }
}
