//! Structure versions and the downward-only fallback rule
//!
//! The set of known versions is fixed at index-build time and loaded once at
//! mount. Resolution walks versions downward from the requested one and
//! returns the first with a stored location; a higher existing version never
//! satisfies a lower request.

use crate::error::{AfsError, Result};
use crate::index::{ArchiveLocation, UniProtEntry};
use std::fmt;

/// An ordered structure version tag (`v3`, `v4`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(pub u32);

impl Version {
    /// Parse a `v{n}` tag as it appears in paths and filenames
    pub fn parse(tag: &str) -> Option<Version> {
        tag.strip_prefix('v')
            .and_then(|n| n.parse::<u32>().ok())
            .map(Version)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// The versions known to the index, sorted ascending.
///
/// The lowest version is the baseline below which no fallback occurs.
#[derive(Debug, Clone)]
pub struct VersionSet {
    versions: Vec<Version>,
}

impl VersionSet {
    /// Build from the index's version list. Fails if the list is empty,
    /// which would mean the index was built against no data at all.
    pub fn new(mut versions: Vec<Version>) -> Result<Self> {
        if versions.is_empty() {
            return Err(AfsError::CorruptIndex(
                "index contains no versions".to_string(),
            ));
        }
        versions.sort_unstable();
        versions.dedup();
        Ok(VersionSet { versions })
    }

    /// Whether `version` is a known tag
    pub fn contains(&self, version: Version) -> bool {
        self.versions.binary_search(&version).is_ok()
    }

    /// The lowest known version
    pub fn baseline(&self) -> Version {
        self.versions[0]
    }

    /// All known versions, ascending
    pub fn iter(&self) -> impl Iterator<Item = Version> + '_ {
        self.versions.iter().copied()
    }

    /// Versions at or below `requested`, highest first
    fn fallback_chain(&self, requested: Version) -> impl Iterator<Item = Version> + '_ {
        self.versions
            .iter()
            .rev()
            .copied()
            .filter(move |v| *v <= requested)
    }

    /// Resolve an entry at `requested`, falling back downward to the first
    /// version with a stored location.
    ///
    /// Returns the location together with the effective version it came
    /// from. The externally visible filename always carries the requested
    /// version; only the underlying bytes differ. Fails `NotFound` when no
    /// location exists at or below `requested`.
    pub fn resolve(
        &self,
        entry: &UniProtEntry,
        requested: Version,
    ) -> Result<(ArchiveLocation, Version)> {
        for candidate in self.fallback_chain(requested) {
            if let Some(location) = entry.location(candidate) {
                return Ok((location.clone(), candidate));
            }
        }
        Err(AfsError::NotFound(format!(
            "{} has no structure at or below {}",
            entry.uniprot_id, requested
        )))
    }
}
