//! Virtual path grammar and typed routing
//!
//! ```text
//! /README.md
//! /$version/
//! /$version/pdb/<c3>/<c2>/<pdb_id>/<uniprot_id>_<$version>.cif
//! /$version/taxonomy/<c3>/<c2>/<taxonomy_id>/<uniprot_id>_<$version>.cif
//! /$version/uniprot/<c3>/<c2>/<uniprot_id>_<$version>.cif
//! /$version/uniprot/<uniprot_id>            (shortcut, no extension)
//! /$version/uniprot/<uniprot_id>.cif        (shortcut, with extension)
//! ```
//!
//! Routing is strict: a shard directory that does not match the identifier's
//! true shard key is rejected, never silently corrected, and the version
//! token inside a filename must equal the version segment that opened the
//! path.

use crate::error::{AfsError, Result};
use crate::index::{shard_key, Section};
use crate::version::{Version, VersionSet};

/// What a virtual path resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `/` — versions plus README.md
    Root,
    /// `/README.md` — static virtual file
    Readme,
    /// `/$version` — the three sections
    VersionRoot(Version),
    /// `/$version/<section>` — first fan-out level (c3 characters)
    SectionListing { version: Version, section: Section },
    /// `/$version/<section>/<c3>` — second fan-out level (c2 characters)
    ShardListing {
        version: Version,
        section: Section,
        c3: char,
    },
    /// `/$version/<section>/<c3>/<c2>` — top-level identifiers in the shard
    EntryListing {
        version: Version,
        section: Section,
        c3: char,
        c2: char,
    },
    /// `/$version/{pdb,taxonomy}/<c3>/<c2>/<id>` — UniProt structure files
    /// linked to a PDB or taxonomy identifier
    IdDirectory {
        version: Version,
        section: Section,
        id: String,
    },
    /// A structure file; carries the *requested* version, resolved downward
    /// lazily on open
    File {
        version: Version,
        uniprot_id: String,
    },
}

impl Route {
    /// Parse a virtual path against the known version set
    pub fn parse(path: &str, versions: &VersionSet) -> Result<Route> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        match segments.as_slice() {
            [] => Ok(Route::Root),
            ["README.md"] => Ok(Route::Readme),
            [tag, rest @ ..] => {
                let version = Version::parse(tag)
                    .filter(|v| versions.contains(*v))
                    .ok_or_else(|| AfsError::InvalidVersion(tag.to_string()))?;
                parse_below_version(path, version, rest)
            }
        }
    }
}

fn parse_below_version(path: &str, version: Version, rest: &[&str]) -> Result<Route> {
    let invalid = || AfsError::InvalidPath(path.to_string());

    let (section_seg, rest) = match rest {
        [] => return Ok(Route::VersionRoot(version)),
        [section, rest @ ..] => (*section, rest),
    };
    let section = Section::from_segment(section_seg).ok_or_else(invalid)?;

    match (section, rest) {
        (_, []) => Ok(Route::SectionListing { version, section }),

        // The uniprot shortcut forms bypass shard validation entirely. A
        // single character below uniprot/ is a shard directory; anything
        // longer is an accession (UniProt IDs are at least six characters).
        (Section::Uniprot, [seg]) if seg.chars().count() > 1 => {
            let id = seg.strip_suffix(".cif").unwrap_or(seg);
            if !is_identifier(id) {
                return Err(invalid());
            }
            Ok(Route::File {
                version,
                uniprot_id: id.to_string(),
            })
        }

        (_, [c3]) => {
            let c3 = shard_char(c3).ok_or_else(invalid)?;
            Ok(Route::ShardListing {
                version,
                section,
                c3,
            })
        }

        (_, [c3, c2]) => {
            let c3 = shard_char(c3).ok_or_else(invalid)?;
            let c2 = shard_char(c2).ok_or_else(invalid)?;
            Ok(Route::EntryListing {
                version,
                section,
                c3,
                c2,
            })
        }

        // Sharded uniprot leaf: the filename's own identifier carries the
        // shard key.
        (Section::Uniprot, [c3, c2, filename]) => {
            let c3 = shard_char(c3).ok_or_else(invalid)?;
            let c2 = shard_char(c2).ok_or_else(invalid)?;
            let uniprot_id = structure_filename(filename, version).ok_or_else(invalid)?;
            if shard_key(&uniprot_id) != Some((c3, c2)) {
                return Err(invalid());
            }
            Ok(Route::File {
                version,
                uniprot_id,
            })
        }

        (_, [c3, c2, id]) => {
            let c3 = shard_char(c3).ok_or_else(invalid)?;
            let c2 = shard_char(c2).ok_or_else(invalid)?;
            if !is_identifier(id) || shard_key(id) != Some((c3, c2)) {
                return Err(invalid());
            }
            Ok(Route::IdDirectory {
                version,
                section,
                id: id.to_string(),
            })
        }

        (Section::Pdb | Section::Taxonomy, [c3, c2, id, filename]) => {
            let c3 = shard_char(c3).ok_or_else(invalid)?;
            let c2 = shard_char(c2).ok_or_else(invalid)?;
            if !is_identifier(id) || shard_key(id) != Some((c3, c2)) {
                return Err(invalid());
            }
            let uniprot_id = structure_filename(filename, version).ok_or_else(invalid)?;
            Ok(Route::File {
                version,
                uniprot_id,
            })
        }

        _ => Err(invalid()),
    }
}

/// A one-character `[A-Za-z0-9]` shard directory name
fn shard_char(segment: &str) -> Option<char> {
    let mut chars = segment.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphanumeric() => Some(c),
        _ => None,
    }
}

/// Identifiers live in the `[A-Za-z0-9]` alphabet
fn is_identifier(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Parse `<uniprot_id>_<version>.cif`, requiring the version token to match
/// the path's version segment
fn structure_filename(filename: &str, version: Version) -> Option<String> {
    let stem = filename.strip_suffix(".cif")?;
    let (id, tag) = stem.rsplit_once('_')?;
    if Version::parse(tag)? != version || !is_identifier(id) {
        return None;
    }
    Some(id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn versions() -> VersionSet {
        VersionSet::new(vec![Version(3), Version(4)]).unwrap()
    }

    fn parse(path: &str) -> Result<Route> {
        Route::parse(path, &versions())
    }

    #[test]
    fn test_root_and_readme() {
        assert_eq!(parse("/").unwrap(), Route::Root);
        assert_eq!(parse("").unwrap(), Route::Root);
        assert_eq!(parse("/README.md").unwrap(), Route::Readme);
    }

    #[test]
    fn test_version_segment() {
        assert_eq!(parse("/v3").unwrap(), Route::VersionRoot(Version(3)));
        assert_eq!(parse("/v4/").unwrap(), Route::VersionRoot(Version(4)));
        // v2 is not a recognized version
        assert!(matches!(parse("/v2"), Err(AfsError::InvalidVersion(_))));
        assert!(matches!(parse("/foo"), Err(AfsError::InvalidVersion(_))));
    }

    #[test]
    fn test_section_and_shard_levels() {
        assert_eq!(
            parse("/v3/pdb").unwrap(),
            Route::SectionListing {
                version: Version(3),
                section: Section::Pdb
            }
        );
        assert_eq!(
            parse("/v3/taxonomy/5").unwrap(),
            Route::ShardListing {
                version: Version(3),
                section: Section::Taxonomy,
                c3: '5'
            }
        );
        assert_eq!(
            parse("/v3/pdb/2/A").unwrap(),
            Route::EntryListing {
                version: Version(3),
                section: Section::Pdb,
                c3: '2',
                c2: 'A'
            }
        );
        assert!(matches!(
            parse("/v3/structures"),
            Err(AfsError::InvalidPath(_))
        ));
        assert!(matches!(parse("/v3/pdb/!"), Err(AfsError::InvalidPath(_))));
        assert!(matches!(
            parse("/v3/pdb/2/AB"),
            Err(AfsError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_id_directory_shard_validation() {
        assert_eq!(
            parse("/v3/pdb/2/A/12AS").unwrap(),
            Route::IdDirectory {
                version: Version(3),
                section: Section::Pdb,
                id: "12AS".to_string()
            }
        );
        // True shard of 99XY is (X, Y); explicit mismatch is InvalidPath,
        // never silently corrected and never NotFound.
        assert!(matches!(
            parse("/v3/pdb/2/S/99XY"),
            Err(AfsError::InvalidPath(_))
        ));
        // Identifiers too short to have a shard key cannot appear here.
        assert!(matches!(
            parse("/v3/pdb/2/A/2A"),
            Err(AfsError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_pdb_leaf_file() {
        assert_eq!(
            parse("/v3/pdb/2/A/12AS/P00963_v3.cif").unwrap(),
            Route::File {
                version: Version(3),
                uniprot_id: "P00963".to_string()
            }
        );
        // Filename version token must equal the path version.
        assert!(matches!(
            parse("/v3/pdb/2/A/12AS/P00963_v4.cif"),
            Err(AfsError::InvalidPath(_))
        ));
        assert!(matches!(
            parse("/v3/pdb/2/A/12AS/P00963.cif"),
            Err(AfsError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_uniprot_sharded_leaf() {
        assert_eq!(
            parse("/v4/uniprot/9/6/P00963_v4.cif").unwrap(),
            Route::File {
                version: Version(4),
                uniprot_id: "P00963".to_string()
            }
        );
        // Shard key of P00963 is (9, 6).
        assert!(matches!(
            parse("/v4/uniprot/0/0/P00963_v4.cif"),
            Err(AfsError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_uniprot_shortcuts() {
        for path in ["/v4/uniprot/P00963", "/v4/uniprot/P00963.cif"] {
            assert_eq!(
                parse(path).unwrap(),
                Route::File {
                    version: Version(4),
                    uniprot_id: "P00963".to_string()
                },
                "path {path}"
            );
        }
        assert!(matches!(
            parse("/v4/uniprot/P00_963"),
            Err(AfsError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_too_deep_rejected() {
        assert!(matches!(
            parse("/v3/pdb/2/A/12AS/P00963_v3.cif/extra"),
            Err(AfsError::InvalidPath(_))
        ));
        assert!(matches!(
            parse("/v3/uniprot/9/6/P00963_v3.cif/extra"),
            Err(AfsError::InvalidPath(_))
        ));
    }

    proptest! {
        /// Any identifier routed through a shard pair other than its true
        /// shard key fails InvalidPath, even when the identifier exists.
        #[test]
        fn prop_shard_mismatch_rejected(
            id in "[A-Z0-9]{4,10}",
            c3 in "[A-Z0-9]",
            c2 in "[A-Z0-9]",
        ) {
            let c3c = c3.chars().next().unwrap();
            let c2c = c2.chars().next().unwrap();
            let path = format!("/v3/pdb/{c3}/{c2}/{id}");
            let parsed = parse(&path);
            if shard_key(&id) == Some((c3c, c2c)) {
                prop_assert!(parsed.is_ok());
            } else {
                prop_assert!(matches!(parsed, Err(AfsError::InvalidPath(_))));
            }
        }

        /// The sharded uniprot leaf built from an identifier's own shard key
        /// always routes to a File for that identifier.
        #[test]
        fn prop_sharded_uniprot_roundtrip(id in "[A-Z0-9]{6,10}") {
            let (c3, c2) = shard_key(&id).unwrap();
            let path = format!("/v3/uniprot/{c3}/{c2}/{id}_v3.cif");
            prop_assert_eq!(
                parse(&path).unwrap(),
                Route::File { version: Version(3), uniprot_id: id }
            );
        }
    }
}
