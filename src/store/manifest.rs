//! Artifact manifest persisted alongside the PDF store
//!
//! Maps row identifiers to artifact file names and content hashes so the
//! idempotency check does not depend on filesystem globbing. The manifest is
//! advisory: when missing or unreadable it is rebuilt from a directory scan,
//! which degrades to the original match-identifier-in-filename semantics.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Manifest file name inside the store directory
pub const MANIFEST_FILE: &str = "manifest.json";

/// One artifact known to the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// File name within the store directory
    pub file_name: String,
    /// SHA-256 of the file content, hex encoded
    pub sha256: String,
    /// Whether the artifact is an OCR-normalized searchable PDF
    pub searchable: bool,
}

/// Identifier → artifact map for the store directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    entries: BTreeMap<String, ArtifactRef>,
}

impl Manifest {
    /// Load the manifest from a store directory, rebuilding it from a
    /// directory scan when missing or corrupt.
    pub fn load_or_rebuild(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str::<Manifest>(&content) {
                    Ok(manifest) => return Ok(manifest),
                    Err(e) => warn!("Manifest unreadable, rebuilding: {}", e),
                },
                Err(e) => warn!("Manifest unreadable, rebuilding: {}", e),
            }
        }
        Self::rebuild(dir)
    }

    /// Rebuild the manifest by scanning the store directory. Identifiers for
    /// pre-existing files are their stems, which preserves the conservative
    /// substring match used by `exists_for`.
    pub fn rebuild(dir: &Path) -> Result<Self> {
        let mut manifest = Manifest::default();
        if !dir.exists() {
            return Ok(manifest);
        }

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().map_or(true, |e| e != "pdf") {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let sha256 = match super::file_sha256(&path) {
                Ok(h) => h,
                Err(e) => {
                    warn!("Skipping unhashable file {}: {}", file_name, e);
                    continue;
                }
            };
            let stem = file_name.trim_end_matches(".pdf").to_string();
            manifest.entries.insert(
                stem,
                ArtifactRef {
                    file_name: file_name.to_string(),
                    sha256,
                    searchable: super::is_searchable_name(file_name),
                },
            );
        }

        debug!("Rebuilt manifest with {} entries", manifest.entries.len());
        Ok(manifest)
    }

    /// Persist the manifest into the store directory
    pub fn save(&self, dir: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(dir.join(MANIFEST_FILE), content)?;
        Ok(())
    }

    /// True iff any known artifact matches the identifier. Matches against
    /// both the recorded identifier and the artifact file name, mirroring the
    /// `*<identifier>*.pdf` glob this replaces.
    pub fn matches(&self, identifier: &str) -> bool {
        self.entries.iter().any(|(key, artifact)| {
            key.contains(identifier) || artifact.file_name.contains(identifier)
        })
    }

    /// Record an artifact under an identifier
    pub fn insert(&mut self, identifier: &str, artifact: ArtifactRef) {
        self.entries.insert(identifier.to_string(), artifact);
    }

    /// Drop every entry pointing at the given file name
    pub fn remove_file(&mut self, file_name: &str) {
        self.entries.retain(|_, a| a.file_name != file_name);
    }

    /// Replace a raw artifact's file with its searchable counterpart
    pub fn retire(&mut self, raw_file_name: &str, searchable_file_name: &str, sha256: String) {
        for artifact in self.entries.values_mut() {
            if artifact.file_name == raw_file_name {
                artifact.file_name = searchable_file_name.to_string();
                artifact.sha256 = sha256.clone();
                artifact.searchable = true;
            }
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over (identifier, artifact) pairs
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ArtifactRef)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_matches_on_identifier_and_file_name() {
        let mut manifest = Manifest::default();
        manifest.insert(
            "DEED_2024_001",
            ArtifactRef {
                file_name: "DEED_2024_001.pdf".to_string(),
                sha256: "abc".to_string(),
                searchable: false,
            },
        );

        assert!(manifest.matches("DEED_2024_001"));
        assert!(manifest.matches("2024_001"));
        assert!(!manifest.matches("DEED_2024_002"));
    }

    #[test]
    fn test_rebuild_from_directory() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.pdf"), b"pdf a").unwrap();
        std::fs::write(tmp.path().join("b_searchable.pdf"), b"pdf b").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), b"not a pdf").unwrap();

        let manifest = Manifest::rebuild(tmp.path()).unwrap();
        assert_eq!(manifest.len(), 2);
        assert!(manifest.matches("a"));
        assert!(manifest.matches("b"));

        let searchable = manifest
            .iter()
            .find(|(_, a)| a.file_name == "b_searchable.pdf")
            .unwrap();
        assert!(searchable.1.searchable);
    }

    #[test]
    fn test_save_and_reload() {
        let tmp = TempDir::new().unwrap();
        let mut manifest = Manifest::default();
        manifest.insert(
            "row_1_page_1",
            ArtifactRef {
                file_name: "row_1_page_1.pdf".to_string(),
                sha256: "deadbeef".to_string(),
                searchable: false,
            },
        );
        manifest.save(tmp.path()).unwrap();

        let reloaded = Manifest::load_or_rebuild(tmp.path()).unwrap();
        assert!(reloaded.matches("row_1_page_1"));
    }

    #[test]
    fn test_corrupt_manifest_falls_back_to_scan() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(MANIFEST_FILE), b"{not json").unwrap();
        std::fs::write(tmp.path().join("doc.pdf"), b"pdf bytes").unwrap();

        let manifest = Manifest::load_or_rebuild(tmp.path()).unwrap();
        assert!(manifest.matches("doc"));
    }

    #[test]
    fn test_retire_flips_searchable() {
        let mut manifest = Manifest::default();
        manifest.insert(
            "doc",
            ArtifactRef {
                file_name: "doc.pdf".to_string(),
                sha256: "old".to_string(),
                searchable: false,
            },
        );

        manifest.retire("doc.pdf", "doc_searchable.pdf", "new".to_string());
        let (_, artifact) = manifest.iter().next().unwrap();
        assert_eq!(artifact.file_name, "doc_searchable.pdf");
        assert!(artifact.searchable);
    }
}
