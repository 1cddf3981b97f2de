//! PDF artifact store
//!
//! A flat directory of immutable PDF artifacts plus a JSON manifest. Files
//! are raw downloads or OCR-normalized searchable PDFs, distinguished by the
//! `_searchable` file name suffix. Duplicate content is detected by SHA-256
//! and reduced to the shortest-named representative.

mod manifest;

pub use manifest::{ArtifactRef, Manifest, MANIFEST_FILE};

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name suffix marking an OCR-normalized artifact
pub const SEARCHABLE_SUFFIX: &str = "_searchable";

/// Maximum artifact file name length
const MAX_NAME_LEN: usize = 100;
/// Stem length kept when truncating an over-long name
const TRUNCATED_STEM_LEN: usize = 95;

/// Replace characters disallowed in file names and truncate to the
/// filesystem-safe limit, preserving the extension.
pub fn clean_filename(name: &str) -> String {
    let mut cleaned: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c => c,
        })
        .collect();

    if cleaned.chars().count() > MAX_NAME_LEN {
        let (stem, ext) = match cleaned.rfind('.') {
            Some(idx) => (cleaned[..idx].to_string(), cleaned[idx..].to_string()),
            None => (cleaned.clone(), String::new()),
        };
        let stem: String = stem.chars().take(TRUNCATED_STEM_LEN).collect();
        cleaned = format!("{}{}", stem, ext);
    }

    cleaned
}

/// Derive the idempotency identifier for a scraped row: the cleaned first
/// column when present, else a synthetic row/page marker.
pub fn resolve_identity(row: &[String], row_index: usize, page_number: u32) -> String {
    match row.first() {
        Some(first) if !first.is_empty() => clean_filename(first),
        _ => format!("row_{}_page_{}", row_index, page_number),
    }
}

/// Whether a file name carries the searchable suffix
pub fn is_searchable_name(file_name: &str) -> bool {
    file_name.ends_with(&format!("{}.pdf", SEARCHABLE_SUFFIX))
}

/// Streamed SHA-256 of a file, hex encoded
pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// The PDF store directory and its manifest
pub struct ArtifactStore {
    dir: PathBuf,
    manifest: Manifest,
}

impl ArtifactStore {
    /// Open (creating if needed) the store at the given directory
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let manifest = Manifest::load_or_rebuild(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            manifest,
        })
    }

    /// The store directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Conservative idempotency check: true iff any artifact matches the
    /// identifier. Rows whose identifier matches are skipped entirely,
    /// including re-fetch and re-OCR.
    pub fn exists_for(&self, identifier: &str) -> bool {
        self.manifest.matches(identifier)
    }

    /// Resolve a collision-free file name by appending `_1`, `_2`, ... before
    /// the extension until the name is unused.
    pub fn unique_name(&self, base_name: &str) -> String {
        if !self.dir.join(base_name).exists() {
            return base_name.to_string();
        }

        let (stem, ext) = match base_name.rfind('.') {
            Some(idx) => (&base_name[..idx], &base_name[idx..]),
            None => (base_name, ""),
        };

        let mut counter = 1;
        loop {
            let candidate = format!("{}_{}{}", stem, counter, ext);
            if !self.dir.join(&candidate).exists() {
                return candidate;
            }
            counter += 1;
        }
    }

    /// Record a freshly written artifact under its row identifier
    pub fn record(&mut self, identifier: &str, file_name: &str) -> Result<()> {
        let path = self.dir.join(file_name);
        let sha256 = file_sha256(&path)?;
        self.manifest.insert(
            identifier,
            ArtifactRef {
                file_name: file_name.to_string(),
                sha256,
                searchable: is_searchable_name(file_name),
            },
        );
        self.manifest.save(&self.dir)
    }

    /// All PDF files currently in the store, sorted by name
    pub fn list_pdfs(&self) -> Result<Vec<PathBuf>> {
        let mut pdfs: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|e| e == "pdf"))
            .collect();
        pdfs.sort();
        Ok(pdfs)
    }

    /// PDF files not yet OCR-normalized
    pub fn list_raw(&self) -> Result<Vec<PathBuf>> {
        Ok(self
            .list_pdfs()?
            .into_iter()
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| !is_searchable_name(n))
            })
            .collect())
    }

    /// OCR-normalized PDF files
    pub fn list_searchable(&self) -> Result<Vec<PathBuf>> {
        Ok(self
            .list_pdfs()?
            .into_iter()
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(is_searchable_name)
            })
            .collect())
    }

    /// Replace a raw artifact with its searchable counterpart in the manifest
    /// after the OCR pass has written the new file and deleted the original.
    pub fn retire_original(&mut self, raw_name: &str, searchable_name: &str) -> Result<()> {
        let sha256 = file_sha256(&self.dir.join(searchable_name))?;
        self.manifest.retire(raw_name, searchable_name, sha256);
        self.manifest.save(&self.dir)
    }

    /// Remove duplicate artifacts by content hash, keeping the file with the
    /// shortest name in each group. Returns the number of files removed.
    /// Idempotent: a second pass over a deduplicated store removes nothing.
    pub fn dedup(&mut self) -> Result<usize> {
        let pdfs = self.list_pdfs()?;
        info!("Checking for duplicates among {} PDF files", pdfs.len());

        let mut by_hash: HashMap<String, Vec<PathBuf>> = HashMap::new();
        for path in pdfs {
            match file_sha256(&path) {
                Ok(hash) => by_hash.entry(hash).or_default().push(path),
                Err(e) => {
                    // One bad file never aborts the pass
                    warn!("Failed to hash {}: {}", path.display(), e);
                }
            }
        }

        let mut removed = 0;
        for (_, mut group) in by_hash {
            if group.len() < 2 {
                continue;
            }

            // Shortest name is treated as the canonical original
            group.sort_by_key(|p| {
                let name = p
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_string();
                (name.len(), name)
            });

            let keep = &group[0];
            debug!("Keeping {} among {} duplicates", keep.display(), group.len());

            for duplicate in &group[1..] {
                let name = duplicate
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_string();
                match std::fs::remove_file(duplicate) {
                    Ok(()) => {
                        self.manifest.remove_file(&name);
                        info!("Removed duplicate: {}", name);
                        removed += 1;
                    }
                    Err(e) => {
                        warn!("Failed to remove duplicate {}: {}", name, e);
                    }
                }
            }
        }

        if removed > 0 {
            self.manifest.save(&self.dir)?;
            info!("Removed {} duplicate PDF files", removed);
        }

        Ok(removed)
    }

    /// Artifact count known to the manifest
    pub fn manifest_len(&self) -> usize {
        self.manifest.len()
    }
}

impl std::fmt::Debug for ArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStore")
            .field("dir", &self.dir)
            .field("manifest_entries", &self.manifest.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_with_files(files: &[(&str, &[u8])]) -> (TempDir, ArtifactStore) {
        let tmp = TempDir::new().unwrap();
        for (name, content) in files {
            std::fs::write(tmp.path().join(name), content).unwrap();
        }
        let store = ArtifactStore::open(tmp.path()).unwrap();
        (tmp, store)
    }

    #[test]
    fn test_clean_filename_replaces_invalid_chars() {
        assert_eq!(clean_filename("a<b>c:d\"e/f\\g|h?i*j"), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(clean_filename("DEED 2024-001.pdf"), "DEED 2024-001.pdf");
    }

    #[test]
    fn test_clean_filename_truncates_long_names() {
        let long = format!("{}:{}?.pdf", "x".repeat(80), "y".repeat(70));
        let cleaned = clean_filename(&long);
        assert!(cleaned.chars().count() <= 100);
        assert!(cleaned.ends_with(".pdf"));
        assert!(!cleaned.contains(':'));
        assert!(!cleaned.contains('?'));
    }

    #[test]
    fn test_resolve_identity_prefers_first_column() {
        let row = vec!["DEED/2024:001".to_string(), "Jane Doe".to_string()];
        assert_eq!(resolve_identity(&row, 3, 2), "DEED_2024_001");
    }

    #[test]
    fn test_resolve_identity_fallback() {
        let row = vec!["".to_string(), "Jane Doe".to_string()];
        assert_eq!(resolve_identity(&row, 3, 2), "row_3_page_2");
        assert_eq!(resolve_identity(&[], 1, 1), "row_1_page_1");
    }

    #[test]
    fn test_unique_name_appends_counter() {
        let (_tmp, store) = store_with_files(&[
            ("doc.pdf", b"one"),
            ("doc_1.pdf", b"two"),
        ]);

        assert_eq!(store.unique_name("other.pdf"), "other.pdf");
        assert_eq!(store.unique_name("doc.pdf"), "doc_2.pdf");
    }

    #[test]
    fn test_exists_for_matches_substring() {
        let (_tmp, store) = store_with_files(&[("DEED_2024_001_saved.pdf", b"bytes")]);
        assert!(store.exists_for("DEED_2024_001"));
        assert!(!store.exists_for("DEED_2024_002"));
    }

    #[test]
    fn test_dedup_keeps_shortest_name() {
        let (tmp, mut store) = store_with_files(&[
            ("doc.pdf", b"same content"),
            ("doc_copy_with_longer_name.pdf", b"same content"),
            ("doc_1.pdf", b"same content"),
            ("unique.pdf", b"different content"),
        ]);

        let removed = store.dedup().unwrap();
        assert_eq!(removed, 2);
        assert!(tmp.path().join("doc.pdf").exists());
        assert!(!tmp.path().join("doc_1.pdf").exists());
        assert!(!tmp.path().join("doc_copy_with_longer_name.pdf").exists());
        assert!(tmp.path().join("unique.pdf").exists());
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let (_tmp, mut store) = store_with_files(&[
            ("a.pdf", b"dup"),
            ("a_longer.pdf", b"dup"),
        ]);

        assert_eq!(store.dedup().unwrap(), 1);
        assert_eq!(store.dedup().unwrap(), 0);
    }

    #[test]
    fn test_list_raw_and_searchable() {
        let (_tmp, store) = store_with_files(&[
            ("raw.pdf", b"raw"),
            ("done_searchable.pdf", b"done"),
        ]);

        let raw = store.list_raw().unwrap();
        let searchable = store.list_searchable().unwrap();
        assert_eq!(raw.len(), 1);
        assert_eq!(searchable.len(), 1);
        assert!(raw[0].ends_with("raw.pdf"));
        assert!(searchable[0].ends_with("done_searchable.pdf"));
    }

    #[test]
    fn test_record_then_exists() {
        let (tmp, mut store) = store_with_files(&[]);
        std::fs::write(tmp.path().join("DEED_42.pdf"), b"bytes").unwrap();
        store.record("DEED_42", "DEED_42.pdf").unwrap();
        assert!(store.exists_for("DEED_42"));

        // Survives a reopen via the persisted manifest
        let reopened = ArtifactStore::open(tmp.path()).unwrap();
        assert!(reopened.exists_for("DEED_42"));
    }

    #[test]
    fn test_file_sha256_streams_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("big.pdf");
        std::fs::write(&path, vec![7u8; 50_000]).unwrap();

        let h1 = file_sha256(&path).unwrap();
        let h2 = file_sha256(&path).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }
}
