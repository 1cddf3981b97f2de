//! OCR normalization stage
//!
//! Converts raw PDF artifacts into searchable text PDFs: deduplicate the
//! store, rasterize each raw PDF, recognize page text, sanitize it to ASCII,
//! and compose a `_searchable` replacement. Originals are deleted only after
//! their replacement is fully written.

pub mod compose;
pub mod engine;
pub mod sanitize;

pub use compose::compose_searchable_pdf;
pub use engine::{rasterize_pdf, Detection, OcrEngine, TesseractEngine};
pub use sanitize::sanitize_text;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::status::{RunStatus, Stage, WorkOutcome};
use crate::store::{ArtifactStore, SEARCHABLE_SUFFIX};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// Statistics from an OCR pass
#[derive(Debug, Default, Clone)]
pub struct OcrStats {
    /// Raw PDFs considered
    pub files_processed: usize,
    /// Raw PDFs replaced by searchable counterparts
    pub files_converted: usize,
    /// Raw PDFs left in place after a failure
    pub files_failed: usize,
    /// Duplicate files removed before conversion
    pub duplicates_removed: usize,
}

/// Run the OCR normalization pass over every raw artifact in the store.
///
/// Engine construction failure (missing tools) aborts the whole stage;
/// per-file failures are logged and the batch continues.
pub fn cmd_ocr(config: &Config, store: &mut ArtifactStore, status: &mut RunStatus) -> Result<OcrStats> {
    status.begin_stage(Stage::Ocr, 33);

    let mut stats = OcrStats {
        duplicates_removed: store.dedup()?,
        ..Default::default()
    };
    if stats.duplicates_removed > 0 {
        status.log(&format!(
            "Removed {} duplicate PDF files",
            stats.duplicates_removed
        ));
    }

    let raw = store.list_raw()?;
    if raw.is_empty() {
        status.log("No PDFs pending OCR conversion");
        return Ok(stats);
    }

    let engine = TesseractEngine::new(&config.ocr.language)?;
    status.log(&format!("Converting {} PDFs to searchable text", raw.len()));

    let pb = ProgressBar::new(raw.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );

    for path in raw {
        stats.files_processed += 1;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        pb.set_message(name.clone());

        match normalize_one(&path, &engine, config.ocr.dpi, store) {
            WorkOutcome::Saved(searchable_name) => {
                stats.files_converted += 1;
                info!("Converted {} -> {}", name, searchable_name);
            }
            WorkOutcome::Skipped(reason) => {
                info!("Skipped {}: {}", name, reason);
            }
            WorkOutcome::Failed(reason) => {
                stats.files_failed += 1;
                warn!("OCR failed for {}: {}", name, reason);
                status.log(&format!("OCR failed for {}: {}", name, reason));
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    status.log(&format!(
        "OCR complete: {} converted, {} failed",
        stats.files_converted, stats.files_failed
    ));
    Ok(stats)
}

/// Convert one raw PDF into its searchable counterpart.
///
/// The original is deleted only after the searchable file exists on disk, so
/// any failure leaves the raw artifact in place for a later retry.
fn normalize_one(
    path: &Path,
    engine: &dyn OcrEngine,
    dpi: u32,
    store: &mut ArtifactStore,
) -> WorkOutcome<String> {
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return WorkOutcome::Failed("file name is not valid UTF-8".to_string());
    };
    let Some(raw_name) = path.file_name().and_then(|n| n.to_str()).map(String::from) else {
        return WorkOutcome::Failed("file name is not valid UTF-8".to_string());
    };

    let searchable_name = format!("{}{}.pdf", stem, SEARCHABLE_SUFFIX);
    let searchable_path = store.dir().join(&searchable_name);
    if searchable_path.exists() {
        return WorkOutcome::Skipped("searchable counterpart already exists".to_string());
    }

    let scratch = ScratchDir::new();
    if let Err(e) = std::fs::create_dir_all(scratch.path()) {
        return WorkOutcome::Failed(format!("failed to create scratch dir: {}", e));
    }

    let result = recognize_pdf(path, engine, dpi, scratch.path())
        .and_then(|pages| compose_searchable_pdf(&pages, &searchable_path));

    match result {
        Ok(()) => {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("Failed to remove original {}: {}", path.display(), e);
            }
            if let Err(e) = store.retire_original(&raw_name, &searchable_name) {
                warn!("Failed to update manifest for {}: {}", searchable_name, e);
            }
            WorkOutcome::Saved(searchable_name)
        }
        Err(e) => WorkOutcome::Failed(e.to_string()),
    }
}

/// Rasterize and recognize every page, returning one sanitized text per page
fn recognize_pdf(
    pdf: &Path,
    engine: &dyn OcrEngine,
    dpi: u32,
    scratch: &Path,
) -> Result<Vec<String>> {
    let images = rasterize_pdf(pdf, dpi, scratch)?;

    let mut pages = Vec::with_capacity(images.len());
    for image in &images {
        let detections = engine.recognize(image)?;
        let page_text = detections
            .iter()
            .map(|d| d.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        pages.push(sanitize_text(&page_text));
    }

    if pages.iter().all(|p| p.is_empty()) {
        return Err(Error::Ocr("no text recognized in any page".to_string()));
    }
    Ok(pages)
}

/// Temp directory for page rasters, removed on drop
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    fn new() -> Self {
        Self {
            path: std::env::temp_dir().join(format!("titlescout-ocr-{}", Uuid::new_v4())),
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.path.exists() {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }
}
