//! OCR engine interface and the tesseract subprocess implementation
//!
//! The engine consumes one raster page image and returns text detections in
//! reading order. Rasterization is delegated to pdftoppm, text recognition
//! to tesseract's TSV output; both are probed once per batch.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// One recognized region of text
#[derive(Debug, Clone)]
pub struct Detection {
    /// Recognized line text
    pub text: String,
    /// Engine confidence, 0-100
    pub confidence: f32,
}

/// Text recognition over a single raster page image
pub trait OcrEngine {
    /// Recognize text in the image, returning detections in reading order
    fn recognize(&self, image: &Path) -> Result<Vec<Detection>>;
}

/// Check if tesseract is available on PATH
pub fn has_tesseract() -> bool {
    Command::new("tesseract")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check if pdftoppm (poppler-utils) is available on PATH
pub fn has_pdftoppm() -> bool {
    // pdftoppm -v prints to stderr; existence is all we need
    Command::new("pdftoppm").arg("-v").output().is_ok()
}

/// Rasterize every page of a PDF into PNG images at the given resolution,
/// returning the image paths in page order.
pub fn rasterize_pdf(pdf: &Path, dpi: u32, out_dir: &Path) -> Result<Vec<PathBuf>> {
    let prefix = out_dir.join("page");
    let output = Command::new("pdftoppm")
        .arg("-png")
        .arg("-r")
        .arg(dpi.to_string())
        .arg(pdf)
        .arg(&prefix)
        .output()
        .map_err(|e| Error::Ocr(format!("Failed to spawn pdftoppm: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Ocr(format!("pdftoppm failed: {}", stderr.trim())));
    }

    let mut pages: Vec<PathBuf> = std::fs::read_dir(out_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
        .collect();
    pages.sort();

    if pages.is_empty() {
        return Err(Error::Ocr(format!(
            "pdftoppm produced no page images for {}",
            pdf.display()
        )));
    }

    Ok(pages)
}

/// Tesseract subprocess engine
pub struct TesseractEngine {
    language: String,
}

impl TesseractEngine {
    /// Probe tool availability and construct the engine. The probe happens
    /// once here so the per-page calls can assume a working toolchain.
    pub fn new(language: &str) -> Result<Self> {
        if !has_tesseract() || !has_pdftoppm() {
            return Err(Error::Ocr(
                "OCR requires pdftoppm and tesseract. \
                 Install with: apt install poppler-utils tesseract-ocr"
                    .to_string(),
            ));
        }
        Ok(Self {
            language: language.to_string(),
        })
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, image: &Path) -> Result<Vec<Detection>> {
        let output = Command::new("tesseract")
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("tsv")
            .output()
            .map_err(|e| Error::Ocr(format!("Failed to spawn tesseract: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Ocr(format!("tesseract failed: {}", stderr.trim())));
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let detections = parse_tsv(&tsv);
        debug!("{}: {} detections", image.display(), detections.len());
        Ok(detections)
    }
}

/// Parse tesseract TSV output into line-level detections.
///
/// Word rows (conf >= 0) are grouped by (block, paragraph, line); the line
/// confidence is the minimum word confidence.
fn parse_tsv(tsv: &str) -> Vec<Detection> {
    let mut detections = Vec::new();
    let mut current_key: Option<(u32, u32, u32)> = None;
    let mut current_words: Vec<String> = Vec::new();
    let mut current_conf = f32::MAX;

    let flush = |words: &mut Vec<String>, conf: &mut f32, out: &mut Vec<Detection>| {
        if !words.is_empty() {
            out.push(Detection {
                text: words.join(" "),
                confidence: if *conf == f32::MAX { 0.0 } else { *conf },
            });
            words.clear();
            *conf = f32::MAX;
        }
    };

    for line in tsv.lines().skip(1) {
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }
        let conf: f32 = cols[10].parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if conf < 0.0 || text.is_empty() {
            continue;
        }

        let key = (
            cols[2].parse().unwrap_or(0),
            cols[3].parse().unwrap_or(0),
            cols[4].parse().unwrap_or(0),
        );

        if current_key != Some(key) {
            flush(&mut current_words, &mut current_conf, &mut detections);
            current_key = Some(key);
        }
        current_words.push(text.to_string());
        current_conf = current_conf.min(conf);
    }
    flush(&mut current_words, &mut current_conf, &mut detections);

    detections
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    #[test]
    fn test_parse_tsv_groups_words_into_lines() {
        let tsv = format!(
            "{}\n\
             5\t1\t1\t1\t1\t1\t10\t10\t40\t12\t96.5\tDEED\n\
             5\t1\t1\t1\t1\t2\t60\t10\t40\t12\t91.0\tOF\n\
             5\t1\t1\t1\t2\t1\t10\t30\t60\t12\t88.2\tTRUST\n",
            HEADER
        );

        let detections = parse_tsv(&tsv);
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].text, "DEED OF");
        assert_eq!(detections[0].confidence, 91.0);
        assert_eq!(detections[1].text, "TRUST");
    }

    #[test]
    fn test_parse_tsv_skips_structural_rows() {
        let tsv = format!(
            "{}\n\
             1\t1\t0\t0\t0\t0\t0\t0\t100\t100\t-1\t\n\
             4\t1\t1\t1\t1\t0\t10\t10\t80\t12\t-1\t\n\
             5\t1\t1\t1\t1\t1\t10\t10\t40\t12\t95.0\tGRANTOR\n",
            HEADER
        );

        let detections = parse_tsv(&tsv);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].text, "GRANTOR");
    }

    #[test]
    fn test_parse_tsv_empty_output() {
        assert!(parse_tsv(HEADER).is_empty());
        assert!(parse_tsv("").is_empty());
    }
}
