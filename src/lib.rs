//! titlescout: incremental acquisition and extraction of land records
//!
//! The pipeline has three stages over a shared PDF artifact store:
//!
//! 1. `scrape` drives the county records portal in a headless browser,
//!    walks the paginated results grid, and downloads each row's PDFs.
//!    Rows whose artifacts are already stored are skipped.
//! 2. `ocr` deduplicates the store by content hash and replaces every raw
//!    PDF with an ASCII searchable-text counterpart.
//! 3. `extract` chunks each searchable PDF against a token budget, asks a
//!    completion model for the target fields per chunk, and merges the
//!    answers into one record per document.
//!
//! Results land as CSV files via `report`.

pub mod config;
pub mod error;
pub mod extract;
pub mod ocr;
pub mod report;
pub mod scrape;
pub mod status;
pub mod store;
