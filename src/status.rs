//! Run status tracking
//!
//! `RunStatus` is an explicit value object owned by the orchestrator and
//! passed to each stage, rather than process-global mutable state. It is
//! reset at run start and never persisted across restarts.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Scrape,
    Ocr,
    Extract,
    Done,
}

impl Stage {
    /// Human label for log lines and summaries
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Scrape => "Scraping data and downloading PDFs",
            Stage::Ocr => "Processing PDFs to make them searchable",
            Stage::Extract => "Extracting fields from searchable PDFs",
            Stage::Done => "Completed",
        }
    }
}

/// Process-wide run status snapshot
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub is_running: bool,
    pub current_stage: Option<Stage>,
    /// 0-100
    pub progress: u8,
    pub logs: Vec<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Last fatal error, if the run aborted
    pub error: Option<String>,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self {
            is_running: false,
            current_stage: None,
            progress: 0,
            logs: Vec::new(),
            start_time: None,
            end_time: None,
            error: None,
        }
    }
}

impl RunStatus {
    /// Reset and mark the run started
    pub fn start(&mut self) {
        *self = Self::default();
        self.is_running = true;
        self.start_time = Some(Utc::now());
    }

    /// Enter a stage and set its baseline progress
    pub fn begin_stage(&mut self, stage: Stage, progress: u8) {
        self.current_stage = Some(stage);
        self.progress = progress.min(100);
        self.log(&format!("▶ {}", stage.label()));
    }

    /// Append a timestamped log line
    pub fn log(&mut self, message: &str) {
        let line = format!("[{}] {}", Local::now().format("%Y-%m-%d %H:%M:%S"), message);
        tracing::info!("{}", message);
        self.logs.push(line);
    }

    /// Record a stage-fatal error and terminate the run
    pub fn fail(&mut self, error: &str) {
        self.error = Some(error.to_string());
        self.log(&format!("✗ {}", error));
        self.finish();
    }

    /// Mark the run complete
    pub fn complete(&mut self) {
        self.current_stage = Some(Stage::Done);
        self.progress = 100;
        self.log("✓ All processing completed");
        self.finish();
    }

    fn finish(&mut self) {
        self.is_running = false;
        self.end_time = Some(Utc::now());
    }
}

/// Outcome of one unit of work (a row, a file, a document).
///
/// Returned to the caller and aggregated there, instead of using errors as
/// per-unit control flow: one failed unit never aborts the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOutcome<T> {
    /// Work produced a value
    Saved(T),
    /// Work was not needed
    Skipped(String),
    /// Work failed; the cause is logged by the caller
    Failed(String),
}
