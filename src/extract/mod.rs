//! Field extraction stage
//!
//! Pulls the text layer out of each searchable PDF, splits it into
//! token-budgeted chunks, asks the completion model for the target fields per
//! chunk, and merges the per-chunk answers into one record per document.

pub mod chunk;
pub mod llm;
pub mod merge;

pub use chunk::{Chunker, TokenCounter};
pub use llm::{CompletionClient, OpenAiClient};
pub use merge::{
    clean_apn_taxid, merge_records, parse_chunk_response, FieldRecord, ERROR_OCCURRED, NOT_FOUND,
    NO_TEXT, PARSE_ERROR,
};

use crate::config::Config;
use crate::error::Result;
use crate::status::{RunStatus, Stage};
use crate::store::ArtifactStore;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "You are a data extraction specialist. Extract only \
the requested information and return it in valid JSON format.";

/// One extraction result row
#[derive(Debug, Clone)]
pub struct ExtractionRecord {
    /// Searchable PDF file name
    pub pdf_name: String,
    /// Merged field values
    pub fields: FieldRecord,
}

/// Statistics from an extraction pass
#[derive(Debug, Default, Clone)]
pub struct ExtractStats {
    /// Searchable PDFs examined
    pub documents_processed: usize,
    /// Documents with at least one field found
    pub documents_with_fields: usize,
    /// Documents with no extractable text layer
    pub documents_without_text: usize,
    /// Chunk completions requested
    pub chunks_sent: usize,
}

fn chunk_prompt(pdf_name: &str, chunk: &str) -> String {
    format!(
        "Extract the following fields from this legal document excerpt \
         ({pdf_name}) and respond with a single JSON object with exactly \
         these keys: \"date\", \"owner_name\", \"address\", \"apn_taxid\". \
         Use the string \"{NOT_FOUND}\" for any field not present in the \
         excerpt.\n\nDocument text:\n{chunk}"
    )
}

/// Run field extraction over every searchable artifact in the store.
pub async fn cmd_extract(
    config: &Config,
    store: &ArtifactStore,
    client: &dyn CompletionClient,
    status: &mut RunStatus,
) -> Result<(Vec<ExtractionRecord>, ExtractStats)> {
    status.begin_stage(Stage::Extract, 66);

    let searchable = store.list_searchable()?;
    let mut stats = ExtractStats::default();
    let mut records = Vec::with_capacity(searchable.len());

    if searchable.is_empty() {
        status.log("No searchable PDFs to extract from");
        return Ok((records, stats));
    }

    let chunker = Chunker::from_config(
        config.extract.tokenizer_file.as_deref(),
        config.extract.max_chunk_tokens,
        config.extract.fallback_chunk_chars,
    );
    status.log(&format!(
        "Extracting fields from {} searchable PDFs",
        searchable.len()
    ));

    let pb = ProgressBar::new(searchable.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );

    for path in searchable {
        stats.documents_processed += 1;
        let pdf_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        pb.set_message(pdf_name.clone());

        let text = match pdf_extract::extract_text(&path) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to read text layer of {}: {}", pdf_name, e);
                String::new()
            }
        };

        let fields = if text.trim().is_empty() {
            stats.documents_without_text += 1;
            FieldRecord::no_text()
        } else {
            extract_document(&pdf_name, &text, &chunker, client, &mut stats).await
        };

        if fields.has_any_value() {
            stats.documents_with_fields += 1;
        }
        records.push(ExtractionRecord { pdf_name, fields });
        pb.inc(1);
    }
    pb.finish_and_clear();

    status.log(&format!(
        "Extraction complete: {} of {} documents yielded fields",
        stats.documents_with_fields, stats.documents_processed
    ));
    Ok((records, stats))
}

/// Chunk one document, query the model per chunk, and merge the answers.
///
/// A failed completion yields an error-sentinel record for that chunk only;
/// the remaining chunks still run.
async fn extract_document(
    pdf_name: &str,
    text: &str,
    chunker: &Chunker,
    client: &dyn CompletionClient,
    stats: &mut ExtractStats,
) -> FieldRecord {
    let chunks = chunker.split(text);
    debug!("{}: {} chunks", pdf_name, chunks.len());

    let mut partials = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
        stats.chunks_sent += 1;
        let record = match client.complete(SYSTEM_PROMPT, &chunk_prompt(pdf_name, chunk)).await {
            Ok(content) => parse_chunk_response(&content),
            Err(e) => {
                warn!("Completion failed for a chunk of {}: {}", pdf_name, e);
                FieldRecord::error_occurred()
            }
        };
        partials.push(record);
    }

    let mut merged = merge_records(&partials);
    merged.apn_taxid = clean_apn_taxid(&merged.apn_taxid);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns scripted responses in call order
    struct ScriptedClient {
        responses: Mutex<Vec<Result<String>>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<String>>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(Error::Extract("script exhausted".to_string()));
            }
            responses.remove(0)
        }
    }

    fn word_chunker(budget: usize) -> Chunker {
        struct WordCounter;
        impl TokenCounter for WordCounter {
            fn count(&self, text: &str) -> std::result::Result<usize, String> {
                Ok(text.split_whitespace().count())
            }
        }
        Chunker::new(Some(Box::new(WordCounter)), budget, 4000)
    }

    #[tokio::test]
    async fn test_extract_document_merges_chunks() {
        // Two chunks; owner appears in the first, date in the second
        let client = ScriptedClient::new(vec![
            Ok(r#"{"owner_name": "Jane Doe"}"#.to_string()),
            Ok(r#"{"date": "2024-05-01", "apn_taxid": "123-45-6789"}"#.to_string()),
        ]);
        let mut stats = ExtractStats::default();

        let merged = extract_document(
            "doc_searchable.pdf",
            "grantor jane doe conveys parcel recorded may first",
            &word_chunker(4),
            &client,
            &mut stats,
        )
        .await;

        assert_eq!(merged.owner_name, "Jane Doe");
        assert_eq!(merged.date, "2024-05-01");
        assert_eq!(merged.apn_taxid, "123456789");
        assert_eq!(stats.chunks_sent, 2);
    }

    #[tokio::test]
    async fn test_failed_chunk_does_not_abort_document() {
        let client = ScriptedClient::new(vec![
            Err(Error::Extract("timeout".to_string())),
            Ok(r#"{"owner_name": "John Smith"}"#.to_string()),
        ]);
        let mut stats = ExtractStats::default();

        let merged = extract_document(
            "doc_searchable.pdf",
            "first chunk words here second chunk words here",
            &word_chunker(4),
            &client,
            &mut stats,
        )
        .await;

        assert_eq!(merged.owner_name, "John Smith");
        assert_eq!(merged.date, NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unparseable_responses_merge_to_not_found() {
        let client = ScriptedClient::new(vec![Ok("no json here".to_string())]);
        let mut stats = ExtractStats::default();

        let merged = extract_document(
            "doc_searchable.pdf",
            "short text",
            &word_chunker(100),
            &client,
            &mut stats,
        )
        .await;

        assert_eq!(merged, FieldRecord::not_found());
    }
}
