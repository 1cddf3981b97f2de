//! Token-budgeted text chunking
//!
//! Splits extracted document text into chunks that fit the completion model's
//! context. Words are packed greedily against a token budget; when no token
//! counter is available (or counting fails) the splitter degrades to fixed
//! character slices.

use std::path::Path;
use tokenizers::Tokenizer;
use tracing::{debug, warn};

/// Counts model tokens for a piece of text.
///
/// Failures are surfaced as strings so the chunker can fall back to character
/// slicing instead of aborting the document.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> Result<usize, String>;
}

impl TokenCounter for Tokenizer {
    fn count(&self, text: &str) -> Result<usize, String> {
        self.encode(text, false)
            .map(|encoding| encoding.get_ids().len())
            .map_err(|e| e.to_string())
    }
}

/// Greedy word-packing chunker with a character-slice fallback
pub struct Chunker {
    counter: Option<Box<dyn TokenCounter>>,
    budget: usize,
    fallback_chars: usize,
}

impl Chunker {
    pub fn new(counter: Option<Box<dyn TokenCounter>>, budget: usize, fallback_chars: usize) -> Self {
        Self {
            counter,
            budget,
            fallback_chars,
        }
    }

    /// Build a chunker from config, loading the tokenizer file when one is
    /// configured. An unloadable tokenizer downgrades to the fallback rather
    /// than failing the stage.
    pub fn from_config(
        tokenizer_file: Option<&Path>,
        budget: usize,
        fallback_chars: usize,
    ) -> Self {
        let counter: Option<Box<dyn TokenCounter>> = match tokenizer_file {
            Some(path) => match Tokenizer::from_file(path) {
                Ok(tokenizer) => {
                    debug!("Loaded tokenizer from {}", path.display());
                    Some(Box::new(tokenizer))
                }
                Err(e) => {
                    warn!(
                        "Failed to load tokenizer {}, using character slicing: {}",
                        path.display(),
                        e
                    );
                    None
                }
            },
            None => None,
        };
        Self::new(counter, budget, fallback_chars)
    }

    /// Split text into chunks. No text is ever dropped: the concatenation of
    /// the chunks contains every word of the input.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let Some(counter) = &self.counter else {
            return char_slices(text, self.fallback_chars);
        };

        match self.split_by_tokens(text, counter.as_ref()) {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!("Token counting failed, using character slicing: {}", e);
                char_slices(text, self.fallback_chars)
            }
        }
    }

    fn split_by_tokens(&self, text: &str, counter: &dyn TokenCounter) -> Result<Vec<String>, String> {
        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for word in text.split_whitespace() {
            current.push(word);
            let joined = current.join(" ");
            if counter.count(&joined)? > self.budget {
                if current.len() == 1 {
                    // A single word over budget becomes its own chunk; it
                    // cannot be split without losing text.
                    chunks.push(joined);
                    current.clear();
                } else {
                    current.pop();
                    chunks.push(current.join(" "));
                    current = vec![word];
                }
            }
        }
        if !current.is_empty() {
            chunks.push(current.join(" "));
        }

        Ok(chunks)
    }
}

/// Fixed-size character slices, split on char boundaries
fn char_slices(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size)
        .map(|c| c.iter().collect())
        .collect()
}
