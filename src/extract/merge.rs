//! Extraction field records and merge semantics
//!
//! Each chunk yields a partial record; per-document merging takes the first
//! usable value per field in chunk order. Sentinel strings mark the
//! distinguishable failure states so the output table never holds blanks.

use serde::{Deserialize, Serialize};

/// Field value the model could not locate
pub const NOT_FOUND: &str = "Not found";
/// Model response that did not parse as the expected JSON
pub const PARSE_ERROR: &str = "Error parsing response";
/// Document with no extractable text layer
pub const NO_TEXT: &str = "No text extracted";
/// Processing failure outside the model response
pub const ERROR_OCCURRED: &str = "Error occurred";

fn default_not_found() -> String {
    NOT_FOUND.to_string()
}

/// The extracted fields for one document (or one chunk of it)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    #[serde(default = "default_not_found")]
    pub date: String,
    #[serde(default = "default_not_found")]
    pub owner_name: String,
    #[serde(default = "default_not_found")]
    pub address: String,
    #[serde(default = "default_not_found")]
    pub apn_taxid: String,
}

impl FieldRecord {
    fn uniform(value: &str) -> Self {
        Self {
            date: value.to_string(),
            owner_name: value.to_string(),
            address: value.to_string(),
            apn_taxid: value.to_string(),
        }
    }

    pub fn not_found() -> Self {
        Self::uniform(NOT_FOUND)
    }

    pub fn parse_error() -> Self {
        Self::uniform(PARSE_ERROR)
    }

    pub fn no_text() -> Self {
        Self::uniform(NO_TEXT)
    }

    pub fn error_occurred() -> Self {
        Self::uniform(ERROR_OCCURRED)
    }

    /// True when at least one field holds real extracted data
    pub fn has_any_value(&self) -> bool {
        [&self.date, &self.owner_name, &self.address, &self.apn_taxid]
            .iter()
            .any(|v| is_usable(v) && v.as_str() != NO_TEXT)
    }
}

/// True when a field value carries real extracted data
fn is_usable(value: &str) -> bool {
    !value.is_empty() && value != NOT_FOUND && value != PARSE_ERROR && value != ERROR_OCCURRED
}

/// Parse one chunk's model response into a record.
///
/// Markdown code fences around the JSON are tolerated; anything that still
/// fails to parse becomes a parse-error record rather than an error.
pub fn parse_chunk_response(content: &str) -> FieldRecord {
    let trimmed = strip_code_fences(content);
    serde_json::from_str(trimmed).unwrap_or_else(|_| FieldRecord::parse_error())
}

fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

/// Merge per-chunk records: the first usable value per field wins,
/// independently across fields. A field no chunk could supply stays
/// "Not found", even when some chunks failed outright.
pub fn merge_records(records: &[FieldRecord]) -> FieldRecord {
    FieldRecord {
        date: merge_field(records.iter().map(|r| r.date.as_str())),
        owner_name: merge_field(records.iter().map(|r| r.owner_name.as_str())),
        address: merge_field(records.iter().map(|r| r.address.as_str())),
        apn_taxid: merge_field(records.iter().map(|r| r.apn_taxid.as_str())),
    }
}

fn merge_field<'a>(mut values: impl Iterator<Item = &'a str>) -> String {
    values
        .find(|v| is_usable(v))
        .map(str::to_string)
        .unwrap_or_else(|| NOT_FOUND.to_string())
}

/// Normalize a parcel number to digits only. Values with no digits at all
/// pass through unchanged so sentinels and notes like "N/A" survive.
pub fn clean_apn_taxid(value: &str) -> String {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        value.to_string()
    } else {
        digits
    }
}
