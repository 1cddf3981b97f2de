//! OCR text sanitization
//!
//! Recognized text goes into a synthetic PDF rendered with a Type1 font, so
//! everything must be reduced to ASCII: common currency/unit symbols are
//! mapped to ASCII equivalents, anything else non-ASCII is stripped, and
//! whitespace runs are collapsed.

use once_cell::sync::Lazy;
use regex::Regex;

static NON_ASCII: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\x00-\x7F]+").unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Symbol substitutions applied before the non-ASCII strip
const SYMBOL_MAP: &[(&str, &str)] = &[
    ("€", "EUR"),
    ("£", "GBP"),
    ("$", "USD"),
    ("°", " degrees"),
    ("±", "+/-"),
    ("×", "x"),
    ("÷", "/"),
];

/// Sanitize one page of recognized text
pub fn sanitize_text(text: &str) -> String {
    let mut out = text.to_string();
    for (symbol, replacement) in SYMBOL_MAP {
        out = out.replace(symbol, replacement);
    }
    let out = NON_ASCII.replace_all(&out, " ");
    WHITESPACE_RUN.replace_all(&out, " ").trim().to_string()
}
