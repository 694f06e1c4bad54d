//! Phone number extraction from free-text blobs
//!
//! Policy: a fragment is a phone when it holds 8 to 15 digits once every
//! non-digit is dropped. Tax ids (CUIT) and dates are stripped before
//! splitting so their digits never reach a fragment.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

pub const MIN_PHONE_DIGITS: usize = 8;
pub const MAX_PHONE_DIGITS: usize = 15;

static TAX_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{2}-\d{8}-\d\b").expect("valid tax id regex"));

static DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{2}/\d{2}/\d{4}\b").expect("valid date regex"));

static SEPARATORS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)//|/|\*|_|cel:?|tel:?|móvil:?|movil:?|contacto:?|;|,|\|")
        .expect("valid separator regex")
});

/// Plausible phone numbers in `text`, deduplicated, in first-seen order
pub fn extract_phones(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let text = TAX_ID.replace_all(text, "");
    let text = DATE.replace_all(&text, "");

    let mut seen = HashSet::new();
    SEPARATORS
        .split(&text)
        .map(|fragment| fragment.chars().filter(char::is_ascii_digit).collect::<String>())
        .filter(|digits| (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len()))
        .filter(|digits| seen.insert(digits.clone()))
        .collect()
}
