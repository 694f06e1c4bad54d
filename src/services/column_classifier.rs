//! Maps arbitrary header text onto the canonical field set
//!
//! Rules are plain data evaluated in priority order. A header takes the
//! field of the first rule it matches; if that field has already been
//! claimed by an earlier column the header keeps its original label.
//! The header locator reads its keywords from the same rules.

use std::collections::HashSet;

use crate::types::CanonicalField;

/// Ordered (keywords, field) classification rules
pub const CLASSIFICATION_RULES: &[(&[&str], CanonicalField)] = &[
    (&["vend"], CanonicalField::Salesperson),
    (&["zona", "locali", "ciudad", "ubic"], CanonicalField::RawZone),
    (&["tel", "cel", "móvil", "movil", "contacto", "phone"], CanonicalField::RawPhone),
    (&["cód", "cod", "nro", "código", "code", "number"], CanonicalField::CustomerId),
    (
        &["nombre", "cliente", "razon", "razón", "social", "client", "name", "company"],
        CanonicalField::Name,
    ),
];

/// Keywords of the rule that assigns `field`
pub fn keywords_for(field: CanonicalField) -> &'static [&'static str] {
    CLASSIFICATION_RULES
        .iter()
        .find(|(_, f)| *f == field)
        .map(|(keywords, _)| *keywords)
        .unwrap_or_default()
}

/// Result of classifying one header row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    /// Final label of each kept column
    pub labels: Vec<String>,
    /// Index of each kept column in the source row
    pub sources: Vec<usize>,
}

impl ColumnLayout {
    /// Project a source row onto the kept columns
    pub fn project(&self, row: &[String]) -> Vec<(String, String)> {
        self.labels
            .iter()
            .zip(&self.sources)
            .map(|(label, &src)| (label.clone(), row.get(src).cloned().unwrap_or_default()))
            .collect()
    }
}

/// Field a single header would map to, ignoring what is already assigned
pub fn match_field(header: &str) -> Option<CanonicalField> {
    if let Some(field) = CanonicalField::from_label(header) {
        return Some(field);
    }
    let lowered = header.trim().to_lowercase();
    CLASSIFICATION_RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(_, field)| *field)
}

/// Classify a header row. Each canonical field is assigned at most once and
/// duplicate labels are collapsed to their first occurrence.
pub fn classify_columns(headers: &[String]) -> ColumnLayout {
    let mut assigned: HashSet<CanonicalField> = HashSet::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut layout = ColumnLayout {
        labels: Vec::with_capacity(headers.len()),
        sources: Vec::with_capacity(headers.len()),
    };

    for (idx, header) in headers.iter().enumerate() {
        let label = match match_field(header) {
            Some(field) if assigned.insert(field) => field.label().to_string(),
            _ => header.trim().to_string(),
        };

        if seen.insert(label.clone()) {
            layout.labels.push(label);
            layout.sources.push(idx);
        }
    }

    layout
}
