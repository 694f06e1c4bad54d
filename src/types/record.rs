//! Record types flowing through ingestion and unification

use serde::{Deserialize, Serialize};

/// Prefix of ids generated for rows that carry no customer id of their own
pub const SYNTHETIC_ID_PREFIX: &str = "SinID_";

/// Output columns of the unified table, in order
pub const OUTPUT_COLUMNS: [&str; 9] = [
    "Name",
    "CustomerId",
    "ResolvedZone",
    "Salesperson",
    "Phone1",
    "Phone2",
    "Phone3",
    "Phone4",
    "Phone5",
];

/// Maximum number of phones carried by a unified customer
pub const MAX_PHONES: usize = 5;

/// Target attributes that arbitrary input headers are mapped onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CanonicalField {
    Name,
    CustomerId,
    RawZone,
    Salesperson,
    /// Free phone/contact column. Only consumed through the row text.
    RawPhone,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 5] = [
        CanonicalField::Name,
        CanonicalField::CustomerId,
        CanonicalField::RawZone,
        CanonicalField::Salesperson,
        CanonicalField::RawPhone,
    ];

    /// Column label used once a source column has been classified
    pub fn label(self) -> &'static str {
        match self {
            CanonicalField::Name => "Name",
            CanonicalField::CustomerId => "CustomerId",
            CanonicalField::RawZone => "RawZone",
            CanonicalField::Salesperson => "Salesperson",
            CanonicalField::RawPhone => "RawPhone",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|field| field.label().eq_ignore_ascii_case(label))
    }
}

/// Where a record came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOrigin {
    pub file: String,
    pub row: usize,
}

/// One data row after header classification, before canonical projection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// Ordered (label, cell) pairs
    pub cells: Vec<(String, String)>,
    pub origin: RecordOrigin,
}

impl RawRow {
    pub fn get(&self, label: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, v)| v.trim().is_empty())
    }

    /// All non-empty cell values joined into one searchable blob
    pub fn row_text(&self) -> String {
        self.cells
            .iter()
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// A row of the in-memory table, guaranteed to expose the canonical fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    pub name: String,
    pub customer_id: String,
    pub raw_zone: String,
    pub salesperson: String,
    pub row_text: String,
    pub origin: RecordOrigin,
}

impl CanonicalRecord {
    pub fn from_raw(row: &RawRow) -> Self {
        let field = |f: CanonicalField| clean_cell(row.get(f.label()).unwrap_or_default());
        Self {
            name: field(CanonicalField::Name),
            customer_id: field(CanonicalField::CustomerId),
            raw_zone: field(CanonicalField::RawZone),
            salesperson: field(CanonicalField::Salesperson),
            row_text: row.row_text(),
            origin: row.origin.clone(),
        }
    }

    /// Customer id usable as a group key, if any
    pub fn real_customer_id(&self) -> Option<&str> {
        let id = self.customer_id.trim();
        (!id.is_empty() && !is_synthetic_id(id)).then_some(id)
    }
}

impl From<&UnifiedCustomer> for CanonicalRecord {
    fn from(customer: &UnifiedCustomer) -> Self {
        Self {
            name: customer.name.clone(),
            customer_id: customer.customer_id.clone(),
            raw_zone: customer.resolved_zone.clone(),
            salesperson: customer.salesperson.clone(),
            row_text: customer.phones.join(" | "),
            origin: RecordOrigin::default(),
        }
    }
}

/// Terminal output entity of the unifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedCustomer {
    pub name: String,
    /// Empty when the source only had a synthetic id
    pub customer_id: String,
    pub resolved_zone: String,
    pub salesperson: String,
    pub phones: Vec<String>,
}

impl UnifiedCustomer {
    /// Cells in `OUTPUT_COLUMNS` order
    pub fn to_row(&self) -> Vec<String> {
        let mut row = vec![
            self.name.clone(),
            self.customer_id.clone(),
            self.resolved_zone.clone(),
            self.salesperson.clone(),
        ];
        row.extend((0..MAX_PHONES).map(|i| self.phones.get(i).cloned().unwrap_or_default()));
        row
    }
}

pub fn is_synthetic_id(id: &str) -> bool {
    id.starts_with(SYNTHETIC_ID_PREFIX)
}

/// Spreadsheet exports spell missing cells in several ways
pub fn is_null_like(value: &str) -> bool {
    let v = value.trim();
    v.is_empty()
        || v.eq_ignore_ascii_case("nan")
        || v.eq_ignore_ascii_case("none")
        || v.eq_ignore_ascii_case("null")
}

/// Trimmed cell, or empty if the cell is a null-like token
pub fn clean_cell(value: &str) -> String {
    if is_null_like(value) {
        String::new()
    } else {
        value.trim().to_string()
    }
}
