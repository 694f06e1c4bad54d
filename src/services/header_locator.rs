//! Header row discovery for tables with no fixed schema
//!
//! Exports often start with a report banner (company name, print date,
//! page number) before the real column headers. The locator scans the top
//! of the table and picks the first row that looks like a header.

use crate::services::column_classifier::keywords_for;
use crate::types::CanonicalField;

/// Minimum non-empty cells for a row to be considered a header
const MIN_HEADER_CELLS: usize = 3;

/// Index of the first row within `scan_rows` that qualifies as a header.
///
/// First match wins. `None` means every row is data.
pub fn locate_header(rows: &[Vec<String>], scan_rows: usize) -> Option<usize> {
    rows.iter()
        .take(scan_rows)
        .position(|row| is_header_candidate(row))
}

fn is_header_candidate(row: &[String]) -> bool {
    let filled = row.iter().filter(|c| !c.trim().is_empty()).count();
    if filled < MIN_HEADER_CELLS {
        return false;
    }

    // same vocabulary the classifier uses for the id and name columns
    let text = row.join(" ").to_lowercase();
    let mentions = |field| keywords_for(field).iter().any(|k| text.contains(k));
    mentions(CanonicalField::CustomerId) && mentions(CanonicalField::Name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::column_classifier::classify_columns;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_header_after_report_banner() {
        let table = rows(&[
            &["WOOD TOOLS S.A.", "", ""],
            &["Fecha: 01/02/2024", "Hoja: 1", ""],
            &["Cód.", "Razón Social", "Localidad", "Vendedor"],
            &["100", "Acme", "Merlo", "Diaz"],
        ]);
        assert_eq!(locate_header(&table, 30), Some(2));
    }

    #[test]
    fn test_row_needs_three_filled_cells() {
        let table = rows(&[
            &["Cod", "Nombre", ""],
            &["Nro", "Cliente", "Tel"],
        ]);
        assert_eq!(locate_header(&table, 30), Some(1));
    }

    #[test]
    fn test_requires_both_keyword_kinds() {
        let table = rows(&[
            &["Cliente", "Domicilio", "Telefono"],
            &["Acme", "Calle 1", "1144455566"],
        ]);
        assert_eq!(locate_header(&table, 30), None);
    }

    #[test]
    fn test_located_english_header_classifies_fully() {
        let table = rows(&[
            &["Customer Number", "Company Name", "Phone"],
            &["500", "Lopez", "1144455566"],
        ]);
        let header = locate_header(&table, 30).unwrap();
        assert_eq!(header, 0);

        let layout = classify_columns(&table[header]);
        assert_eq!(layout.labels, vec!["CustomerId", "Name", "RawPhone"]);
    }

    #[test]
    fn test_first_match_wins() {
        let table = rows(&[
            &["Cod", "Nombre", "Zona"],
            &["Código", "Cliente", "Vendedor"],
        ]);
        assert_eq!(locate_header(&table, 30), Some(0));
    }

    #[test]
    fn test_scan_window_is_respected() {
        let mut table = vec![vec!["x".to_string()]; 5];
        table.push(vec!["Cod".into(), "Nombre".into(), "Zona".into()]);
        assert_eq!(locate_header(&table, 5), None);
        assert_eq!(locate_header(&table, 6), Some(5));
    }
}
