//! Geographic zone classification against the static zone table
//!
//! Resolution order, first match wins:
//! 1. a `100`-`149` code token present in the table
//! 2. a zone label (text before the parenthetical), then a listed locality
//! 3. generic "ZONA SUR" / "ZONA NORTE" fallbacks
//! 4. the raw hint, verbatim
//! 5. `Unknown`
//!
//! A hint that is already a resolved label is kept unless the row text
//! carries a table code of its own.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::defaults::UNKNOWN_ZONE;
use crate::types::is_null_like;

/// Zone code and description, in lookup priority order
pub const ZONE_TABLE: &[(&str, &str)] = &[
    ("101", "ZONA NORTE (San Fernando, Tigre, V. Lopez, San Martin)"),
    ("102", "ZONA SUR (Avellaneda, Lanus, Quilmes, Bernal)"),
    ("103", "LA PLATA (Tolosa, Villa Elisa, City Bell, Centro)"),
    ("104", "ZONA SUR (Lomas, Temperley, Monte Grande, Ezeiza)"),
    ("107", "ZONA OESTE (Merlo, Moron, San Justo, Caseros, Ramos Mejia)"),
    ("110", "ZONA CAPITAL (Pompeya, Paternal, Barracas)"),
    ("115", "RUTA 29 (Gral. Belgrano, Brandsen, San Vicente)"),
    ("120", "RUTA 2 (Chascomus, Dolores, Lezama, La Costa)"),
    ("122", "ZONA SUR (Zapala, Junin de los Andes, Bariloche)"),
    ("124", "ZONA 124 (Jauregui, Lujan)"),
    ("130", "RUTA 5 (Trenque Lauquen, Rufino, Olavarria)"),
    ("132", "BAHIA BLANCA / SUR (Olavarria, Tres Arroyos, Tandil)"),
    ("136", "ENTRE RIOS (Gualeguaychu, Concordia, Parana)"),
    ("137", "CORDOBA (Capital, Carlos Paz, Rio IV)"),
    ("140", "ZONA 140 (Areco, Pergamino, San Nicolas)"),
    ("141", "LUJAN / MERCEDES (Giles, Pilar, Mercedes)"),
    ("142", "ROSARIO (Santa Fe, San Nicolas, Ramallo)"),
    ("143", "ZONA 143 (Urdinarrain, Victoria, Crespo)"),
    ("144", "RUTA 5 (Giles, Areco, Salto, Rojas)"),
    ("146", "SALTA (Salta, Catamarca, Tucuman, Jujuy)"),
    ("148", "RUTA 3 (Las Flores, Azul, Rauch)"),
    ("149", "ESPERANZA (Esperanza, Rafaela, Crespo)"),
];

/// Labels too generic to identify a single zone
const GENERIC_LABELS: &[&str] = &["ZONA", "RUTA", "ZONA SUR", "ZONA NORTE"];

/// Localities too generic to identify a single zone
const GENERIC_LOCALITIES: &[&str] = &["CENTRO", "CAPITAL"];

pub const SOUTH_FALLBACK: &str = "102 o 104 | ZONA SUR";
pub const NORTH_FALLBACK: &str = "101 | ZONA NORTE";

static ZONE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(1[0-4]\d)\b").expect("valid zone code regex"));

/// (table index, word-bounded locality pattern)
static LOCALITIES: Lazy<Vec<(usize, Regex)>> = Lazy::new(|| {
    ZONE_TABLE
        .iter()
        .enumerate()
        .flat_map(|(idx, (_, desc))| localities(desc).into_iter().map(move |l| (idx, l)))
        .filter(|(_, locality)| !GENERIC_LOCALITIES.contains(&locality.as_str()))
        .filter_map(|(idx, locality)| {
            Regex::new(&format!(r"\b{}\b", regex::escape(&locality)))
                .ok()
                .map(|re| (idx, re))
        })
        .collect()
});

/// Descriptive label of a table description: the text before any parenthetical
fn label_of(desc: &str) -> String {
    desc.split('(').next().unwrap_or_default().trim().to_uppercase()
}

fn localities(desc: &str) -> Vec<String> {
    let Some((_, rest)) = desc.split_once('(') else {
        return Vec::new();
    };
    rest.trim_end_matches(')')
        .split(',')
        .map(|l| l.trim().to_uppercase())
        .filter(|l| !l.is_empty())
        .collect()
}

fn format_entry(code: &str, desc: &str) -> String {
    format!("{} | {}", code, desc)
}

pub fn lookup_code(code: &str) -> Option<&'static str> {
    ZONE_TABLE
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, desc)| *desc)
}

/// True when `value` is a table entry or generic label produced by `resolve_zone`
fn is_resolved_label(value: &str) -> bool {
    value == SOUTH_FALLBACK
        || value == NORTH_FALLBACK
        || ZONE_TABLE
            .iter()
            .any(|(code, desc)| format_entry(code, desc) == value)
}

/// First `1[0-4]x` token of `text` that has a table entry
fn find_code(text: &str) -> Option<String> {
    ZONE_CODE.captures_iter(text).find_map(|caps| {
        let code = caps.get(1)?.as_str();
        lookup_code(code).map(|desc| format_entry(code, desc))
    })
}

/// Resolve a zone label from a row/group blob and a raw zone hint
pub fn resolve_zone(row_text: &str, raw_zone: &str) -> String {
    let hint = raw_zone.trim();

    // Codes in the row text come first in the combined text
    if let Some(zone) = find_code(&row_text.to_uppercase()) {
        return zone;
    }
    // A hint that is already a label keeps its own code; generic labels stay generic
    if is_resolved_label(hint) {
        return hint.to_string();
    }

    let text = format!("{} | {}", row_text, hint).to_uppercase();

    if let Some(zone) = find_code(&text) {
        return zone;
    }

    for (code, desc) in ZONE_TABLE {
        let label = label_of(desc);
        if !GENERIC_LABELS.contains(&label.as_str()) && text.contains(&label) {
            return format_entry(code, desc);
        }
    }

    if let Some((idx, _)) = LOCALITIES.iter().find(|(_, re)| re.is_match(&text)) {
        let (code, desc) = ZONE_TABLE[*idx];
        return format_entry(code, desc);
    }

    if text.contains("ZONA SUR") {
        return SOUTH_FALLBACK.to_string();
    }
    if text.contains("ZONA NORTE") {
        return NORTH_FALLBACK.to_string();
    }

    if !is_null_like(hint) {
        return hint.to_string();
    }

    UNKNOWN_ZONE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_in_text_wins() {
        assert_eq!(
            resolve_zone("Acme | Ruta 9 km 142 | Rosario?", ""),
            "142 | ROSARIO (Santa Fe, San Nicolas, Ramallo)"
        );
        assert!(resolve_zone("...142...", "").starts_with("142 | "));
    }

    #[test]
    fn test_code_not_in_table_is_skipped() {
        // 105 has no entry, 110 does
        assert!(resolve_zone("zona 105 | reparto 110", "").starts_with("110 | "));
    }

    #[test]
    fn test_code_must_be_a_whole_token() {
        assert_eq!(resolve_zone("1144455566", ""), UNKNOWN_ZONE);
    }

    #[test]
    fn test_label_match() {
        assert_eq!(
            resolve_zone("", "La Plata"),
            "103 | LA PLATA (Tolosa, Villa Elisa, City Bell, Centro)"
        );
        assert!(resolve_zone("cliente de zona oeste", "").starts_with("107 | "));
    }

    #[test]
    fn test_locality_match() {
        assert_eq!(
            resolve_zone("", "Merlo"),
            "107 | ZONA OESTE (Merlo, Moron, San Justo, Caseros, Ramos Mejia)"
        );
        assert!(resolve_zone("Pergamino centro", "").starts_with("140 | "));
    }

    #[test]
    fn test_generic_fallbacks() {
        assert_eq!(resolve_zone("reparto zona sur", ""), SOUTH_FALLBACK);
        assert_eq!(resolve_zone("", "Zona Norte"), NORTH_FALLBACK);
    }

    #[test]
    fn test_raw_hint_kept_verbatim() {
        assert_eq!(resolve_zone("Acme", " Villa Desconocida "), "Villa Desconocida");
    }

    #[test]
    fn test_unknown_when_nothing_matches() {
        assert_eq!(resolve_zone("", ""), UNKNOWN_ZONE);
        assert_eq!(resolve_zone("Acme", "nan"), UNKNOWN_ZONE);
    }

    #[test]
    fn test_resolved_labels_are_stable() {
        for input in [SOUTH_FALLBACK, NORTH_FALLBACK, UNKNOWN_ZONE] {
            assert_eq!(resolve_zone("", input), input);
        }
        let merlo = resolve_zone("", "Merlo");
        assert_eq!(resolve_zone("1144455566", &merlo), merlo);
    }

    #[test]
    fn test_code_in_row_text_beats_labelled_hint() {
        assert!(resolve_zone("Acme | Ruta 142", UNKNOWN_ZONE).starts_with("142 | "));
        assert!(resolve_zone("Acme | Ruta 142", NORTH_FALLBACK).starts_with("142 | "));
        let merlo = resolve_zone("", "Merlo");
        assert!(resolve_zone("Acme | Ruta 142", &merlo).starts_with("142 | "));
    }

    #[test]
    fn test_table_label_hint_keeps_its_code() {
        let north = format_entry("101", lookup_code("101").unwrap());
        // the hint's own code is found before the Merlo locality
        assert_eq!(resolve_zone("Merlo", &north), north);
    }
}
