pub const DEFAULT_HEADER_SCAN_ROWS: usize = 30;

pub const DEFAULT_PAUSE_POLL_MS: u64 = 250;
pub const MAX_PAUSE_POLL_MS: u64 = 500;

pub const DEFAULT_RUN_LOG_PATH: &str = "logs/run-log.json";

pub const SUPPORTED_EXTENSIONS: &[&str] = &["xlsx", "xls", "xlsm", "csv"];

pub const DEFAULT_SCAN_KEYWORDS: &[&str] =
    &["client", "cartera", "base", "padron", "contact", "vendedor"];

pub const PLACEHOLDER_NAME: &str = "Cliente Sin Nombre";
pub const PLACEHOLDER_SALESPERSON: &str = "Desconocido";
pub const UNKNOWN_ZONE: &str = "Unknown";

/// Name fragments left behind by report headers and footers read as data
pub const REPORT_ARTIFACT_PHRASES: &[&str] = &[
    "cód.",
    "fecha:",
    "hoja:",
    "wood tools",
    "clientes habilitados",
    "ordenado por",
];

pub fn default_scan_keywords() -> Vec<String> {
    DEFAULT_SCAN_KEYWORDS.iter().map(|k| k.to_string()).collect()
}
