//! CSV export of the unified customer table

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::types::{UnifiedCustomer, OUTPUT_COLUMNS};

/// Write `customers` to `path` with the fixed output header
pub fn write_csv(path: &Path, customers: &[UnifiedCustomer]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    writer.write_record(OUTPUT_COLUMNS)?;
    for customer in customers {
        writer.write_record(customer.to_row())?;
    }
    writer.flush()?;

    info!("Exported {} customers to {}", customers.len(), path.display());
    Ok(())
}
