//! Tabular output
//!
//! Writes the scraped grid rows and the merged extraction records as CSV
//! files next to the store.

use crate::error::Result;
use crate::extract::ExtractionRecord;
use crate::scrape::RowTable;
use std::path::Path;
use tracing::info;

/// Write the scraped grid to CSV: the portal's header row first, then every
/// newly saved data row. Short rows are padded so every record has the same
/// width.
pub fn write_rows_csv(path: &Path, table: &RowTable) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        let mut record = row.clone();
        record.resize(table.headers.len().max(row.len()), String::new());
        writer.write_record(&record)?;
    }
    writer.flush()?;

    info!("Wrote {} rows to {}", table.rows.len(), path.display());
    Ok(())
}

/// Write merged extraction records to CSV, one row per document.
pub fn write_extractions_csv(path: &Path, records: &[ExtractionRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["pdf_name", "date", "owner_name", "address", "apn_taxid"])?;
    for record in records {
        writer.write_record([
            record.pdf_name.as_str(),
            record.fields.date.as_str(),
            record.fields.owner_name.as_str(),
            record.fields.address.as_str(),
            record.fields.apn_taxid.as_str(),
        ])?;
    }
    writer.flush()?;

    info!("Wrote {} extraction records to {}", records.len(), path.display());
    Ok(())
}
