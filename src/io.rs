use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use crate::models::Measurement;
use crate::preprocessing::{validate_schema, REQUIRED_COLUMNS};

/// Read a measurement table from CSV. The header is validated against the
/// required columns before any row is deserialized, so a malformed file
/// fails with the complete list of missing columns instead of a row error.
pub fn load_measurements(path: &Path) -> anyhow::Result<Vec<Measurement>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("failed to read header of {}", path.display()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    validate_schema(&headers, &REQUIRED_COLUMNS)?;

    let mut rows = Vec::new();
    for (line, result) in reader.deserialize::<Measurement>().enumerate() {
        let row = result
            .with_context(|| format!("bad measurement row {} in {}", line + 2, path.display()))?;
        rows.push(row);
    }

    Ok(rows)
}

/// Write any row type to CSV, creating parent directories on the way.
pub fn save_table<T: Serialize>(rows: &[T], path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(())
}
