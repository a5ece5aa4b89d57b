// ABOUTME: Export command implementation
// ABOUTME: Writes one transfer file per requested table into the fixtures directory

use super::{resolve_table_name, TransferReport};
use crate::backend::TransferBackend;
use crate::transfer::discovery::{ensure_fixtures_dir, transfer_file_path};
use crate::transfer::{export_table, SelectionOptions};
use anyhow::{bail, Result};
use std::path::Path;

/// Export each table in `tables` to `<fixtures_dir>/<table>.txt`
///
/// Tables run one after another. A failing table is logged and recorded in
/// the report, and the next table still runs.
///
/// # Errors
///
/// Only setup problems are returned as errors: an empty table list, an
/// uncreatable fixtures directory, or `--table` combined with several tables.
pub async fn export<B: TransferBackend>(
    db: &mut B,
    tables: &[String],
    fixtures_dir: &Path,
    options: &SelectionOptions,
    table_override: Option<&str>,
) -> Result<TransferReport> {
    if tables.is_empty() {
        bail!("No tables to export");
    }
    if table_override.is_some() && tables.len() > 1 {
        bail!("--table can only be used when exporting a single table");
    }
    ensure_fixtures_dir(fixtures_dir)?;

    let mut report = TransferReport::default();
    for argument in tables {
        let table = match resolve_table_name(argument, table_override) {
            Ok(table) => table,
            Err(e) => {
                report.record::<()>(argument, Err(e));
                continue;
            }
        };

        let path = transfer_file_path(fixtures_dir, &table);
        let result = export_table(db, &table, &path, options).await;
        if let Some(summary) = report.record(&table, result) {
            tracing::info!(
                "✓ {}: {} rows, {} fields -> {}",
                summary.table,
                summary.rows,
                summary.fields,
                summary.path.display()
            );
        }
    }

    report.log_summary("Exported");
    Ok(report)
}
