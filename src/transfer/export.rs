// ABOUTME: Table exporter writing a header line and one tab-delimited line per row
// ABOUTME: Rows are streamed in primary-key order; the table is never modified

use super::columns::{self, SelectionOptions};
use super::format::TransferWriter;
use crate::backend::TransferBackend;
use crate::error::{TransferError, TransferResult};
use crate::schema;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Outcome of a successful export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub table: String,
    pub path: PathBuf,
    pub rows: u64,
    /// Non-key fields written after the key column(s)
    pub fields: usize,
}

/// Export every row of `table` to `destination`
///
/// The column set is resolved and validated against the live schema before
/// the file is created, so a schema problem leaves any existing file intact.
/// The scan runs outside of any transaction.
///
/// # Errors
///
/// - `Schema`: table missing, no primary key, or an unknown field name
/// - `Io`: destination cannot be created or written
/// - `Persistence`: the ordered scan failed
pub async fn export_table<B: TransferBackend>(
    db: &mut B,
    table: &str,
    destination: &Path,
    options: &SelectionOptions,
) -> TransferResult<ExportSummary> {
    let schema = schema::describe(db, table).await?;
    let set = columns::select(&schema, options)?;
    let projection = set.projection(&schema)?;

    tracing::info!(
        "Exporting '{}' to {} (sorted by {})",
        table,
        destination.display(),
        set.primary_key().join(", ")
    );

    let file = File::create(destination).map_err(|e| TransferError::io(table, destination, e))?;
    let mut writer = TransferWriter::new(BufWriter::new(file), &set.header())
        .map_err(|e| TransferError::io(table, destination, e))?;

    let mut write_error: Option<std::io::Error> = None;
    let scanned = db
        .scan_ordered(
            table,
            &projection,
            set.primary_key(),
            &mut |row: Vec<Option<String>>| -> anyhow::Result<()> {
                if let Err(e) = writer.write_row(&row) {
                    let message = e.to_string();
                    write_error = Some(e);
                    anyhow::bail!("write failed: {}", message);
                }
                Ok(())
            },
        )
        .await;

    if let Some(e) = write_error {
        return Err(TransferError::io(table, destination, e));
    }
    let rows = scanned.map_err(|e| TransferError::persistence(table, e))?;

    writer
        .finish()
        .map_err(|e| TransferError::io(table, destination, e))?;

    tracing::info!("Exported {} rows from '{}'", rows, table);

    Ok(ExportSummary {
        table: table.to_string(),
        path: destination.to_path_buf(),
        rows,
        fields: set.fields().len(),
    })
}
