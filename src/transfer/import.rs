// ABOUTME: Table importer replacing a table's rows with the contents of a transfer file
// ABOUTME: Runs truncate and inserts in one transaction with foreign-key checks suspended

use super::format::{FileError, TransferReader};
use super::record::RecordLayout;
use crate::backend::TransferBackend;
use crate::error::{TransferError, TransferResult};
use crate::schema;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Records between two progress notifications
pub const PROGRESS_INTERVAL: u64 = 10;

/// Receives progress notifications while rows are inserted
pub trait ImportProgress {
    /// Called after every [`PROGRESS_INTERVAL`]th record with the total so far
    fn records_saved(&mut self, count: u64);

    /// Called once the transaction has committed
    fn finished(&mut self, _count: u64) {}
}

/// Progress sink that ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ImportProgress for NoProgress {
    fn records_saved(&mut self, _count: u64) {}
}

/// Outcome of a successful import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub table: String,
    pub path: PathBuf,
    /// Rows removed by the truncate step
    pub deleted: u64,
    /// Rows inserted from the file
    pub rows: u64,
}

fn file_error(table: &str, path: &Path, line: usize, error: FileError) -> TransferError {
    match error {
        FileError::Io(e) => TransferError::io(table, path, e),
        other => TransferError::format(table, line, other.to_string()),
    }
}

/// Replace every row of `table` with the rows in `source`
///
/// The header is read and resolved against the live schema before anything
/// in the database changes. Foreign-key checks are then suspended, the table
/// is emptied and refilled inside one transaction, and checks are restored
/// before commit. Any failure rolls the transaction back and restores checks
/// before the error is returned, leaving the table as it was.
///
/// # Errors
///
/// - `Io`: source cannot be opened or read
/// - `Format`: missing header, or a body line whose field count differs
///   from the header (reported with its line number)
/// - `Schema`: table missing or a header name it does not know
/// - `Persistence`: suspend, delete, insert, restore or commit failed
pub async fn import_table<B: TransferBackend>(
    db: &mut B,
    table: &str,
    source: &Path,
    progress: &mut dyn ImportProgress,
) -> TransferResult<ImportSummary> {
    let file = File::open(source).map_err(|e| TransferError::io(table, source, e))?;
    let mut reader =
        TransferReader::new(BufReader::new(file)).map_err(|e| file_error(table, source, 1, e))?;

    let schema = schema::describe(db, table).await?;
    let layout = RecordLayout::resolve(&schema, reader.header())?;

    tracing::info!("Importing '{}' from {}", table, source.display());

    db.set_referential_integrity(false)
        .await
        .map_err(|e| TransferError::persistence(table, e))?;

    let loaded = load_rows(db, table, source, &mut reader, &layout, progress).await;

    let (deleted, rows) = match loaded {
        Ok(counts) => counts,
        Err(e) => {
            tracing::warn!("Import of '{}' failed, rolling back", table);
            abandon(db, table).await;
            return Err(e);
        }
    };

    if let Err(e) = db.set_referential_integrity(true).await {
        abandon(db, table).await;
        return Err(TransferError::persistence(table, e));
    }

    if let Err(e) = db.commit().await {
        tracing::error!("Commit of '{}' failed, rolling back", table);
        abandon(db, table).await;
        return Err(TransferError::persistence(table, e));
    }

    progress.finished(rows);
    tracing::info!(
        "Imported {} rows into '{}' ({} replaced)",
        rows,
        table,
        deleted
    );

    Ok(ImportSummary {
        table: table.to_string(),
        path: source.to_path_buf(),
        deleted,
        rows,
    })
}

/// Begin, empty the table and insert every body line; returns (deleted, inserted)
async fn load_rows<B: TransferBackend, R: BufRead>(
    db: &mut B,
    table: &str,
    source: &Path,
    reader: &mut TransferReader<R>,
    layout: &RecordLayout,
    progress: &mut dyn ImportProgress,
) -> TransferResult<(u64, u64)> {
    db.begin()
        .await
        .map_err(|e| TransferError::persistence(table, e))?;

    let deleted = db
        .delete_all(table)
        .await
        .map_err(|e| TransferError::persistence(table, e))?;
    tracing::debug!("Deleted {} existing rows from '{}'", deleted, table);

    let mut count = 0u64;
    while let Some(line) = reader.next_line() {
        let line = line.map_err(|e| file_error(table, source, reader.line(), e))?;
        let record = layout.build(line.values);

        db.insert_row(table, &record.columns, &record.values)
            .await
            .map_err(|e| {
                TransferError::persistence(
                    table,
                    e.context(format!("record at line {} was not saved", line.line)),
                )
            })?;

        count += 1;
        if count % PROGRESS_INTERVAL == 0 {
            progress.records_saved(count);
        }
    }

    Ok((deleted, count))
}

/// Roll back and restore foreign-key checks after a failure
///
/// Errors here are logged rather than returned so the first failure is
/// the one reported.
async fn abandon<B: TransferBackend>(db: &mut B, table: &str) {
    if let Err(e) = db.rollback().await {
        tracing::error!("Rollback of '{}' failed: {:#}", table, e);
    }
    if let Err(e) = db.set_referential_integrity(true).await {
        tracing::error!(
            "Could not re-enable foreign-key checks after '{}': {:#}",
            table,
            e
        );
    }
}
