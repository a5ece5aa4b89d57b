// ABOUTME: Import command implementation
// ABOUTME: Loads transfer files into their tables, one transaction per table

use super::{resolve_table_name, TransferReport};
use crate::backend::TransferBackend;
use crate::transfer::discovery::{
    ensure_fixtures_dir, list_tables, select_import_all, transfer_file_path,
};
use crate::transfer::{import_table, ImportProgress};
use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

/// Which tables an import run covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    /// Every table that has a transfer file in the fixtures directory
    All,
    /// Named tables, as given on the command line
    Tables(Vec<String>),
}

/// Spinner that advances as rows are saved
pub struct SpinnerProgress {
    bar: ProgressBar,
}

impl SpinnerProgress {
    pub fn new(table: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} {pos} rows") {
            bar.set_style(style);
        }
        bar.set_message(table.to_string());
        Self { bar }
    }
}

impl ImportProgress for SpinnerProgress {
    fn records_saved(&mut self, count: u64) {
        self.bar.set_position(count);
    }

    fn finished(&mut self, count: u64) {
        self.bar.set_position(count);
        self.bar.finish_and_clear();
    }
}

impl Drop for SpinnerProgress {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.abandon();
        }
    }
}

/// Import each selected table from `<fixtures_dir>/<table>.txt`
///
/// Every table is replaced in its own transaction; a failure rolls back only
/// that table and the run moves on to the next one.
///
/// # Errors
///
/// Only setup problems are returned as errors: the fixtures directory cannot
/// be created, listing tables failed, nothing to import, or `--table`
/// combined with several tables.
pub async fn import<B: TransferBackend>(
    db: &mut B,
    target: ImportTarget,
    fixtures_dir: &Path,
    table_override: Option<&str>,
) -> Result<TransferReport> {
    ensure_fixtures_dir(fixtures_dir)?;

    let mut report = TransferReport::default();

    let tables = match target {
        ImportTarget::All => {
            if table_override.is_some() {
                bail!("--table cannot be combined with 'import all'");
            }
            let tables = select_import_all(&list_tables(db).await?, fixtures_dir);
            if tables.is_empty() {
                bail!(
                    "No transfer files for any table found in {}",
                    fixtures_dir.display()
                );
            }
            tracing::info!("Found transfer files for {} table(s)", tables.len());
            tables
        }
        ImportTarget::Tables(arguments) => {
            if arguments.is_empty() {
                bail!("No tables to import");
            }
            if table_override.is_some() && arguments.len() > 1 {
                bail!("--table can only be used when importing a single table");
            }
            let mut tables = Vec::with_capacity(arguments.len());
            for argument in &arguments {
                match resolve_table_name(argument, table_override) {
                    Ok(table) => tables.push(table),
                    Err(e) => {
                        report.record::<()>(argument, Err(e));
                    }
                }
            }
            tables
        }
    };

    for table in &tables {
        let path = transfer_file_path(fixtures_dir, table);
        let mut progress = SpinnerProgress::new(table);
        let result = import_table(db, table, &path, &mut progress).await;
        if let Some(summary) = report.record(table, result) {
            tracing::info!(
                "✓ {}: {} rows loaded from {}",
                summary.table,
                summary.rows,
                summary.path.display()
            );
        }
    }

    report.log_summary("Imported");
    Ok(report)
}
