// ABOUTME: Table and transfer file discovery for multi-table runs
// ABOUTME: Maps table names to <fixtures>/<table>.txt and skips migration bookkeeping tables

use crate::backend::TransferBackend;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Default directory holding one transfer file per table
pub const DEFAULT_FIXTURES_DIR: &str = "config/Fixtures";

pub const FILE_EXTENSION: &str = "txt";

/// Tables that belong to schema migration tooling, never transferred
pub const MIGRATION_TABLES: [&str; 1] = ["phinxlog"];

/// Sorted names of the tables eligible for transfer
pub async fn list_tables<B: TransferBackend>(db: &mut B) -> Result<Vec<String>> {
    let mut tables: Vec<String> = db
        .list_tables()
        .await
        .context("Failed to list tables")?
        .into_iter()
        .filter(|t| !MIGRATION_TABLES.contains(&t.as_str()))
        .collect();
    tables.sort();

    if tables.is_empty() {
        tracing::warn!("The {} database does not have any tables", db.engine());
    }
    Ok(tables)
}

/// Path of a table's transfer file under `root`
///
/// # Examples
///
/// ```
/// # use std::path::Path;
/// # use tsvio::transfer::discovery::transfer_file_path;
/// assert_eq!(
///     transfer_file_path(Path::new("config/Fixtures"), "users"),
///     Path::new("config/Fixtures/users.txt")
/// );
/// ```
pub fn transfer_file_path(root: &Path, table: &str) -> PathBuf {
    root.join(format!("{}.{}", table, FILE_EXTENSION))
}

pub fn transfer_file_exists(root: &Path, table: &str) -> bool {
    transfer_file_path(root, table).is_file()
}

/// Tables that have a transfer file under `root`, in the given order
pub fn select_import_all(tables: &[String], root: &Path) -> Vec<String> {
    tables
        .iter()
        .filter(|t| {
            let found = transfer_file_exists(root, t);
            if !found {
                tracing::debug!("No transfer file for '{}', skipping", t);
            }
            found
        })
        .cloned()
        .collect()
}

/// Create the fixtures directory (and parents) if it does not exist
pub fn ensure_fixtures_dir(root: &Path) -> Result<()> {
    if !root.is_dir() {
        tracing::info!("Creating fixtures directory {}", root.display());
        std::fs::create_dir_all(root)
            .with_context(|| format!("Failed to create directory {}", root.display()))?;
    }
    Ok(())
}
