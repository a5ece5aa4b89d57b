// ABOUTME: Tables command implementation
// ABOUTME: Lists transferable tables and whether each has a transfer file

use crate::backend::TransferBackend;
use crate::transfer::discovery::{list_tables, transfer_file_exists};
use anyhow::Result;
use std::path::Path;

/// A table eligible for transfer and the state of its file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub name: String,
    pub has_file: bool,
}

/// List the tables of the database, marking those with a transfer file
pub async fn tables<B: TransferBackend>(db: &mut B, fixtures_dir: &Path) -> Result<Vec<TableEntry>> {
    let entries: Vec<TableEntry> = list_tables(db)
        .await?
        .into_iter()
        .map(|name| {
            let has_file = transfer_file_exists(fixtures_dir, &name);
            TableEntry { name, has_file }
        })
        .collect();

    tracing::info!(
        "{} table(s) in the {} database",
        entries.len(),
        db.engine()
    );
    for entry in &entries {
        let marker = if entry.has_file { "✓" } else { " " };
        tracing::info!("  [{}] {}", marker, entry.name);
    }

    Ok(entries)
}
