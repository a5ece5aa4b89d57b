// ABOUTME: Command implementations for the tsvio CLI
// ABOUTME: Runs export, import and table listing over one or many tables

pub mod export;
pub mod import;
pub mod tables;

pub use export::export;
pub use import::{import, ImportTarget};
pub use tables::tables;

use crate::error::{TransferError, TransferResult};
use crate::utils::{underscore, validate_identifier};

/// Per-table outcome of a multi-table run
///
/// A failing table never stops the run; each failure is kept so it can be
/// reported on its own.
#[derive(Debug, Default)]
pub struct TransferReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<TransferError>,
}

impl TransferReport {
    pub fn record<T>(&mut self, table: &str, result: TransferResult<T>) -> Option<T> {
        match result {
            Ok(value) => {
                self.succeeded.push(table.to_string());
                Some(value)
            }
            Err(e) => {
                tracing::error!("{}", e);
                self.failed.push(e);
                None
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Log the closing summary of the run
    pub fn log_summary(&self, action: &str) {
        if self.is_success() {
            tracing::info!("✓ {} {} table(s)", action, self.succeeded.len());
            return;
        }

        tracing::warn!(
            "{} {} table(s), {} failed:",
            action,
            self.succeeded.len(),
            self.failed.len()
        );
        for error in &self.failed {
            tracing::warn!("  ✗ {} ({})", error.table(), error.kind());
        }
    }
}

/// Turn a command-line table argument into a table name
///
/// `table_override` replaces the derived name; otherwise the argument is
/// underscored (`BlogPosts` -> `blog_posts`).
///
/// # Examples
///
/// ```
/// # use tsvio::commands::resolve_table_name;
/// assert_eq!(resolve_table_name("BlogPosts", None).unwrap(), "blog_posts");
/// assert_eq!(resolve_table_name("Users", Some("members")).unwrap(), "members");
/// assert!(resolve_table_name("bad;name", None).is_err());
/// ```
pub fn resolve_table_name(argument: &str, table_override: Option<&str>) -> TransferResult<String> {
    let table = match table_override {
        Some(name) => name.to_string(),
        None => underscore(argument),
    };
    validate_identifier(&table).map_err(|e| TransferError::schema(&table, e))?;
    Ok(table)
}
