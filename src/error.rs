// ABOUTME: Error kinds reported by a single table transfer
// ABOUTME: Classifies failures as schema, format, persistence, or file I/O problems

use std::path::PathBuf;
use thiserror::Error;

/// Failure of one table's export or import
///
/// Every variant names the table so that a multi-table run can report each
/// failure on its own line and carry on with the next table.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Table or column metadata unavailable, or a name that the live schema
    /// does not know. Raised before the file or the transaction is touched.
    #[error("SchemaError on table '{table}': {source:#}")]
    Schema {
        table: String,
        #[source]
        source: anyhow::Error,
    },

    /// Header/body field-count mismatch or an unreadable transfer file
    #[error("FormatError on table '{table}' at line {line}: {message}")]
    Format {
        table: String,
        line: usize,
        message: String,
    },

    /// Delete, insert, scan or transaction failure reported by the database
    #[error("PersistenceError on table '{table}': {source:#}")]
    Persistence {
        table: String,
        #[source]
        source: anyhow::Error,
    },

    /// Transfer file could not be opened, read or written
    #[error("IOError on table '{table}' ({}): {source}", path.display())]
    Io {
        table: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TransferError {
    pub fn schema(table: &str, source: anyhow::Error) -> Self {
        Self::Schema {
            table: table.to_string(),
            source,
        }
    }

    pub fn format(table: &str, line: usize, message: impl Into<String>) -> Self {
        Self::Format {
            table: table.to_string(),
            line,
            message: message.into(),
        }
    }

    pub fn persistence(table: &str, source: anyhow::Error) -> Self {
        Self::Persistence {
            table: table.to_string(),
            source,
        }
    }

    pub fn io(table: &str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            table: table.to_string(),
            path: path.into(),
            source,
        }
    }

    /// Table the failed transfer was working on
    pub fn table(&self) -> &str {
        match self {
            Self::Schema { table, .. }
            | Self::Format { table, .. }
            | Self::Persistence { table, .. }
            | Self::Io { table, .. } => table,
        }
    }

    /// Short name of the error kind, as shown to the user
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Schema { .. } => "SchemaError",
            Self::Format { .. } => "FormatError",
            Self::Persistence { .. } => "PersistenceError",
            Self::Io { .. } => "IOError",
        }
    }
}

pub type TransferResult<T> = std::result::Result<T, TransferError>;
