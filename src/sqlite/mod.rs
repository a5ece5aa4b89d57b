// ABOUTME: SQLite connection utilities for fixture export and import
// ABOUTME: Provides file path validation and read-write database connections

pub mod backend;

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

/// Strip an optional `sqlite://` scheme from a connection string
///
/// # Examples
///
/// ```
/// # use tsvio::sqlite::strip_scheme;
/// assert_eq!(strip_scheme("sqlite://app.db"), "app.db");
/// assert_eq!(strip_scheme("app.db"), "app.db");
/// ```
pub fn strip_scheme(url: &str) -> &str {
    url.strip_prefix("sqlite://").unwrap_or(url)
}

/// Validate a SQLite file path
///
/// Checks:
/// - Canonicalizes path to resolve symlinks and relative paths
/// - Verifies file exists and is a regular file (not directory)
/// - Checks file extension is .db, .sqlite, or .sqlite3
///
/// # Arguments
///
/// * `path` - Path to SQLite file (can be relative or absolute)
///
/// # Returns
///
/// Canonicalized absolute path if valid, error otherwise
pub fn validate_sqlite_path(path: &str) -> Result<PathBuf> {
    if path.is_empty() {
        bail!("SQLite file path cannot be empty");
    }

    let path_buf = PathBuf::from(path);

    let canonical = path_buf.canonicalize().with_context(|| {
        format!(
            "Failed to resolve SQLite file path '{}'. \
             File may not exist or may not be readable.",
            path
        )
    })?;

    if !canonical.is_file() {
        bail!("Path '{}' is not a regular file (may be a directory)", path);
    }

    match canonical.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ["db", "sqlite", "sqlite3"].contains(&ext.to_lowercase().as_str()) => {}
        Some(ext) => bail!(
            "Invalid SQLite file extension '{}'. \
             Must be .db, .sqlite, or .sqlite3",
            ext
        ),
        None => bail!(
            "SQLite file '{}' has no extension. \
             Must be .db, .sqlite, or .sqlite3",
            path
        ),
    }

    tracing::debug!("Validated SQLite path: {}", canonical.display());

    Ok(canonical)
}

/// Open a SQLite database for reading and writing
///
/// The database file must already exist: a transfer works against an existing
/// schema and never creates tables. `:memory:` opens a private in-memory
/// database.
///
/// # Examples
///
/// ```no_run
/// # use tsvio::sqlite::open_sqlite;
/// # fn example() -> anyhow::Result<()> {
/// let conn = open_sqlite("sqlite://app.db")?;
/// # Ok(())
/// # }
/// ```
pub fn open_sqlite(url: &str) -> Result<rusqlite::Connection> {
    let path = strip_scheme(url);

    if path == ":memory:" {
        return rusqlite::Connection::open_in_memory()
            .context("Failed to open in-memory SQLite database");
    }

    let canonical = validate_sqlite_path(path)?;

    tracing::info!("Opening SQLite database: {}", canonical.display());

    let conn = rusqlite::Connection::open_with_flags(
        &canonical,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("Failed to open SQLite database: {}", canonical.display()))?;

    // Verify we can query the database
    let _version: String = conn
        .query_row("SELECT sqlite_version()", [], |row| row.get(0))
        .context("Failed to query SQLite version (database may be corrupted)")?;

    tracing::debug!("Successfully opened SQLite database");

    Ok(conn)
}
