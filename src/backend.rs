// ABOUTME: Database collaborator contract used by the export and import engines
// ABOUTME: Dispatches a connection URL to the SQLite, MySQL or PostgreSQL backend

use crate::mysql::backend::MySqlBackend;
use crate::postgres::backend::PostgresBackend;
use crate::schema::TableSchema;
use crate::sqlite::backend::SqliteBackend;
use anyhow::{bail, Result};

/// Visitor receiving one row of text values per call, in select order
pub type RowVisitor<'a> = dyn FnMut(Vec<Option<String>>) -> Result<()> + 'a;

/// Everything the transfer engine needs from a live database session
///
/// All values cross this boundary as text (`None` is SQL `NULL`); the backend
/// is responsible for rendering stored values as text and for letting the
/// database coerce text back into column types on insert.
///
/// Implementations must not cache metadata: `describe_table` is called at the
/// start of every transfer and has to reflect the schema at that moment.
#[allow(async_fn_in_trait)]
pub trait TransferBackend {
    /// Engine name for log lines ("sqlite", "mysql", "postgres")
    fn engine(&self) -> &'static str;

    /// Names of all user tables, sorted
    async fn list_tables(&mut self) -> Result<Vec<String>>;

    /// Columns (ordinal order), primary key (key order) and foreign keys.
    /// A table that does not exist yields a schema with no columns.
    async fn describe_table(&mut self, table: &str) -> Result<TableSchema>;

    /// Stream `columns` of every row ordered ascending by each `order_by`
    /// column in turn,
    /// returning the number of rows visited. An error from `visit` stops the
    /// scan and is returned unchanged.
    async fn scan_ordered(
        &mut self,
        table: &str,
        columns: &[String],
        order_by: &[String],
        visit: &mut RowVisitor<'_>,
    ) -> Result<u64>;

    /// Enable or disable foreign-key enforcement for this session
    async fn set_referential_integrity(&mut self, enabled: bool) -> Result<()>;

    async fn begin(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    /// Roll back the open transaction; a no-op when none is open
    async fn rollback(&mut self) -> Result<()>;

    /// Remove every row of the table, returning the number removed
    async fn delete_all(&mut self, table: &str) -> Result<u64>;

    /// Insert a single row using bound parameters
    async fn insert_row(
        &mut self,
        table: &str,
        columns: &[String],
        values: &[Option<String>],
    ) -> Result<()>;
}

/// Storage engine selected by a connection URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    Sqlite,
    MySql,
    Postgres,
}

impl DatabaseKind {
    /// Detect the engine from a connection URL
    ///
    /// # Examples
    ///
    /// ```
    /// # use tsvio::backend::DatabaseKind;
    /// assert_eq!(DatabaseKind::detect("mysql://localhost/app").unwrap(), DatabaseKind::MySql);
    /// assert_eq!(DatabaseKind::detect("app.sqlite3").unwrap(), DatabaseKind::Sqlite);
    /// assert!(DatabaseKind::detect("mongodb://localhost").is_err());
    /// ```
    pub fn detect(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            bail!("Connection string cannot be empty");
        }

        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            return Ok(Self::Postgres);
        }
        if url.starts_with("mysql://") {
            return Ok(Self::MySql);
        }
        if url.starts_with("sqlite://") || url == ":memory:" {
            return Ok(Self::Sqlite);
        }
        let lower = url.to_lowercase();
        if [".db", ".sqlite", ".sqlite3"]
            .iter()
            .any(|ext| lower.ends_with(ext))
        {
            return Ok(Self::Sqlite);
        }

        bail!(
            "Unsupported connection string '{}'. \
             Expected sqlite://, mysql://, postgres:// or a .db/.sqlite/.sqlite3 file path",
            url
        )
    }
}

/// A connected backend of any supported engine
pub enum Database {
    Sqlite(SqliteBackend),
    MySql(MySqlBackend),
    Postgres(PostgresBackend),
}

/// Connect to the database named by `url`
pub async fn open_database(url: &str) -> Result<Database> {
    match DatabaseKind::detect(url)? {
        DatabaseKind::Sqlite => Ok(Database::Sqlite(SqliteBackend::open(url)?)),
        DatabaseKind::MySql => Ok(Database::MySql(MySqlBackend::connect(url).await?)),
        DatabaseKind::Postgres => Ok(Database::Postgres(PostgresBackend::connect(url).await?)),
    }
}

macro_rules! dispatch {
    ($self:ident, $db:ident => $call:expr) => {
        match $self {
            Database::Sqlite($db) => $call,
            Database::MySql($db) => $call,
            Database::Postgres($db) => $call,
        }
    };
}

impl TransferBackend for Database {
    fn engine(&self) -> &'static str {
        dispatch!(self, db => db.engine())
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        dispatch!(self, db => db.list_tables().await)
    }

    async fn describe_table(&mut self, table: &str) -> Result<TableSchema> {
        dispatch!(self, db => db.describe_table(table).await)
    }

    async fn scan_ordered(
        &mut self,
        table: &str,
        columns: &[String],
        order_by: &[String],
        visit: &mut RowVisitor<'_>,
    ) -> Result<u64> {
        dispatch!(self, db => db.scan_ordered(table, columns, order_by, visit).await)
    }

    async fn set_referential_integrity(&mut self, enabled: bool) -> Result<()> {
        dispatch!(self, db => db.set_referential_integrity(enabled).await)
    }

    async fn begin(&mut self) -> Result<()> {
        dispatch!(self, db => db.begin().await)
    }

    async fn commit(&mut self) -> Result<()> {
        dispatch!(self, db => db.commit().await)
    }

    async fn rollback(&mut self) -> Result<()> {
        dispatch!(self, db => db.rollback().await)
    }

    async fn delete_all(&mut self, table: &str) -> Result<u64> {
        dispatch!(self, db => db.delete_all(table).await)
    }

    async fn insert_row(
        &mut self,
        table: &str,
        columns: &[String],
        values: &[Option<String>],
    ) -> Result<()> {
        dispatch!(self, db => db.insert_row(table, columns, values).await)
    }
}
