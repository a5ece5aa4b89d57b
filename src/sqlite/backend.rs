// ABOUTME: SQLite implementation of the transfer backend
// ABOUTME: Reads metadata through pragma functions and writes rows with bound parameters

use crate::backend::{RowVisitor, TransferBackend};
use crate::schema::{Relation, TableSchema};
use crate::utils::{order_by_list, quote_identifier};
use anyhow::{Context, Result};
use rusqlite::types::ValueRef;
use rusqlite::Connection;

/// Transfer backend over a single rusqlite connection
///
/// SQLite ignores `PRAGMA foreign_keys` inside an open transaction, so a
/// change requested while a transaction is open is remembered and applied as
/// soon as the transaction ends (commit or rollback).
pub struct SqliteBackend {
    conn: Connection,
    pending_integrity: Option<bool>,
}

impl SqliteBackend {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            pending_integrity: None,
        }
    }

    /// Open a database file (or `:memory:`) named by a connection string
    pub fn open(url: &str) -> Result<Self> {
        Ok(Self::new(super::open_sqlite(url)?))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Whether foreign-key enforcement is currently on for this connection
    pub fn foreign_keys_enabled(&self) -> Result<bool> {
        let enabled: i64 = self
            .conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .context("Failed to read foreign_keys pragma")?;
        Ok(enabled == 1)
    }

    fn apply_integrity(&self, enabled: bool) -> Result<()> {
        let sql = if enabled {
            "PRAGMA foreign_keys = ON"
        } else {
            "PRAGMA foreign_keys = OFF"
        };
        self.conn
            .execute_batch(sql)
            .with_context(|| format!("Failed to run '{}'", sql))
    }

    fn apply_pending_integrity(&mut self) -> Result<()> {
        if let Some(enabled) = self.pending_integrity.take() {
            self.apply_integrity(enabled)?;
        }
        Ok(())
    }

    fn referenced_primary_key(&self, table: &str) -> String {
        self.conn
            .query_row(
                "SELECT name FROM pragma_table_info(?1) WHERE pk = 1",
                [table],
                |row| row.get(0),
            )
            .unwrap_or_else(|_| "rowid".to_string())
    }
}

fn quote(name: &str) -> Result<String> {
    quote_identifier(name, '"')
}

fn order_clause(columns: &[String]) -> Result<String> {
    order_by_list(columns, '"')
}

fn value_to_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
    }
}

impl TransferBackend for SqliteBackend {
    fn engine(&self) -> &'static str {
        "sqlite"
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        tracing::debug!("Listing tables from SQLite database");

        let mut stmt = self
            .conn
            .prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type='table' \
                 AND name NOT LIKE 'sqlite_%' \
                 ORDER BY name",
            )
            .context("Failed to prepare statement to list tables")?;

        let tables = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("Failed to query table list")?
            .collect::<Result<Vec<String>, _>>()
            .context("Failed to collect table names")?;

        Ok(tables)
    }

    async fn describe_table(&mut self, table: &str) -> Result<TableSchema> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, pk FROM pragma_table_info(?1) ORDER BY cid")
            .context("Failed to prepare table_info query")?;
        let rows = stmt
            .query_map([table], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .with_context(|| format!("Failed to read columns of '{}'", table))?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to collect columns of '{}'", table))?;

        let columns: Vec<String> = rows.iter().map(|(name, _)| name.clone()).collect();
        let mut keyed: Vec<(i64, String)> = rows
            .into_iter()
            .filter(|(_, pk)| *pk > 0)
            .map(|(name, pk)| (pk, name))
            .collect();
        keyed.sort();
        let primary_key = keyed.into_iter().map(|(_, name)| name).collect();

        let mut stmt = self
            .conn
            .prepare(
                "SELECT \"from\", \"table\", \"to\" FROM pragma_foreign_key_list(?1) \
                 ORDER BY id, seq",
            )
            .context("Failed to prepare foreign_key_list query")?;
        let foreign_keys = stmt
            .query_map([table], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })
            .with_context(|| format!("Failed to read foreign keys of '{}'", table))?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to collect foreign keys of '{}'", table))?;
        drop(stmt);

        let mut relations = Vec::with_capacity(foreign_keys.len());
        for (column, referenced_table, referenced_column) in foreign_keys {
            // A bare REFERENCES clause points at the parent's primary key
            let referenced_column = match referenced_column {
                Some(col) => col,
                None => self.referenced_primary_key(&referenced_table),
            };
            relations.push(Relation::new(&column, &referenced_table, &referenced_column));
        }

        Ok(TableSchema {
            name: table.to_string(),
            columns,
            primary_key,
            relations,
        })
    }

    async fn scan_ordered(
        &mut self,
        table: &str,
        columns: &[String],
        order_by: &[String],
        visit: &mut RowVisitor<'_>,
    ) -> Result<u64> {
        let select_list = columns
            .iter()
            .map(|c| quote(c))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let query = format!(
            "SELECT {} FROM {} ORDER BY {}",
            select_list,
            quote(table)?,
            order_clause(order_by)?
        );
        tracing::debug!("SQLite scan: {}", query);

        let mut stmt = self
            .conn
            .prepare(&query)
            .with_context(|| format!("Failed to prepare scan of table '{}'", table))?;
        let mut rows = stmt
            .query([])
            .with_context(|| format!("Failed to query rows from table '{}'", table))?;

        let mut count = 0u64;
        while let Some(row) = rows
            .next()
            .with_context(|| format!("Failed to read row from table '{}'", table))?
        {
            let mut values = Vec::with_capacity(columns.len());
            for idx in 0..columns.len() {
                values.push(value_to_text(row.get_ref(idx)?));
            }
            visit(values)?;
            count += 1;
        }

        Ok(count)
    }

    async fn set_referential_integrity(&mut self, enabled: bool) -> Result<()> {
        if self.conn.is_autocommit() {
            self.pending_integrity = None;
            self.apply_integrity(enabled)
        } else {
            tracing::debug!(
                "Deferring foreign_keys = {} until the open transaction ends",
                enabled
            );
            self.pending_integrity = Some(enabled);
            Ok(())
        }
    }

    async fn begin(&mut self) -> Result<()> {
        self.conn
            .execute_batch("BEGIN")
            .context("Failed to begin transaction")
    }

    async fn commit(&mut self) -> Result<()> {
        self.conn
            .execute_batch("COMMIT")
            .context("Failed to commit transaction")?;
        self.apply_pending_integrity()
    }

    async fn rollback(&mut self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn
                .execute_batch("ROLLBACK")
                .context("Failed to roll back transaction")?;
        }
        self.apply_pending_integrity()
    }

    async fn delete_all(&mut self, table: &str) -> Result<u64> {
        let sql = format!("DELETE FROM {}", quote(table)?);
        let deleted = self
            .conn
            .execute(&sql, [])
            .with_context(|| format!("Failed to delete rows from '{}'", table))?;
        Ok(deleted as u64)
    }

    async fn insert_row(
        &mut self,
        table: &str,
        columns: &[String],
        values: &[Option<String>],
    ) -> Result<()> {
        let column_list = columns
            .iter()
            .map(|c| quote(c))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(table)?,
            column_list,
            placeholders
        );

        let mut stmt = self
            .conn
            .prepare_cached(&sql)
            .with_context(|| format!("Failed to prepare insert into '{}'", table))?;
        stmt.execute(rusqlite::params_from_iter(values.iter()))
            .with_context(|| format!("Failed to insert row into '{}'", table))?;

        Ok(())
    }
}
