// ABOUTME: PostgreSQL implementation of the transfer backend
// ABOUTME: Streams rows as text and inserts them through json_populate_record

use crate::backend::{RowVisitor, TransferBackend};
use crate::schema::{Relation, TableSchema};
use crate::utils::{order_by_list, quote_identifier};
use anyhow::{Context, Result};
use futures::{pin_mut, TryStreamExt};
use tokio_postgres::Client;

/// Transfer backend over a single PostgreSQL session
///
/// Referential integrity is suspended with `session_replication_role =
/// replica`, which skips foreign-key triggers for the session. Changing it
/// requires superuser (or, on PostgreSQL 15+, an explicit grant).
pub struct PostgresBackend {
    client: Client,
}

impl PostgresBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn connect(url: &str) -> Result<Self> {
        let client = super::connection::connect_with_retry(url).await?;
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

fn quote(name: &str) -> Result<String> {
    quote_identifier(name, '"')
}

fn order_clause(columns: &[String]) -> Result<String> {
    order_by_list(columns, '"')
}

/// Build the insert statement for one row
///
/// Values are shipped as one JSON object of strings and expanded by
/// `json_populate_record`, which lets the server convert each text value to
/// the column's declared type.
pub fn build_insert_sql(table: &str, columns: &[String]) -> Result<String> {
    let table = quote(table)?;
    let column_list = columns
        .iter()
        .map(|c| quote(c))
        .collect::<Result<Vec<_>>>()?
        .join(", ");

    Ok(format!(
        "INSERT INTO {table} ({cols}) SELECT {cols} FROM json_populate_record(NULL::{table}, $1::text::json)",
        table = table,
        cols = column_list
    ))
}

/// Encode a row as the JSON object passed to `json_populate_record`
pub fn row_to_json(columns: &[String], values: &[Option<String>]) -> serde_json::Value {
    let object: serde_json::Map<String, serde_json::Value> = columns
        .iter()
        .zip(values.iter())
        .map(|(column, value)| {
            let value = match value {
                Some(text) => serde_json::Value::String(text.clone()),
                None => serde_json::Value::Null,
            };
            (column.clone(), value)
        })
        .collect();
    serde_json::Value::Object(object)
}

impl TransferBackend for PostgresBackend {
    fn engine(&self) -> &'static str {
        "postgres"
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT tablename::text
                 FROM pg_catalog.pg_tables
                 WHERE schemaname = current_schema()
                 ORDER BY tablename",
                &[],
            )
            .await
            .context("Failed to list tables")?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn describe_table(&mut self, table: &str) -> Result<TableSchema> {
        let columns: Vec<String> = self
            .client
            .query(
                "SELECT column_name::text
                 FROM information_schema.columns
                 WHERE table_schema = current_schema()
                   AND table_name::text = $1
                 ORDER BY ordinal_position",
                &[&table],
            )
            .await
            .with_context(|| format!("Failed to get columns for table '{}'", table))?
            .iter()
            .map(|row| row.get(0))
            .collect();

        let primary_key: Vec<String> = self
            .client
            .query(
                "SELECT kcu.column_name::text
                 FROM information_schema.table_constraints tc
                 JOIN information_schema.key_column_usage kcu
                   ON tc.constraint_name = kcu.constraint_name
                  AND tc.table_schema = kcu.table_schema
                 WHERE tc.constraint_type = 'PRIMARY KEY'
                   AND tc.table_schema = current_schema()
                   AND tc.table_name::text = $1
                 ORDER BY kcu.ordinal_position",
                &[&table],
            )
            .await
            .with_context(|| format!("Failed to get primary key for table '{}'", table))?
            .iter()
            .map(|row| row.get(0))
            .collect();

        let relations: Vec<Relation> = self
            .client
            .query(
                "SELECT kcu.column_name::text, ccu.table_name::text, ccu.column_name::text
                 FROM information_schema.table_constraints tc
                 JOIN information_schema.key_column_usage kcu
                   ON tc.constraint_name = kcu.constraint_name
                  AND tc.table_schema = kcu.table_schema
                 JOIN information_schema.constraint_column_usage ccu
                   ON ccu.constraint_name = tc.constraint_name
                  AND ccu.constraint_schema = tc.table_schema
                 WHERE tc.constraint_type = 'FOREIGN KEY'
                   AND tc.table_schema = current_schema()
                   AND tc.table_name::text = $1
                 ORDER BY tc.constraint_name, kcu.ordinal_position",
                &[&table],
            )
            .await
            .with_context(|| format!("Failed to get foreign keys for table '{}'", table))?
            .iter()
            .map(|row| {
                let column: String = row.get(0);
                let ref_table: String = row.get(1);
                let ref_column: String = row.get(2);
                Relation::new(&column, &ref_table, &ref_column)
            })
            .collect();

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
            .map(|c| quote(c).map(|q| format!("{}::text", q)))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let query = format!(
            "SELECT {} FROM {} ORDER BY {}",
            select_list,
            quote(table)?,
            order_clause(order_by)?
        );
        tracing::debug!("PostgreSQL scan: {}", query);

        let stream = self
            .client
            .query_raw(query.as_str(), Vec::<String>::new())
            .await
            .with_context(|| format!("Failed to query rows from table '{}'", table))?;
        pin_mut!(stream);

        let mut count = 0u64;
        while let Some(row) = stream
            .try_next()
            .await
            .with_context(|| format!("Failed to read row from table '{}'", table))?
        {
            let mut values = Vec::with_capacity(columns.len());
            for idx in 0..columns.len() {
                let value: Option<String> = row
                    .try_get(idx)
                    .with_context(|| format!("Failed to read column '{}'", columns[idx]))?;
                values.push(value);
            }
            visit(values)?;
            count += 1;
        }

        Ok(count)
    }

    async fn set_referential_integrity(&mut self, enabled: bool) -> Result<()> {
        let sql = if enabled {
            "SET session_replication_role = DEFAULT"
        } else {
            "SET session_replication_role = replica"
        };
        self.client
            .batch_execute(sql)
            .await
            .with_context(|| format!("Failed to run '{}'", sql))
    }

    async fn begin(&mut self) -> Result<()> {
        self.client
            .batch_execute("BEGIN")
            .await
            .context("Failed to begin transaction")
    }

    async fn commit(&mut self) -> Result<()> {
        self.client
            .batch_execute("COMMIT")
            .await
            .context("Failed to commit transaction")
    }

    async fn rollback(&mut self) -> Result<()> {
        self.client
            .batch_execute("ROLLBACK")
            .await
            .context("Failed to roll back transaction")
    }

    async fn delete_all(&mut self, table: &str) -> Result<u64> {
        let sql = format!("DELETE FROM {}", quote(table)?);
        self.client
            .execute(sql.as_str(), &[])
            .await
            .with_context(|| format!("Failed to delete rows from '{}'", table))
    }

    async fn insert_row(
        &mut self,
        table: &str,
        columns: &[String],
        values: &[Option<String>],
    ) -> Result<()> {
        let sql = build_insert_sql(table, columns)?;
        let payload = row_to_json(columns, values).to_string();

        self.client
            .execute(sql.as_str(), &[&payload])
            .await
            .with_context(|| format!("Failed to insert row into '{}'", table))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_build_insert_sql() {
        let sql = build_insert_sql("users", &names(&["id", "name"])).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"users\" (\"id\", \"name\") SELECT \"id\", \"name\" \
             FROM json_populate_record(NULL::\"users\", $1::text::json)"
        );
    }

    #[test]
    fn test_build_insert_sql_escapes_odd_names() {
        let sql = build_insert_sql("sign-ups", &names(&["2fa", "na\"me"])).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"sign-ups\" (\"2fa\", \"na\"\"me\") SELECT \"2fa\", \"na\"\"me\" \
             FROM json_populate_record(NULL::\"sign-ups\", $1::text::json)"
        );
    }

    #[test]
    fn test_order_clause_lists_every_key() {
        assert_eq!(
            order_clause(&names(&["post_id", "tag_id"])).unwrap(),
            "\"post_id\" ASC, \"tag_id\" ASC"
        );
    }

    #[test]
    fn test_row_to_json_keeps_nulls_and_text() {
        let json = row_to_json(
            &names(&["id", "email", "bio"]),
            &[Some("1".into()), None, Some("tab\there".into())],
        );
        assert_eq!(
            json,
            serde_json::json!({"id": "1", "email": null, "bio": "tab\there"})
        );
    }

    // Requires a PostgreSQL server; set TEST_DATABASE_URL
    #[tokio::test]
    #[ignore]
    async fn test_list_tables_live() {
        let url = std::env::var("TEST_DATABASE_URL")
            .expect("TEST_DATABASE_URL must be set for integration tests");
        let mut db = PostgresBackend::connect(&url).await.unwrap();
        let tables = db.list_tables().await.unwrap();
        println!("Found {} tables", tables.len());
    }
}
