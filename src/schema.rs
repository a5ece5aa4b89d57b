// ABOUTME: Live table metadata used to plan every export and import
// ABOUTME: Describes columns, primary key and foreign relations without caching

use crate::backend::TransferBackend;
use crate::error::{TransferError, TransferResult};
use anyhow::anyhow;

/// Outgoing foreign key of a table, addressed by its access name
///
/// `property` is what the transfer file calls the relation. The value carried
/// under that name is the identifier of the related row, which lives in the
/// local `column`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub property: String,
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

impl Relation {
    /// Build a relation, deriving the property name from the foreign-key column
    ///
    /// `author_id` becomes `author`. A column without the `_id` suffix takes
    /// the referenced table's name instead.
    pub fn new(column: &str, referenced_table: &str, referenced_column: &str) -> Self {
        let property = match column.strip_suffix("_id") {
            Some(stem) if !stem.is_empty() => stem.to_string(),
            _ => referenced_table.to_string(),
        };

        Self {
            property,
            column: column.to_string(),
            referenced_table: referenced_table.to_string(),
            referenced_column: referenced_column.to_string(),
        }
    }
}

/// Snapshot of a table's shape, read fresh for each transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    /// Column names in table (ordinal) order
    pub columns: Vec<String>,
    /// Primary-key columns in key order
    pub primary_key: Vec<String>,
    pub relations: Vec<Relation>,
}

impl TableSchema {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn relation(&self, property: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.property == property)
    }

    /// Map a transfer-file field name to the column that stores it
    ///
    /// Real columns win over relation properties of the same name.
    pub fn resolve(&self, field: &str) -> Option<&str> {
        if let Some(column) = self.columns.iter().find(|c| *c == field) {
            return Some(column.as_str());
        }
        self.relation(field).map(|r| r.column.as_str())
    }
}

/// Read a table's columns, primary key and relations from the database
///
/// Never cached: the transfer must match the table that is actually present
/// at call time.
///
/// # Errors
///
/// `TransferError::Schema` if the table does not exist or the backend cannot
/// report metadata.
pub async fn describe<B: TransferBackend>(db: &mut B, table: &str) -> TransferResult<TableSchema> {
    let mut schema = db
        .describe_table(table)
        .await
        .map_err(|e| TransferError::schema(table, e))?;

    // Relations follow the position of their foreign-key column
    let position = |column: &str| schema.columns.iter().position(|c| c == column);
    let mut relations = std::mem::take(&mut schema.relations);
    relations.sort_by_key(|r| position(&r.column));
    schema.relations = relations;

    if schema.columns.is_empty() {
        return Err(TransferError::schema(
            table,
            anyhow!("table '{}' does not exist or has no columns", table),
        ));
    }

    tracing::debug!(
        "Table '{}': columns={:?}, primary_key={:?}, relations={}",
        table,
        schema.columns,
        schema.primary_key,
        schema.relations.len()
    );

    Ok(schema)
}

/// Ordered column names of a table
pub async fn columns<B: TransferBackend>(db: &mut B, table: &str) -> TransferResult<Vec<String>> {
    Ok(describe(db, table).await?.columns)
}

/// Ordered primary-key column names of a table
pub async fn primary_key<B: TransferBackend>(
    db: &mut B,
    table: &str,
) -> TransferResult<Vec<String>> {
    Ok(describe(db, table).await?.primary_key)
}

/// Remove every name in `exclude` from `columns`, keeping order
pub fn filter_columns(columns: &[String], exclude: &[String]) -> Vec<String> {
    columns
        .iter()
        .filter(|c| !exclude.contains(c))
        .cloned()
        .collect()
}
