// ABOUTME: Column selection for table exports
// ABOUTME: Combines schema columns, explicit field lists, audit exclusions and relation names

use crate::error::{TransferError, TransferResult};
use crate::schema::{filter_columns, TableSchema};
use crate::utils::split_name_list;
use anyhow::anyhow;

/// Timestamp columns left out of default selections
pub const AUDIT_COLUMNS: [&str; 3] = ["created", "modified", "updated"];

/// User choices that shape the exported column set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionOptions {
    /// Comma-separated field list used verbatim instead of the schema columns
    pub explicit_fields: Option<String>,
    /// Export only the primary key; wins over `explicit_fields`
    pub no_fields: bool,
    /// Comma-separated key column(s) used instead of the table's primary key
    pub primary_key_override: Option<String>,
}

impl SelectionOptions {
    pub fn with_fields(fields: &str) -> Self {
        Self {
            explicit_fields: Some(fields.to_string()),
            ..Self::default()
        }
    }

    pub fn key_only() -> Self {
        Self {
            no_fields: true,
            ..Self::default()
        }
    }
}

/// Columns of one transfer: the key column(s) plus the non-key fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSet {
    primary_key: Vec<String>,
    fields: Vec<String>,
}

impl ColumnSet {
    /// Key column(s) in key order; rows are sorted on each in turn
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    /// Non-key field names in file order
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Header line fields: key column(s) first, then the fields
    pub fn header(&self) -> Vec<String> {
        let mut header = Vec::with_capacity(self.primary_key.len() + self.fields.len());
        header.extend(self.primary_key.iter().cloned());
        header.extend(self.fields.iter().cloned());
        header
    }

    /// Column to read for every header field, relation properties mapped to
    /// their foreign-key column
    pub fn projection(&self, schema: &TableSchema) -> TransferResult<Vec<String>> {
        self.header()
            .iter()
            .map(|name| {
                schema
                    .resolve(name)
                    .map(str::to_string)
                    .ok_or_else(|| unknown_field(schema, name))
            })
            .collect()
    }
}

fn unknown_field(schema: &TableSchema, name: &str) -> TransferError {
    TransferError::schema(
        &schema.name,
        anyhow!(
            "unknown field '{}' (table columns: {})",
            name,
            schema.columns.join(", ")
        ),
    )
}

/// Key column(s): the override when given, otherwise the table's primary key
pub fn resolve_primary_key(schema: &TableSchema, options: &SelectionOptions) -> Vec<String> {
    match options.primary_key_override.as_deref() {
        Some(value) if !value.trim().is_empty() => split_name_list(value),
        _ => schema.primary_key.clone(),
    }
}

/// Non-key fields chosen by `options`, before validation
///
/// # Examples
///
/// ```
/// # use tsvio::schema::TableSchema;
/// # use tsvio::transfer::columns::{select_fields, SelectionOptions};
/// let schema = TableSchema {
///     name: "users".into(),
///     columns: ["id", "name", "email", "created", "modified"]
///         .iter().map(|s| s.to_string()).collect(),
///     primary_key: vec!["id".into()],
///     relations: vec![],
/// };
/// assert_eq!(select_fields(&schema, &SelectionOptions::default()), ["name", "email"]);
/// assert!(select_fields(&schema, &SelectionOptions::key_only()).is_empty());
/// assert_eq!(select_fields(&schema, &SelectionOptions::with_fields("name")), ["name"]);
/// ```
pub fn select_fields(schema: &TableSchema, options: &SelectionOptions) -> Vec<String> {
    if options.no_fields {
        return Vec::new();
    }

    if let Some(explicit) = options.explicit_fields.as_deref() {
        if !explicit.trim().is_empty() {
            return split_name_list(explicit);
        }
    }

    let mut exclude = resolve_primary_key(schema, options);
    exclude.extend(AUDIT_COLUMNS.iter().map(|c| c.to_string()));

    let mut fields = filter_columns(&schema.columns, &exclude);
    for relation in &schema.relations {
        if !fields.contains(&relation.property) && !exclude.contains(&relation.property) {
            fields.push(relation.property.clone());
        }
    }
    fields
}

/// Compute and validate the column set for exporting one table
///
/// # Errors
///
/// `TransferError::Schema` when the table has no primary key (and no override
/// was given), when a key or field name is unknown to the live schema, or
/// when a name appears twice in the header.
pub fn select(schema: &TableSchema, options: &SelectionOptions) -> TransferResult<ColumnSet> {
    let primary_key = resolve_primary_key(schema, options);
    if primary_key.is_empty() {
        return Err(TransferError::schema(
            &schema.name,
            anyhow!(
                "table '{}' has no primary key; pass --primary-key to choose the sort column",
                schema.name
            ),
        ));
    }
    for key in &primary_key {
        if !schema.has_column(key) {
            return Err(unknown_field(schema, key));
        }
    }

    let fields = select_fields(schema, options);
    let set = ColumnSet {
        primary_key,
        fields,
    };

    let header = set.header();
    for (i, name) in header.iter().enumerate() {
        if header[..i].contains(name) {
            return Err(TransferError::schema(
                &schema.name,
                anyhow!("field '{}' appears more than once in the header", name),
            ));
        }
    }
    set.projection(schema)?;

    Ok(set)
}
