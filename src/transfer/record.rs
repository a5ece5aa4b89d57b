// ABOUTME: Schema-aware records built from a transfer file header and body line
// ABOUTME: Resolves header names to columns and drops relation names shadowed by their column

use crate::error::{TransferError, TransferResult};
use crate::schema::TableSchema;
use anyhow::anyhow;

/// One row ready for insertion: target columns and their values, paired
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub columns: Vec<String>,
    pub values: Vec<Option<String>>,
}

/// Mapping from header positions to table columns, resolved once per file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    /// Column for each header field; `None` for fields that are skipped
    targets: Vec<Option<String>>,
    columns: Vec<String>,
}

impl RecordLayout {
    /// Resolve every header name against the live schema
    ///
    /// A relation property maps to its foreign-key column, unless that
    /// column is named in the header as well, in which case the property is
    /// skipped and the explicit column wins.
    ///
    /// # Errors
    ///
    /// `TransferError::Schema` for a name that is neither a column nor a
    /// relation property, or for two header fields writing the same column.
    pub fn resolve(schema: &TableSchema, header: &[String]) -> TransferResult<Self> {
        let mut targets = Vec::with_capacity(header.len());
        let mut columns: Vec<String> = Vec::with_capacity(header.len());

        for name in header {
            let column = schema.resolve(name).ok_or_else(|| {
                TransferError::schema(
                    &schema.name,
                    anyhow!(
                        "header field '{}' is not a column or relation of '{}'",
                        name,
                        schema.name
                    ),
                )
            })?;

            let is_property = column != name.as_str();
            if is_property && header.iter().any(|h| h == column) {
                tracing::debug!(
                    "Ignoring '{}' in header of '{}': column '{}' is present",
                    name,
                    schema.name,
                    column
                );
                targets.push(None);
                continue;
            }

            if columns.iter().any(|c| c == column) {
                return Err(TransferError::schema(
                    &schema.name,
                    anyhow!("header writes column '{}' more than once", column),
                ));
            }
            columns.push(column.to_string());
            targets.push(Some(column.to_string()));
        }

        Ok(Self { targets, columns })
    }

    /// Number of fields each body line must carry
    pub fn arity(&self) -> usize {
        self.targets.len()
    }

    /// Columns written by every insert, in header order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Pair one decoded body line with the target columns
    ///
    /// Values are taken from the line in order, each used at most once.
    pub fn build(&self, values: Vec<Option<String>>) -> Record {
        debug_assert_eq!(values.len(), self.arity());
        let values = self
            .targets
            .iter()
            .zip(values)
            .filter_map(|(target, value)| target.as_ref().map(|_| value))
            .collect();

        Record {
            columns: self.columns.clone(),
            values,
        }
    }
}
