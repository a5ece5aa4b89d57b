// ABOUTME: Transfer engine moving table rows to and from tab-delimited files
// ABOUTME: Groups the file codec, column selection, exporter, importer and discovery

pub mod columns;
pub mod discovery;
pub mod export;
pub mod format;
pub mod import;
pub mod record;

pub use columns::{ColumnSet, SelectionOptions};
pub use export::{export_table, ExportSummary};
pub use import::{import_table, ImportProgress, ImportSummary, NoProgress};
