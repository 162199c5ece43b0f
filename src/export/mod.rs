//! Export module for analysis results.
//!
//! Provides the fixed result table schemas and the CSV writer.

pub mod csv_writer;
pub mod schema;

pub use csv_writer::{export_records, export_with_schema, file_name, UTF8_BOM};
pub use schema::{Column, ColumnFormat, ExportSchema, Record, ResultKind, TOP_BIGMEM, TOP_PREFIX};
