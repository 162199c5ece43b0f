//! Fixed export schemas for cache analysis results.
//!
//! Each schema maps record fields (by source key) to CSV columns, in order,
//! together with the formatting rule applied to the field.

use std::fmt;

use serde_json::{Map, Value};

use crate::error::ExportError;
use crate::utils::humanize::{humanize_bytes, humanize_count};

/// A loosely-typed result record as decoded from the remote service.
pub type Record = Map<String, Value>;

/// How a column's value is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnFormat {
    /// The value's plain textual form.
    Text,
    /// Binary-scaled byte size (`1.50 KB`).
    ByteSize,
    /// Decimal-scaled element count (`1.50K`).
    Count,
}

/// One output column of an export schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Field name in the source record.
    pub source_key: &'static str,
    /// Header shown in the CSV file.
    pub display_name: &'static str,
    pub format: ColumnFormat,
}

impl Column {
    const fn new(source_key: &'static str, display_name: &'static str, format: ColumnFormat) -> Self {
        Self {
            source_key,
            display_name,
            format,
        }
    }

    /// Renders this column's cell for `record`. Never fails: missing or
    /// mistyped fields produce an empty cell or the `?` placeholder.
    pub fn render(&self, record: &Record) -> String {
        let value = record.get(self.source_key);
        match self.format {
            ColumnFormat::ByteSize => humanize_bytes(value),
            ColumnFormat::Count => humanize_count(value),
            ColumnFormat::Text => render_text(value),
        }
    }
}

fn render_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// The two kinds of result tables a finished analysis job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultKind {
    /// Top key prefixes.
    TopPrefix,
    /// Top big keys by memory.
    TopBigMem,
}

impl ResultKind {
    /// All kinds, in export order.
    pub const ALL: [ResultKind; 2] = [ResultKind::TopPrefix, ResultKind::TopBigMem];

    /// Suffix used in file names and result cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultKind::TopPrefix => "topprefix",
            ResultKind::TopBigMem => "topbigmem",
        }
    }

    /// The export schema for this kind of table.
    pub fn schema(&self) -> &'static ExportSchema {
        match self {
            ResultKind::TopPrefix => &TOP_PREFIX,
            ResultKind::TopBigMem => &TOP_BIGMEM,
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, ordered list of columns.
#[derive(Debug, PartialEq, Eq)]
pub struct ExportSchema {
    pub name: &'static str,
    pub kind: ResultKind,
    pub columns: &'static [Column],
}

/// Key prefix statistics.
pub static TOP_PREFIX: ExportSchema = ExportSchema {
    name: "top-prefix",
    kind: ResultKind::TopPrefix,
    columns: &[
        Column::new("Prefix", "Prefix", ColumnFormat::Text),
        Column::new("Type", "类型", ColumnFormat::Text),
        Column::new("Bytes", "占有内存", ColumnFormat::ByteSize),
        Column::new("KeyNum", "Key数量", ColumnFormat::Text),
        Column::new("Count", "元素数量", ColumnFormat::Count),
    ],
};

/// Big keys ordered by memory.
pub static TOP_BIGMEM: ExportSchema = ExportSchema {
    name: "top-bigmem",
    kind: ResultKind::TopBigMem,
    columns: &[
        Column::new("Key", "Key", ColumnFormat::Text),
        Column::new("NodeId", "节点ID", ColumnFormat::Text),
        Column::new("Type", "类型", ColumnFormat::Text),
        Column::new("Encoding", "Encoding", ColumnFormat::Text),
        Column::new("Bytes", "占有内存", ColumnFormat::ByteSize),
        Column::new("Count", "元素数量", ColumnFormat::Count),
        Column::new("MaxLength", "最大元素的长度", ColumnFormat::Text),
        Column::new("ExpirationTimeMillis", "过期时间", ColumnFormat::Text),
        Column::new("Db", "DB", ColumnFormat::Text),
    ],
};

impl ExportSchema {
    /// Looks a schema up by name.
    ///
    /// Accepts the schema name (`top-prefix`) or the kind suffix
    /// (`topprefix`), case-insensitively.
    pub fn by_name(name: &str) -> Result<&'static ExportSchema, ExportError> {
        let wanted = name.trim().to_ascii_lowercase();
        ResultKind::ALL
            .iter()
            .map(ResultKind::schema)
            .find(|schema| schema.name == wanted || schema.kind.as_str() == wanted)
            .ok_or_else(|| ExportError::UnknownSchema(name.to_string()))
    }

    /// Header row, in column order.
    pub fn display_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.display_name).collect()
    }

    /// Renders one data row, in column order.
    pub fn render_row(&self, record: &Record) -> Vec<String> {
        self.columns.iter().map(|c| c.render(record)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().expect("object literal")
    }

    #[test]
    fn test_by_name() {
        assert_eq!(ExportSchema::by_name("top-prefix").unwrap().kind, ResultKind::TopPrefix);
        assert_eq!(ExportSchema::by_name("TOP-BIGMEM").unwrap().kind, ResultKind::TopBigMem);
        assert_eq!(ExportSchema::by_name("topbigmem").unwrap().name, "top-bigmem");
        assert!(matches!(
            ExportSchema::by_name("top-latency"),
            Err(ExportError::UnknownSchema(name)) if name == "top-latency"
        ));
    }

    #[test]
    fn test_display_names_in_order() {
        assert_eq!(
            TOP_PREFIX.display_names(),
            vec!["Prefix", "类型", "占有内存", "Key数量", "元素数量"]
        );
        assert_eq!(
            TOP_BIGMEM.display_names(),
            vec![
                "Key",
                "节点ID",
                "类型",
                "Encoding",
                "占有内存",
                "元素数量",
                "最大元素的长度",
                "过期时间",
                "DB"
            ]
        );
    }

    #[test]
    fn test_render_prefix_row() {
        let rec = record(json!({
            "Prefix": "user:session:*",
            "Type": "hash",
            "Bytes": 1536,
            "KeyNum": 42,
            "Count": 2000000,
            "Extra": "ignored"
        }));
        assert_eq!(
            TOP_PREFIX.render_row(&rec),
            vec!["user:session:*", "hash", "1.50 KB", "42", "2M"]
        );
    }

    #[test]
    fn test_render_row_with_missing_fields() {
        let rec = record(json!({ "Key": "cart:1", "Bytes": "lots", "Db": 0 }));
        let row = TOP_BIGMEM.render_row(&rec);
        assert_eq!(row.len(), 9);
        assert_eq!(row[0], "cart:1");
        assert_eq!(row[1], "");
        assert_eq!(row[4], "?");
        assert_eq!(row[5], "?");
        assert_eq!(row[8], "0");
    }

    #[test]
    fn test_render_text_variants() {
        assert_eq!(render_text(Some(&json!(null))), "");
        assert_eq!(render_text(Some(&json!(false))), "false");
        assert_eq!(render_text(Some(&json!(1.5))), "1.5");
        assert_eq!(render_text(Some(&json!(["a", 1]))), r#"["a",1]"#);
    }

    #[test]
    fn test_result_kind_strings() {
        assert_eq!(ResultKind::TopPrefix.to_string(), "topprefix");
        assert_eq!(ResultKind::TopBigMem.as_str(), "topbigmem");
        assert_eq!(ResultKind::TopBigMem.schema().name, "top-bigmem");
    }
}
