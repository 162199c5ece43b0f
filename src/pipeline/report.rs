//! Markdown summary posted once all instances are done.

use std::collections::HashMap;

use chrono::NaiveDate;

use super::config::ReportEntry;

/// Date format used in the summary header.
pub const REPORT_DATE_FORMAT: &str = "%Y%m%d";

/// Composes the summary comment.
///
/// Each entry renders as a label followed by its top-prefix and top-bigmem
/// references, looked up by the entry's cache keys. Keys without a recorded
/// reference render as an empty string so that a failed instance still gets
/// its line.
pub fn compose_summary(
    date: NaiveDate,
    entries: &[ReportEntry],
    references: &HashMap<String, String>,
) -> String {
    let lookup = |key: &str| references.get(key).map(String::as_str).unwrap_or("");

    let header = format!(
        "##### 分析时间：{}\n\n#### redis离线全量key分析\n\n",
        date.format(REPORT_DATE_FORMAT)
    );

    let body = entries
        .iter()
        .map(|entry| {
            format!(
                "- {}\n\n    - top 100 key前缀：{}\n\n    - top 100 bigkey(按内存)：{}",
                entry.label,
                lookup(&entry.prefix),
                lookup(&entry.bigkey)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    header + &body
}
