//! CSV writer for analysis result tables.
//!
//! Files are UTF-8 with a leading byte-order mark so spreadsheet tools pick
//! up the Chinese headers correctly, and are named
//! `<base>_<kind>_<YYYYMMDDHHMM>.csv`.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{debug, info};

use super::schema::{ExportSchema, Record};
use crate::error::ExportError;

/// UTF-8 byte-order mark written at the start of every file.
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Minute-granularity timestamp used in file names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M";

const FALLBACK_BASE_NAME: &str = "unknown_redis_analysis_result";

/// Exports `records` under the schema named `schema_name` into
/// `destination_dir`, returning the path of the written file.
///
/// `None` means the remote returned no table at all: the file is created with
/// only the byte-order mark and no header. `Some(&[])` produces a header-only
/// file.
///
/// # Errors
///
/// Returns `ExportError::UnknownSchema` before touching the filesystem if the
/// schema name is not recognized, and an I/O flavoured `ExportError` if the
/// directory, the file or any row cannot be written.
pub fn export_records(
    records: Option<&[Record]>,
    schema_name: &str,
    destination_dir: &Path,
    base_file_name: &str,
) -> Result<PathBuf, ExportError> {
    let schema = ExportSchema::by_name(schema_name)?;
    export_with_schema(records, schema, destination_dir, base_file_name, Local::now())
}

/// Same as [`export_records`] with a resolved schema and explicit timestamp.
pub fn export_with_schema(
    records: Option<&[Record]>,
    schema: &ExportSchema,
    destination_dir: &Path,
    base_file_name: &str,
    now: DateTime<Local>,
) -> Result<PathBuf, ExportError> {
    ensure_dir(destination_dir)?;

    let path = destination_dir.join(file_name(base_file_name, schema, now));
    let mut file = File::create(&path).map_err(|source| ExportError::CreateFile {
        path: path.clone(),
        source,
    })?;
    file.write_all(UTF8_BOM)?;

    let Some(records) = records else {
        debug!(path = %path.display(), schema = schema.name, "No records provided, skipping header");
        file.flush()?;
        return Ok(path);
    };

    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(schema.display_names())?;

    for (index, record) in records.iter().enumerate() {
        writer
            .write_record(schema.render_row(record))
            .map_err(|e| ExportError::WriteRow {
                path: path.clone(),
                row: index + 1,
                message: e.to_string(),
            })?;
    }
    writer.flush()?;

    info!(
        path = %path.display(),
        schema = schema.name,
        rows = records.len(),
        "Exported analysis table"
    );
    Ok(path)
}

/// Builds `<base>_<kind>_<YYYYMMDDHHMM>.csv`.
pub fn file_name(base_file_name: &str, schema: &ExportSchema, now: DateTime<Local>) -> String {
    let base = if base_file_name.is_empty() {
        FALLBACK_BASE_NAME
    } else {
        base_file_name
    };
    format!(
        "{}_{}_{}.csv",
        base,
        schema.kind.as_str(),
        now.format(TIMESTAMP_FORMAT)
    )
}

/// Creates `dir` and its parents. A directory that already exists, including
/// one created concurrently by another task, is fine.
fn ensure_dir(dir: &Path) -> Result<(), ExportError> {
    match fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        Err(source) => Err(ExportError::CreateDir {
            path: dir.to_path_buf(),
            source,
        }),
    }
}
