//! CSV serialization of a record cursor.
//!
//! Output is UTF-8, comma separated, fields quoted with `"` only when needed
//! (embedded quotes are doubled), and every line ends with CRLF.

use super::store::RecordCursor;
use crate::error::ExportError;
use std::fs::File;
use std::path::Path;
use tokio_util::sync::CancellationToken;

fn write_failed(path: &Path, reason: impl std::fmt::Display) -> ExportError {
    ExportError::WriteFailed {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Write the header and every row of `cursor` into `file`
///
/// Blocking; run it on a blocking thread. Returns the number of data rows
/// written. The file and the cursor are released on every return path.
pub(crate) fn write_records(
    file: File,
    path: &Path,
    cursor: RecordCursor,
    cancel: &CancellationToken,
) -> Result<usize, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b',')
        .quote(b'"')
        .double_quote(true)
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::CRLF)
        .from_writer(file);

    let columns = cursor.columns().to_vec();
    writer
        .write_record(&columns)
        .map_err(|e| write_failed(path, e))?;

    let mut rows = 0;
    for (index, row) in cursor.enumerate() {
        if cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }

        let row = row.map_err(|e| write_failed(path, e))?;
        if row.len() != columns.len() {
            return Err(write_failed(
                path,
                format!(
                    "row {} has {} values but the header has {} columns",
                    index + 1,
                    row.len(),
                    columns.len()
                ),
            ));
        }

        writer
            .write_record(&row)
            .map_err(|e| write_failed(path, e))?;
        rows += 1;
    }

    writer.flush().map_err(|e| write_failed(path, e))?;
    let file = writer
        .into_inner()
        .map_err(|e| write_failed(path, e.error()))?;
    file.sync_all().map_err(|e| write_failed(path, e))?;

    Ok(rows)
}
