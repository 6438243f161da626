//! Measurement result parsing
//!
//! The tool writes a CSV whose first row is a header and whose first column
//! is the endpoint address. Rows are already ranked best-first.

use std::path::Path;

/// Read up to `max` ranked endpoints from the result file
///
/// The whole file is decoded first; an unreadable file or a malformed row
/// anywhere yields an empty list. The caller treats "no endpoints" as a
/// failed run.
pub fn parse_result_csv(path: &Path, max: usize) -> Vec<String> {
    let mut reader = match csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
    {
        Ok(reader) => reader,
        Err(e) => {
            tracing::debug!("Cannot open result file {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    let rows = match reader.records().collect::<Result<Vec<_>, _>>() {
        Ok(rows) => rows,
        Err(e) => {
            tracing::debug!("Cannot decode result file {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    rows.iter()
        .filter_map(|row| row.get(0))
        .map(str::trim)
        .filter(|endpoint| !endpoint.is_empty())
        .take(max)
        .map(str::to_string)
        .collect()
}
