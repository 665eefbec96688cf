//! Header-driven decoder for the engine's timeseries CSV.
//!
//! The first non-empty line names the columns; every following non-empty
//! line is one [`MeasurementRecord`].  Cells are parsed as `f64`; empty or
//! non-numeric cells are kept as "column present, no value".  A row shorter
//! than the header simply lacks the trailing columns.

use thiserror::Error;
use tracing::debug;

use super::MeasurementRecord;

/// The timeseries text could not be turned into records.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// Two header cells carry the same name.
    #[error("timeseries header repeats column '{column}'")]
    DuplicateColumn { column: String },

    /// The header names no columns at all.
    #[error("timeseries header is empty")]
    EmptyHeader,

    /// A data row has more cells than the header has columns.
    #[error("timeseries line {line}: expected at most {expected} fields, found {found}")]
    TooManyFields {
        line: usize,
        expected: usize,
        found: usize,
    },
}

fn split_row(line: &str) -> Vec<&str> {
    line.split(',')
        .map(|cell| cell.trim().trim_matches('"'))
        .collect()
}

/// Decodes CSV `text` into measurement records.
///
/// Empty input decodes to an empty sequence.
pub fn decode_records(text: &str) -> Result<Vec<MeasurementRecord>, DecodeError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim_end_matches('\r')))
        .filter(|(_, l)| !l.trim().is_empty());

    let Some((_, header_line)) = lines.next() else {
        return Ok(Vec::new());
    };

    let header: Vec<String> = split_row(header_line)
        .into_iter()
        .map(str::to_string)
        .collect();
    if header.iter().all(|h| h.is_empty()) {
        return Err(DecodeError::EmptyHeader);
    }
    for (i, name) in header.iter().enumerate() {
        if header[..i].contains(name) {
            return Err(DecodeError::DuplicateColumn {
                column: name.clone(),
            });
        }
    }

    let mut records = Vec::new();
    for (line_no, line) in lines {
        let cells = split_row(line);
        if cells.len() > header.len() {
            return Err(DecodeError::TooManyFields {
                line: line_no,
                expected: header.len(),
                found: cells.len(),
            });
        }

        let mut record = MeasurementRecord::new();
        for (name, cell) in header.iter().zip(cells) {
            record.insert(name.as_str(), cell.parse::<f64>().ok());
        }
        records.push(record);
    }

    debug!(
        columns = header.len(),
        records = records.len(),
        "decoded timeseries"
    );
    Ok(records)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
