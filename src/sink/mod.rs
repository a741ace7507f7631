//! Idempotent tabular write targets.

pub mod file;
pub mod sheet;

pub use file::FileSink;
pub use sheet::{SheetTable, SpreadsheetSink};

use crate::models::{KeyMatcher, KeyPredicate, SinkWriteRequest};
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink unavailable: {0}")]
    SinkUnavailable(String),
    #[error("sink io failed on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("spreadsheet backend failed: {0}")]
    Backend(String),
    #[error("write request malformed: {0}")]
    Shape(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    pub deleted: usize,
    pub written: usize,
}

#[async_trait]
pub trait TabularSink: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fails when the sink cannot accept writes at all; checked before any report is fetched.
    fn check_available(&self) -> Result<(), SinkError> {
        Ok(())
    }

    async fn write(&self, request: SinkWriteRequest) -> Result<WriteOutcome, SinkError>;
}

/// Rejects rows that do not line up with the header.
pub(crate) fn check_shape(request: &SinkWriteRequest) -> Result<(), SinkError> {
    if request.header.is_empty() {
        return Err(SinkError::Shape(format!("`{}` has an empty header", request.table_name)));
    }
    if let Some(idx) = request.rows.iter().position(|row| row.len() != request.header.len()) {
        return Err(SinkError::Shape(format!(
            "row {idx} has {} cells, header has {}",
            request.rows[idx].len(),
            request.header.len()
        )));
    }
    if let Some(key) = &request.key {
        if let Some(column) = key.columns.iter().find(|c| c.index >= request.header.len()) {
            return Err(SinkError::Shape(format!(
                "key column {} outside header width {}",
                column.index,
                request.header.len()
            )));
        }
    }
    Ok(())
}

/// Whether an existing row, as displayed text, is selected by `key`.
pub fn key_matches(key: &KeyPredicate, row: &[String]) -> bool {
    !key.is_empty()
        && key.columns.iter().all(|column| {
            let cell = row.get(column.index).map(|v| v.trim()).unwrap_or("");
            match &column.matcher {
                KeyMatcher::Exact(expected) => cell == expected.trim(),
                KeyMatcher::DateRange { from, to } => {
                    parse_cell_date(cell).is_some_and(|day| *from <= day && day <= *to)
                }
            }
        })
}

/// Accepts `YYYY-MM-DD…` and `DD.MM.YYYY…`; anything after the date (a time) is ignored.
pub fn parse_cell_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    let head = value.get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(head, "%d.%m.%Y"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Cell, Table};

    fn d(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("date")
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn parses_both_date_layouts() {
        assert_eq!(parse_cell_date("2026-01-03"), Some(d("2026-01-03")));
        assert_eq!(parse_cell_date("2026-01-03 10:15:00"), Some(d("2026-01-03")));
        assert_eq!(parse_cell_date("03.01.2026 10:15"), Some(d("2026-01-03")));
        assert_eq!(parse_cell_date("yesterday"), None);
        assert_eq!(parse_cell_date(""), None);
    }

    #[test]
    fn exact_and_range_columns_are_conjoined() {
        let key = KeyPredicate::default()
            .exact(0, "A")
            .date_range(1, d("2026-01-01"), d("2026-01-03"));
        assert!(key_matches(&key, &strings(&["A", "2026-01-01"])));
        assert!(key_matches(&key, &strings(&["A ", "03.01.2026"])));
        assert!(!key_matches(&key, &strings(&["A", "2026-01-04"])));
        assert!(!key_matches(&key, &strings(&["B", "2026-01-02"])));
        assert!(!key_matches(&key, &strings(&["A"])));
    }

    #[test]
    fn empty_predicate_matches_nothing() {
        assert!(!key_matches(&KeyPredicate::default(), &strings(&["A"])));
    }

    #[test]
    fn misaligned_rows_are_rejected() {
        let mut request = SinkWriteRequest::overwrite(
            "t",
            Table::new(vec!["a".into(), "b".into()], vec![vec![Cell::from("1")]]),
        );
        assert!(check_shape(&request).is_ok());
        request.rows.push(vec![Cell::from("1")]);
        assert!(matches!(check_shape(&request), Err(SinkError::Shape(_))));
    }
}
