use chrono::NaiveDate;
use serde::Serialize;
use std::{borrow::Cow, fmt};
use tracing::warn;

/// Scalar cell of a tabular row. Callers decide number formatting; the codec never infers types.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Text(String),
    Number(f64),
    Null,
}

impl Cell {
    pub fn empty() -> Self {
        Cell::Text(String::new())
    }

    /// Text rendering used by every sink; `Null` becomes an empty string.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Cell::Text(value) => Cow::Borrowed(value.as_str()),
            Cell::Number(value) => Cow::Owned(value.to_string()),
            Cell::Null => Cow::Borrowed(""),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Number(value as f64)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Null)
    }
}

pub type Row = Vec<Cell>;

/// Header plus positionally aligned rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    /// Builds a table and aligns every row to the header width.
    ///
    /// Short rows are padded with empty strings. Cells past the header width are dropped and
    /// logged, since a row that outgrows its header cannot be placed positionally.
    pub fn new(header: Vec<String>, rows: Vec<Row>) -> Self {
        let width = header.len();
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(idx, mut row)| {
                if row.len() > width {
                    warn!(
                        target: "reports.table",
                        row = idx,
                        cells = row.len(),
                        width,
                        "row wider than header; extra cells dropped"
                    );
                    row.truncate(width);
                }
                row.resize(width, Cell::empty());
                row
            })
            .collect();
        Self { header, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        column_index(&self.header, name)
    }

    /// Inserts constant leading columns (e.g. store, date) in front of every row.
    pub fn prepend_columns(mut self, columns: &[(&str, Cell)]) -> Self {
        let mut header: Vec<String> = columns.iter().map(|(name, _)| name.to_string()).collect();
        header.extend(self.header);
        self.header = header;
        for row in &mut self.rows {
            let mut prefixed: Row = columns.iter().map(|(_, value)| value.clone()).collect();
            prefixed.append(row);
            *row = prefixed;
        }
        self
    }
}

pub fn column_index(header: &[String], name: &str) -> Option<usize> {
    header.iter().position(|column| column.trim() == name)
}

/// Values of the designated key columns of one row, rendered as text.
pub fn row_key(row: &[Cell], indices: &[usize]) -> Vec<String> {
    indices
        .iter()
        .map(|idx| {
            row.get(*idx)
                .map(|cell| cell.as_text().trim().to_string())
                .unwrap_or_default()
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Append,
    Overwrite,
}

/// How one key column selects existing rows for replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMatcher {
    Exact(String),
    /// Inclusive calendar range over a date cell.
    DateRange { from: NaiveDate, to: NaiveDate },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyColumn {
    pub index: usize,
    pub matcher: KeyMatcher,
}

/// Conjunction of per-column matchers. Rows satisfying every column are replaced on write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPredicate {
    pub columns: Vec<KeyColumn>,
}

impl KeyPredicate {
    pub fn exact(mut self, index: usize, value: impl Into<String>) -> Self {
        self.columns.push(KeyColumn {
            index,
            matcher: KeyMatcher::Exact(value.into()),
        });
        self
    }

    pub fn date_range(mut self, index: usize, from: NaiveDate, to: NaiveDate) -> Self {
        self.columns.push(KeyColumn {
            index,
            matcher: KeyMatcher::DateRange { from, to },
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// One write, consumed once by a sink.
#[derive(Debug, Clone)]
pub struct SinkWriteRequest {
    /// File name or sheet name.
    pub table_name: String,
    pub header: Vec<String>,
    pub rows: Vec<Row>,
    pub mode: WriteMode,
    pub key: Option<KeyPredicate>,
}

impl SinkWriteRequest {
    pub fn overwrite(table_name: impl Into<String>, table: Table) -> Self {
        Self {
            table_name: table_name.into(),
            header: table.header,
            rows: table.rows,
            mode: WriteMode::Overwrite,
            key: None,
        }
    }

    pub fn append(table_name: impl Into<String>, table: Table) -> Self {
        Self {
            mode: WriteMode::Append,
            ..Self::overwrite(table_name, table)
        }
    }

    pub fn with_key(mut self, key: KeyPredicate) -> Self {
        self.key = Some(key);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_pads_short_rows_with_empty_strings() {
        let table = Table::new(
            vec!["a".into(), "b".into(), "c".into()],
            vec![vec![Cell::from("1")]],
        );
        assert_eq!(
            table.rows[0],
            vec![Cell::from("1"), Cell::empty(), Cell::empty()]
        );
    }

    #[test]
    fn numbers_render_without_trailing_zero() {
        assert_eq!(Cell::from(5.0).as_text(), "5");
        assert_eq!(Cell::from(12.5).as_text(), "12.5");
        assert_eq!(Cell::Null.as_text(), "");
    }

    #[test]
    fn prepend_columns_shifts_header_and_rows() {
        let table = Table::new(vec!["x".into()], vec![vec![Cell::from("1")]])
            .prepend_columns(&[("Store", Cell::from("Povar"))]);
        assert_eq!(table.header, vec!["Store".to_string(), "x".to_string()]);
        assert_eq!(table.rows[0], vec![Cell::from("Povar"), Cell::from("1")]);
        assert_eq!(table.column_index("x"), Some(1));
    }

    #[test]
    fn row_key_reads_trimmed_values() {
        let row = vec![Cell::from(" S "), Cell::from(3.0), Cell::Null];
        assert_eq!(row_key(&row, &[0, 1, 2, 7]), vec!["S", "3", "", ""]);
    }
}
