use super::{SinkError, TabularSink, WriteOutcome, check_shape, key_matches};
use crate::models::{Cell, SinkWriteRequest, WriteMode};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Row-addressed access to one spreadsheet. Row numbers are 1-based; row 1 is the header.
#[async_trait]
pub trait SheetTable: Send + Sync {
    /// Creates the named sheet when missing; returns whether it was created.
    async fn ensure_sheet(&self, sheet: &str) -> Result<bool, SinkError>;

    /// Last row holding any value, 0 for an empty sheet.
    async fn last_row(&self, sheet: &str) -> Result<usize, SinkError>;

    /// Displayed values of rows `first..=last`, each padded to `width` cells.
    async fn read_rows(
        &self,
        sheet: &str,
        first: usize,
        last: usize,
        width: usize,
    ) -> Result<Vec<Vec<String>>, SinkError>;

    async fn write_rows(
        &self,
        sheet: &str,
        first: usize,
        rows: Vec<Vec<String>>,
    ) -> Result<(), SinkError>;

    /// Deletes `count` rows starting at `first`; rows below shift up.
    async fn delete_rows(&self, sheet: &str, first: usize, count: usize) -> Result<(), SinkError>;

    async fn clear(&self, sheet: &str) -> Result<(), SinkError>;
}

/// Key-scoped upsert into a spreadsheet: delete rows matching the key, then append the batch.
///
/// The delete and the append are separate calls with no transaction around them. A run that
/// dies in between leaves the key's rows missing until the pipeline is re-run.
#[derive(Clone)]
pub struct SpreadsheetSink {
    table: Option<Arc<dyn SheetTable>>,
}

impl SpreadsheetSink {
    pub fn new(table: Option<Arc<dyn SheetTable>>) -> Self {
        Self { table }
    }

    fn table(&self) -> Result<&dyn SheetTable, SinkError> {
        self.table.as_deref().ok_or_else(|| {
            SinkError::SinkUnavailable(
                "spreadsheet handle is not configured (SPREADSHEET_ID, GOOGLE_SHEETS_TOKEN)".into(),
            )
        })
    }

    async fn ensure_header(
        &self,
        table: &dyn SheetTable,
        sheet: &str,
        header: &[String],
    ) -> Result<usize, SinkError> {
        let last = table.last_row(sheet).await?;
        if last == 0 {
            table.write_rows(sheet, 1, vec![header.to_vec()]).await?;
            return Ok(1);
        }
        let current = table
            .read_rows(sheet, 1, 1, header.len())
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();
        let stale = current.len() < header.len()
            || current
                .iter()
                .zip(header)
                .any(|(have, want)| have.trim() != want.trim());
        if stale {
            debug!(target: "reports.sink", sheet, "header refreshed");
            table.write_rows(sheet, 1, vec![header.to_vec()]).await?;
        }
        Ok(last)
    }
}

#[async_trait]
impl TabularSink for SpreadsheetSink {
    fn name(&self) -> &'static str {
        "spreadsheet"
    }

    fn check_available(&self) -> Result<(), SinkError> {
        self.table().map(|_| ())
    }

    async fn write(&self, request: SinkWriteRequest) -> Result<WriteOutcome, SinkError> {
        let table = self.table()?;
        check_shape(&request)?;
        let sheet = request.table_name.as_str();
        let rows: Vec<Vec<String>> = request.rows.iter().map(|row| normalize_row(row)).collect();
        let written = rows.len();

        if table.ensure_sheet(sheet).await? {
            info!(target: "reports.sink", sheet, "sheet created");
        }

        if request.mode == WriteMode::Overwrite {
            table.clear(sheet).await?;
            let mut all = Vec::with_capacity(rows.len() + 1);
            all.push(request.header.clone());
            all.extend(rows);
            table.write_rows(sheet, 1, all).await?;
            info!(target: "reports.sink", sheet, rows = written, "sheet overwritten");
            return Ok(WriteOutcome {
                deleted: 0,
                written,
            });
        }

        let mut last = self.ensure_header(table, sheet, &request.header).await?;
        let mut deleted = 0;
        if let Some(key) = request.key.as_ref().filter(|key| !key.is_empty()) {
            if last >= 2 {
                let existing = table
                    .read_rows(sheet, 2, last, request.header.len())
                    .await?;
                let matched: Vec<usize> = existing
                    .iter()
                    .enumerate()
                    .filter(|(_, row)| key_matches(key, row))
                    .map(|(offset, _)| offset + 2)
                    .collect();
                // Bottom-up so earlier row numbers stay valid.
                for (first, count) in contiguous_runs(&matched).into_iter().rev() {
                    table.delete_rows(sheet, first, count).await?;
                    deleted += count;
                }
                last -= deleted;
            }
        }
        if deleted > 0 {
            info!(target: "reports.sink", sheet, rows = deleted, "existing rows deleted");
        }

        if !rows.is_empty() {
            table.write_rows(sheet, last + 1, rows).await?;
        }
        info!(target: "reports.sink", sheet, rows = written, "rows appended");
        Ok(WriteOutcome { deleted, written })
    }
}

/// Sorted row numbers grouped into `(first, count)` runs.
pub fn contiguous_runs(rows: &[usize]) -> Vec<(usize, usize)> {
    let mut runs: Vec<(usize, usize)> = Vec::new();
    for &row in rows {
        match runs.last_mut() {
            Some((first, count)) if *first + *count == row => *count += 1,
            _ => runs.push((row, 1)),
        }
    }
    runs
}

fn normalize_row(row: &[Cell]) -> Vec<String> {
    row.iter().map(normalize_cell).collect()
}

/// The destination spreadsheet parses comma decimals.
pub fn normalize_cell(cell: &Cell) -> String {
    match cell {
        Cell::Null => String::new(),
        Cell::Number(value) => value.to_string().replace('.', ","),
        Cell::Text(text) if is_decimal(text) => text.replace('.', ","),
        Cell::Text(text) => text.clone(),
    }
}

fn is_decimal(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    match digits.split_once('.') {
        Some((whole, frac)) => {
            !whole.is_empty()
                && !frac.is_empty()
                && whole.bytes().all(|b| b.is_ascii_digit())
                && frac.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}
