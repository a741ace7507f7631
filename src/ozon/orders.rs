//! `ozon orders`: FBO postings for a day or a date range.

use crate::{
    join::JoinError,
    models::{Cell, KeyPredicate, Table},
    period::PeriodWindow,
    pipeline::ReportOutput,
};

pub const STORE_COLUMN: &str = "Store";

/// Acceptance timestamp of the posting; the sheet upsert ranges over its date part.
pub const ORDER_DATE_COLUMN: &str = "Принят в обработку";

/// Prefixes `Store` and keys the sheet upsert on the store plus the window's date range.
pub fn build_output(
    report: Table,
    store: &str,
    store_name: &str,
    window: PeriodWindow,
) -> Result<ReportOutput, JoinError> {
    let date_index = report.column_index(ORDER_DATE_COLUMN).ok_or_else(|| JoinError::MissingColumn {
        side: "base",
        column: ORDER_DATE_COLUMN.to_string(),
    })?;
    let table = report.prepend_columns(&[(STORE_COLUMN, Cell::from(store_name))]);
    let key = KeyPredicate::default()
        .exact(0, store_name)
        .date_range(date_index + 1, window.start(), window.end());
    Ok(ReportOutput {
        table,
        file_name: format!("ozon-{store}-orders-{}.csv", window.file_label()),
        sheet_name: format!("ozon-{store}-orders"),
        key,
    })
}
