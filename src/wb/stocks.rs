//! `wb stocks`: weekly stock history enriched with 28-day order totals.

use crate::{
    join::{JoinError, JoinSpec, join_by_key},
    models::{Cell, KeyPredicate, Table},
    period::{DATE_FORMAT, PeriodWindow},
    pipeline::ReportOutput,
};

pub const BASE_DAYS: u32 = 7;
pub const ENRICH_DAYS: u32 = 28;

pub const KEY_COLUMNS: [&str; 3] = ["NmID", "ChrtID", "OfficeName"];
pub const VALUE_COLUMNS: [&str; 2] = ["OrdersCount", "OrdersSum"];

pub const STORE_COLUMN: &str = "Store";
pub const DATE_COLUMN: &str = "Date";

/// The enrichment window: same end date, [`ENRICH_DAYS`] long.
pub fn enrich_window(base: PeriodWindow) -> PeriodWindow {
    PeriodWindow::trailing(base.end(), ENRICH_DAYS)
}

pub fn join_periods(
    base: &Table,
    base_window: PeriodWindow,
    enrich: &Table,
    enrich_window: PeriodWindow,
) -> Result<Table, JoinError> {
    let base_tag = format!(" ({}d)", base_window.days());
    let enrich_tag = format!(" ({}d)", enrich_window.days());
    join_by_key(
        base,
        enrich,
        &JoinSpec {
            key_columns: &KEY_COLUMNS,
            value_columns: &VALUE_COLUMNS,
            base_tag: &base_tag,
            enrich_tag: &enrich_tag,
        },
    )
}

/// Prefixes `Store` and `Date` (window end) and keys the sheet upsert on that pair.
///
/// The date is matched as a date, not as text: sheets tend to display it as `DD.MM.YYYY`.
pub fn build_output(joined: Table, store: &str, store_name: &str, window: PeriodWindow) -> ReportOutput {
    let date = window.end().format(DATE_FORMAT).to_string();
    let table = joined.prepend_columns(&[
        (STORE_COLUMN, Cell::from(store_name)),
        (DATE_COLUMN, Cell::from(date.as_str())),
    ]);
    let key = KeyPredicate::default()
        .exact(0, store_name)
        .date_range(1, window.end(), window.end());
    ReportOutput {
        table,
        file_name: format!(
            "wb-{store}-stocks-{}--{}.csv",
            window.start().format(DATE_FORMAT),
            window.end().format(DATE_FORMAT)
        ),
        sheet_name: format!("wb-{store}-stocks"),
        key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::SinkWriteRequest,
        sink::{SheetTable, SpreadsheetSink, TabularSink, key_matches, sheet::memory::MemorySheet},
    };
    use chrono::NaiveDate;
    use std::sync::Arc;

    const HEADER: [&str; 6] = ["VendorCode", "NmID", "ChrtID", "OfficeName", "OrdersCount", "OrdersSum"];

    fn table(rows: &[&[&str]]) -> Table {
        Table::new(
            HEADER.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|v| Cell::from(*v)).collect())
                .collect(),
        )
    }

    fn week() -> PeriodWindow {
        PeriodWindow::trailing(NaiveDate::from_ymd_opt(2026, 1, 28).expect("date"), BASE_DAYS)
    }

    #[test]
    fn week_rows_carry_month_orders() {
        let base = table(&[
            &["A1", "100", "5", "Koledino", "2", "200"],
            &["A2", "101", "6", "Kazan", "0", "0"],
        ]);
        let month = table(&[&["A1", "100", "5", "Koledino", "9", "900"]]);

        let joined = join_periods(&base, week(), &month, enrich_window(week())).expect("join");

        assert_eq!(
            joined.header[4..],
            [
                "OrdersCount (7d)",
                "OrdersSum (7d)",
                "OrdersCount (28d)",
                "OrdersSum (28d)"
            ]
        );
        assert_eq!(joined.rows[0][6], Cell::from("9"));
        assert_eq!(joined.rows[0][7], Cell::from("900"));
        assert_eq!(joined.rows[1][6], Cell::empty());
    }

    #[test]
    fn output_is_keyed_by_store_and_window_end() {
        let base = table(&[&["A1", "100", "5", "Koledino", "2", "200"]]);
        let joined = join_periods(&base, week(), &table(&[]), enrich_window(week())).expect("join");
        let output = build_output(joined, "main", "Main Shop", week());

        assert_eq!(output.table.header[..2], ["Store", "Date"]);
        assert_eq!(output.table.rows[0][1], Cell::from("2026-01-28"));
        assert_eq!(output.file_name, "wb-main-stocks-2026-01-22--2026-01-28.csv");
        assert_eq!(output.sheet_name, "wb-main-stocks");

        let same = vec!["Main Shop".to_string(), "2026-01-28".into()];
        let displayed = vec!["Main Shop".to_string(), "28.01.2026".into()];
        let other_day = vec!["Main Shop".to_string(), "2026-01-27".into()];
        let other_store = vec!["Outlet".to_string(), "2026-01-28".into()];
        assert!(key_matches(&output.key, &same));
        assert!(key_matches(&output.key, &displayed));
        assert!(!key_matches(&output.key, &other_day));
        assert!(!key_matches(&output.key, &other_store));
    }

    #[tokio::test]
    async fn rewrite_replaces_rows_the_sheet_shows_in_local_format() {
        let window = PeriodWindow::trailing(NaiveDate::from_ymd_opt(2026, 2, 8).expect("date"), BASE_DAYS);
        let base = table(&[&["A1", "100", "5", "Koledino", "2", "200"]]);
        let joined = join_periods(&base, window, &table(&[]), enrich_window(window)).expect("join");
        let output = build_output(joined, "main", "Main", window);

        let mut existing = vec![output.table.header.clone()];
        existing.push(vec!["Main".to_string(), "08.02.2026".into(), "100".into()]);
        let memory = Arc::new(MemorySheet::default());
        memory
            .sheets
            .lock()
            .unwrap()
            .insert(output.sheet_name.clone(), existing);
        let sink = SpreadsheetSink::new(Some(memory.clone() as Arc<dyn SheetTable>));

        let outcome = sink
            .write(SinkWriteRequest::append(output.sheet_name.clone(), output.table).with_key(output.key))
            .await
            .expect("write");

        assert_eq!(outcome.deleted, 1);
        let rows = memory.rows("wb-main-stocks");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][..2], ["Main", "2026-02-08"]);
    }
}
