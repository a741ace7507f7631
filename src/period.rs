use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

const MOSCOW_OFFSET_SECS: i64 = 3 * 3600;
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeriodError {
    #[error("period start {start} is after end {end}")]
    Inverted { start: NaiveDate, end: NaiveDate },
    #[error("invalid date `{0}`, expected YYYY-MM-DD")]
    InvalidDate(String),
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeriodWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl PeriodWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, PeriodError> {
        if start > end {
            return Err(PeriodError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn single(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    /// `days`-long window ending on `end` inclusive.
    pub fn trailing(end: NaiveDate, days: u32) -> Self {
        let span = i64::from(days.max(1)) - 1;
        Self {
            start: end - Duration::days(span),
            end,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn is_single_day(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// `2026-01-01` or `2026-01-01--2026-01-07`, used in artifact names.
    pub fn file_label(&self) -> String {
        if self.is_single_day() {
            self.start.format(DATE_FORMAT).to_string()
        } else {
            format!(
                "{}--{}",
                self.start.format(DATE_FORMAT),
                self.end.format(DATE_FORMAT)
            )
        }
    }
}

impl fmt::Display for PeriodWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}",
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT)
        )
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, PeriodError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| PeriodError::InvalidDate(value.to_string()))
}

/// Marketplace reporting days are Moscow calendar days.
pub fn today_moscow() -> NaiveDate {
    (Utc::now().naive_utc() + Duration::seconds(MOSCOW_OFFSET_SECS)).date()
}

/// Monday-based week number used by the seller cabinet.
///
/// Week 1 starts on the Monday on or before January 1st, except when the year opens on a Sunday:
/// then it starts on January 2nd and January 1st still belongs to the last week of the previous
/// year.
pub fn week_of_year(day: NaiveDate) -> u32 {
    let Some(jan1) = NaiveDate::from_ymd_opt(day.year(), 1, 1) else {
        return 1;
    };
    let first_monday = match jan1.weekday() {
        Weekday::Sun => jan1 + Duration::days(1),
        other => jan1 - Duration::days(i64::from(other.num_days_from_monday())),
    };
    if day < first_monday {
        return week_of_year(jan1 - Duration::days(1));
    }
    ((day - first_monday).num_days() / 7) as u32 + 1
}

/// Resolves the CLI `since`/`to` pair. A lone `since` is a single day; with neither, `fallback`
/// is used.
pub fn resolve(
    since: Option<&str>,
    to: Option<&str>,
    fallback: PeriodWindow,
) -> Result<PeriodWindow, PeriodError> {
    match (since, to) {
        (None, None) => Ok(fallback),
        (Some(since), None) => Ok(PeriodWindow::single(parse_date(since)?)),
        (None, Some(to)) => {
            let end = parse_date(to)?;
            Ok(PeriodWindow::trailing(end, fallback.days() as u32))
        }
        (Some(since), Some(to)) => PeriodWindow::new(parse_date(since)?, parse_date(to)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(value: &str) -> NaiveDate {
        parse_date(value).expect("date")
    }

    #[test]
    fn rejects_inverted_window() {
        assert_eq!(
            PeriodWindow::new(d("2026-01-05"), d("2026-01-01")),
            Err(PeriodError::Inverted {
                start: d("2026-01-05"),
                end: d("2026-01-01")
            })
        );
    }

    #[test]
    fn trailing_windows_share_the_end_date() {
        let week = PeriodWindow::trailing(d("2026-01-28"), 7);
        let month = PeriodWindow::trailing(week.end(), 28);
        assert_eq!(week.start(), d("2026-01-22"));
        assert_eq!(week.days(), 7);
        assert_eq!(month.start(), d("2026-01-01"));
        assert_eq!(month.end(), week.end());
    }

    #[test]
    fn resolve_prefers_explicit_dates() {
        let fallback = PeriodWindow::trailing(d("2026-03-10"), 7);
        assert_eq!(resolve(None, None, fallback).unwrap(), fallback);
        assert_eq!(
            resolve(Some("2026-02-01"), None, fallback).unwrap(),
            PeriodWindow::single(d("2026-02-01"))
        );
        assert_eq!(
            resolve(None, Some("2026-02-07"), fallback).unwrap(),
            PeriodWindow::trailing(d("2026-02-07"), 7)
        );
        assert!(resolve(Some("2026-02-07"), Some("2026-02-01"), fallback).is_err());
        assert!(matches!(
            resolve(Some("07.02.2026"), None, fallback),
            Err(PeriodError::InvalidDate(_))
        ));
    }

    #[test]
    fn file_label_collapses_single_day() {
        assert_eq!(PeriodWindow::single(d("2026-01-01")).file_label(), "2026-01-01");
        assert_eq!(
            PeriodWindow::new(d("2026-01-01"), d("2026-01-07")).unwrap().file_label(),
            "2026-01-01--2026-01-07"
        );
    }

    #[test]
    fn weeks_start_on_the_monday_around_new_year() {
        // 2026 opens on a Thursday: week 1 began on Monday 2025-12-29.
        assert_eq!(week_of_year(d("2026-01-01")), 1);
        assert_eq!(week_of_year(d("2026-01-04")), 1);
        assert_eq!(week_of_year(d("2026-01-05")), 2);
        assert_eq!(week_of_year(d("2026-02-08")), 6);
        // 2023 opens on a Sunday, which closes the last week of 2022.
        assert_eq!(week_of_year(d("2023-01-01")), 53);
        assert_eq!(week_of_year(d("2023-01-02")), 1);
        // 2024 opens on a Monday.
        assert_eq!(week_of_year(d("2024-01-07")), 1);
        assert_eq!(week_of_year(d("2024-01-08")), 2);
    }
}
