//! Left outer join of two report periods on a composite key.

use crate::models::{Cell, Row, Table, column_index, row_key};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

const KEY_SEPARATOR: &str = "\t";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JoinError {
    #[error("{side} report has no `{column}` column")]
    MissingColumn { side: &'static str, column: String },
}

/// Which columns to match on and which to carry over, plus the period tags used in headers.
#[derive(Debug, Clone)]
pub struct JoinSpec<'a> {
    pub key_columns: &'a [&'a str],
    pub value_columns: &'a [&'a str],
    /// Suffix for base columns that share a name with a value column, e.g. ` (7d)`.
    pub base_tag: &'a str,
    /// Suffix for appended enrichment columns, e.g. ` (28d)`.
    pub enrich_tag: &'a str,
}

pub fn join_by_key(base: &Table, enrich: &Table, spec: &JoinSpec<'_>) -> Result<Table, JoinError> {
    let base_keys = indices(&base.header, spec.key_columns, "base")?;
    let enrich_keys = indices(&enrich.header, spec.key_columns, "enrichment")?;
    let enrich_values = indices(&enrich.header, spec.value_columns, "enrichment")?;

    // First occurrence wins for duplicate enrichment keys.
    let mut lookup: HashMap<String, &Row> = HashMap::with_capacity(enrich.rows.len());
    for row in &enrich.rows {
        lookup
            .entry(row_key(row, &enrich_keys).join(KEY_SEPARATOR))
            .or_insert(row);
    }

    let mut header: Vec<String> = base
        .header
        .iter()
        .map(|name| {
            if spec.value_columns.contains(&name.trim()) {
                format!("{}{}", name.trim(), spec.base_tag)
            } else {
                name.clone()
            }
        })
        .collect();
    header.extend(
        spec.value_columns
            .iter()
            .map(|name| format!("{name}{}", spec.enrich_tag)),
    );

    let mut matched = 0usize;
    let rows = base
        .rows
        .iter()
        .map(|row| {
            let key = row_key(row, &base_keys).join(KEY_SEPARATOR);
            let mut joined = row.clone();
            match lookup.get(&key) {
                Some(found) => {
                    matched += 1;
                    joined.extend(
                        enrich_values
                            .iter()
                            .map(|idx| found.get(*idx).cloned().unwrap_or_else(Cell::empty)),
                    );
                }
                None => joined.extend(enrich_values.iter().map(|_| Cell::empty())),
            }
            joined
        })
        .collect();

    debug!(
        target: "reports.join",
        base_rows = base.rows.len(),
        enrich_rows = enrich.rows.len(),
        matched,
        "periods joined"
    );
    Ok(Table::new(header, rows))
}

fn indices(header: &[String], names: &[&str], side: &'static str) -> Result<Vec<usize>, JoinError> {
    names
        .iter()
        .map(|name| {
            column_index(header, name).ok_or_else(|| JoinError::MissingColumn {
                side,
                column: name.to_string(),
            })
        })
        .collect()
}
