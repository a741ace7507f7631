use tracing::trace;

// Trace-based timings; a subscriber with `reports.metrics=trace` picks them up.

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target: "reports.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

pub fn rows_written(table: &str, deleted: usize, written: usize) {
    trace!(
        target: "reports.metrics",
        table = table,
        deleted = deleted as u64,
        written = written as u64,
        "rows_written"
    );
}
