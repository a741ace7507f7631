use crate::{
    api::MarketplaceApi,
    codec::TabularCodec,
    config::ConfigError,
    join::JoinError,
    models::{KeyPredicate, SinkWriteRequest, Table},
    ozon::{self, PostingsReportEndpoints},
    period::PeriodWindow,
    report::PollPolicy,
    runtime::RuntimeEnv,
    sink::{SinkError, TabularSink},
    wb::{self, StockHistoryEndpoints},
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use std::{fmt, future::Future, sync::Arc, time::Instant};
use thiserror::Error;
use tracing::{info, warn};

/// A report feature as named on the command line (`<marketplace> <feature>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    WbStocks,
    WbFunnel,
    OzonOrders,
    OzonStocks,
}

impl Feature {
    pub fn resolve(marketplace: &str, feature: &str) -> Result<Self, ConfigError> {
        match (
            marketplace.trim().to_ascii_lowercase().as_str(),
            feature.trim().to_ascii_lowercase().as_str(),
        ) {
            ("wb", "stocks") => Ok(Self::WbStocks),
            ("wb", "funnel") => Ok(Self::WbFunnel),
            ("ozon", "orders") => Ok(Self::OzonOrders),
            ("ozon", "stocks") => Ok(Self::OzonStocks),
            _ => Err(ConfigError::UnknownFeature {
                marketplace: marketplace.to_string(),
                feature: feature.to_string(),
            }),
        }
    }

    pub fn marketplace(self) -> &'static str {
        match self {
            Self::WbStocks | Self::WbFunnel => "wb",
            Self::OzonOrders | Self::OzonStocks => "ozon",
        }
    }

    /// Window used when the command line gives no dates; `today` is the Moscow calendar day.
    ///
    /// Reports cover finished days and end yesterday. The stock snapshot is dated today.
    pub fn default_window(self, today: NaiveDate) -> PeriodWindow {
        let yesterday = today - Duration::days(1);
        match self {
            Self::WbStocks => PeriodWindow::trailing(yesterday, wb::stocks::BASE_DAYS),
            Self::WbFunnel | Self::OzonOrders => PeriodWindow::single(yesterday),
            Self::OzonStocks => PeriodWindow::single(today),
        }
    }

    /// Delimiter of the local output file; matches what the marketplace cabinet exports.
    pub fn file_codec(self) -> TabularCodec {
        match self {
            Self::WbStocks | Self::WbFunnel => TabularCodec::CSV,
            Self::OzonOrders | Self::OzonStocks => TabularCodec::SEMICOLON,
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.marketplace())?;
        f.write_str(match self {
            Self::WbStocks | Self::OzonStocks => "stocks",
            Self::WbFunnel => "funnel",
            Self::OzonOrders => "orders",
        })
    }
}

#[derive(Debug, Clone)]
pub struct FeatureRequest {
    pub feature: Feature,
    pub store: String,
    pub store_name: String,
    pub window: PeriodWindow,
}

/// Adapted rows plus where they go: `file_name` for the file sink, `sheet_name` + `key` for the
/// spreadsheet upsert.
#[derive(Debug, Clone)]
pub struct ReportOutput {
    pub table: Table,
    pub file_name: String,
    pub sheet_name: String,
    pub key: KeyPredicate,
}

#[derive(Debug, Serialize, Clone)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct RunSummary {
    pub feature: Feature,
    pub store: String,
    pub window: PeriodWindow,
    pub runtime: &'static str,
    /// `false` when the report came back without rows and nothing was written.
    pub has_data: bool,
    pub rows_deleted: usize,
    pub rows_written: usize,
    pub stages: Vec<StageReport>,
}

#[derive(Clone)]
pub struct Pipeline {
    runtime: RuntimeEnv,
    api: MarketplaceApi,
    poll: PollPolicy,
    sink: Arc<dyn TabularSink>,
}

impl Pipeline {
    pub fn new(runtime: RuntimeEnv, api: MarketplaceApi, sink: Arc<dyn TabularSink>) -> Self {
        Self {
            runtime,
            api,
            poll: PollPolicy::default(),
            sink,
        }
    }

    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub async fn run(&self, request: &FeatureRequest) -> Result<RunSummary, PipelineError> {
        info!(
            target: "reports.pipeline",
            feature = %request.feature,
            store = %request.store,
            window = %request.window,
            runtime = self.runtime.as_str(),
            "run started"
        );
        self.sink
            .check_available()
            .map_err(|err| PipelineError::sink("check_sink", err))?;
        let mut stages = Vec::new();

        let output = match request.feature {
            Feature::WbStocks => self.wb_stocks(request, &mut stages).await?,
            Feature::WbFunnel => self.wb_funnel(request, &mut stages).await?,
            Feature::OzonOrders => self.ozon_orders(request, &mut stages).await?,
            Feature::OzonStocks => self.ozon_stocks(request, &mut stages).await?,
        };

        let mut summary = RunSummary {
            feature: request.feature,
            store: request.store.clone(),
            window: request.window,
            runtime: self.runtime.as_str(),
            has_data: false,
            rows_deleted: 0,
            rows_written: 0,
            stages: Vec::new(),
        };

        let Some(output) = output else {
            info!(
                target: "reports.pipeline",
                feature = %request.feature,
                store = %request.store,
                window = %request.window,
                "no data for this run; nothing written"
            );
            summary.stages = stages;
            return Ok(summary);
        };

        let write = self.sink_request(output);
        let outcome = self
            .capture_stage("write_sink", &mut stages, {
                let sink = self.sink.clone();
                async move {
                    let table_name = write.table_name.clone();
                    let outcome = sink
                        .write(write)
                        .await
                        .map_err(|err| PipelineError::sink("write_sink", err))?;
                    crate::metrics::rows_written(&table_name, outcome.deleted, outcome.written);
                    Ok(StageOutcome::new(
                        outcome,
                        json!({
                            "sink": sink.name(),
                            "table": table_name,
                            "deleted": outcome.deleted,
                            "written": outcome.written,
                        }),
                    ))
                }
            })
            .await?;

        summary.has_data = true;
        summary.rows_deleted = outcome.deleted;
        summary.rows_written = outcome.written;
        summary.stages = stages;
        info!(
            target: "reports.pipeline",
            feature = %request.feature,
            store = %request.store,
            deleted = outcome.deleted,
            written = outcome.written,
            "run finished"
        );
        Ok(summary)
    }

    /// Local runs overwrite a per-period file; spreadsheet runs upsert by the feature key.
    fn sink_request(&self, output: ReportOutput) -> SinkWriteRequest {
        match self.runtime {
            RuntimeEnv::Local => SinkWriteRequest::overwrite(output.file_name, output.table),
            RuntimeEnv::Sheets => {
                SinkWriteRequest::append(output.sheet_name, output.table).with_key(output.key)
            }
        }
    }

    async fn wb_stocks(
        &self,
        request: &FeatureRequest,
        stages: &mut Vec<StageReport>,
    ) -> Result<Option<ReportOutput>, PipelineError> {
        let base_window = request.window;
        let enrich_window = wb::stocks::enrich_window(base_window);

        let (base, enrich) = self
            .capture_stage("acquire_report", stages, async {
                let (base, enrich) = self
                    .api
                    .orchestrator(Arc::new(StockHistoryEndpoints), self.poll)
                    .acquire_pair(base_window, enrich_window)
                    .await
                    .map_err(|err| PipelineError::upstream("acquire_report", err))?;
                let output = json!({
                    "base_window": base_window,
                    "base_rows": base.len(),
                    "enrich_window": enrich_window,
                    "enrich_rows": enrich.len(),
                });
                Ok(StageOutcome::new((base, enrich), output))
            })
            .await?;

        if base.is_empty() {
            return Ok(None);
        }
        if enrich.is_empty() {
            warn!(
                target: "reports.pipeline",
                window = %enrich_window,
                "enrichment report is empty; order columns stay blank"
            );
        }

        let output = self
            .capture_stage("join_periods", stages, async {
                let joined = wb::stocks::join_periods(&base, base_window, &enrich, enrich_window)
                    .map_err(|err| PipelineError::join("join_periods", err))?;
                let output = wb::stocks::build_output(
                    joined,
                    &request.store,
                    &request.store_name,
                    base_window,
                );
                let summary = json!({
                    "rows": output.table.len(),
                    "columns": output.table.header.len(),
                });
                Ok(StageOutcome::new(output, summary))
            })
            .await?;
        Ok(Some(output))
    }

    async fn ozon_orders(
        &self,
        request: &FeatureRequest,
        stages: &mut Vec<StageReport>,
    ) -> Result<Option<ReportOutput>, PipelineError> {
        let window = request.window;
        let report = self
            .capture_stage("acquire_report", stages, async {
                let report = self
                    .api
                    .orchestrator(Arc::new(PostingsReportEndpoints), self.poll)
                    .acquire_report(window)
                    .await
                    .map_err(|err| PipelineError::upstream("acquire_report", err))?;
                let output = json!({ "window": window, "rows": report.len() });
                Ok(StageOutcome::new(report, output))
            })
            .await?;

        if report.is_empty() {
            return Ok(None);
        }

        let output = self
            .capture_stage("adapt_rows", stages, async {
                let output = ozon::orders::build_output(
                    report,
                    &request.store,
                    &request.store_name,
                    window,
                )
                .map_err(|err| PipelineError::join("adapt_rows", err))?;
                let summary = json!({ "rows": output.table.len() });
                Ok(StageOutcome::new(output, summary))
            })
            .await?;
        Ok(Some(output))
    }

    async fn wb_funnel(
        &self,
        request: &FeatureRequest,
        stages: &mut Vec<StageReport>,
    ) -> Result<Option<ReportOutput>, PipelineError> {
        let window = request.window;
        let products = self
            .capture_stage("fetch_products", stages, async {
                let products = wb::funnel::fetch_products(&self.api, window)
                    .await
                    .map_err(|err| PipelineError::upstream("fetch_products", err))?;
                let output = json!({ "window": window, "products": products.len() });
                Ok(StageOutcome::new(products, output))
            })
            .await?;

        if products.is_empty() {
            return Ok(None);
        }

        let output = self
            .capture_stage("adapt_rows", stages, async {
                let output =
                    wb::funnel::build_output(&products, &request.store, &request.store_name, window);
                let summary = json!({ "rows": output.table.len() });
                Ok(StageOutcome::new(output, summary))
            })
            .await?;
        Ok(Some(output))
    }

    async fn ozon_stocks(
        &self,
        request: &FeatureRequest,
        stages: &mut Vec<StageReport>,
    ) -> Result<Option<ReportOutput>, PipelineError> {
        let skus = self
            .capture_stage("fetch_products", stages, async {
                let products = ozon::stocks::fetch_products(&self.api)
                    .await
                    .map_err(|err| PipelineError::upstream("fetch_products", err))?;
                let skus = ozon::stocks::unique_skus(&products);
                let output = json!({ "products": products.len(), "skus": skus.len() });
                Ok(StageOutcome::new(skus, output))
            })
            .await?;

        if skus.is_empty() {
            return Ok(None);
        }

        let items = self
            .capture_stage("fetch_stocks", stages, async {
                let items = ozon::stocks::fetch_stocks(&self.api, &skus)
                    .await
                    .map_err(|err| PipelineError::upstream("fetch_stocks", err))?;
                let output = json!({ "skus": skus.len(), "rows": items.len() });
                Ok(StageOutcome::new(items, output))
            })
            .await?;

        if items.is_empty() {
            return Ok(None);
        }

        let output = self
            .capture_stage("adapt_rows", stages, async {
                let output = ozon::stocks::build_output(
                    &items,
                    &request.store,
                    &request.store_name,
                    request.window,
                );
                let summary = json!({ "rows": output.table.len() });
                Ok(StageOutcome::new(output, summary))
            })
            .await?;
        Ok(Some(output))
    }

    async fn capture_stage<T, Fut>(
        &self,
        name: &'static str,
        stages: &mut Vec<StageReport>,
        fut: Fut,
    ) -> Result<T, PipelineError>
    where
        Fut: Future<Output = Result<StageOutcome<T>, PipelineError>>,
    {
        let started = Instant::now();
        let outcome = fut.await?;
        let elapsed_ms = started.elapsed().as_millis();
        crate::metrics::stage_elapsed(name, elapsed_ms);
        stages.push(StageReport::new(name, elapsed_ms, outcome.output));
        Ok(outcome.value)
    }
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
    kind: PipelineErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    Upstream,
    Sink,
    Internal,
}

impl PipelineError {
    fn upstream(stage: &'static str, err: impl fmt::Display) -> Self {
        Self {
            stage,
            message: err.to_string(),
            kind: PipelineErrorKind::Upstream,
        }
    }

    fn sink(stage: &'static str, err: SinkError) -> Self {
        let kind = match err {
            SinkError::Shape(_) => PipelineErrorKind::Internal,
            _ => PipelineErrorKind::Sink,
        };
        Self {
            stage,
            message: err.to_string(),
            kind,
        }
    }

    /// A report missing the columns the feature joins or keys on is a remote format change.
    fn join(stage: &'static str, err: JoinError) -> Self {
        Self {
            stage,
            message: err.to_string(),
            kind: PipelineErrorKind::Upstream,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

#[derive(Debug)]
pub struct StageOutcome<T> {
    pub value: T,
    pub output: Value,
}

impl<T> StageOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}
