mod api;
mod archive;
mod clock;
mod codec;
mod config;
mod host;
mod http;
mod join;
mod metrics;
mod models;
mod ozon;
mod period;
mod pipeline;
mod report;
mod retry;
mod runtime;
mod sink;
mod wb;

use api::MarketplaceApi;
use clap::Parser;
use clock::{Sleeper, TokioSleeper};
use config::{ConfigError, ProcessEnv, SheetsConfig};
use eyre::WrapErr;
use host::{GoogleSheetsTable, HostFetchClient};
use http::{HttpClient, ReqwestClient};
use pipeline::{Feature, FeatureRequest, Pipeline};
use report::PollPolicy;
use retry::RetryPolicy;
use runtime::RuntimeEnv;
use sink::{FileSink, SheetTable, SpreadsheetSink, TabularSink};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

/// Pull a marketplace report for one store and write it to a file or a spreadsheet.
#[derive(Debug, Parser)]
#[command(name = "seller-reports", version)]
struct Cli {
    /// `wb` or `ozon`
    marketplace: String,
    /// `stocks` or `funnel` (wb), `orders` or `stocks` (ozon)
    feature: String,
    /// Store key; credentials are read from `<MARKETPLACE>_<STORE>_*` variables
    store: String,
    /// First day, YYYY-MM-DD
    since: Option<String>,
    /// Last day, YYYY-MM-DD
    to: Option<String>,
    /// Overrides `REPORTS_RUNTIME`
    #[arg(long, value_enum)]
    runtime: Option<RuntimeEnv>,
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        error!(target: "reports.cli", "run failed: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let runtime = RuntimeEnv::resolve(cli.runtime);
    let env = ProcessEnv;

    let feature = Feature::resolve(&cli.marketplace, &cli.feature)?;
    let window = period::resolve(
        cli.since.as_deref(),
        cli.to.as_deref(),
        feature.default_window(period::today_moscow()),
    )
    .map_err(|err| ConfigError::InvalidValue {
        name: "since/to".to_string(),
        message: err.to_string(),
    })?;

    let request_config = match feature {
        Feature::WbStocks | Feature::WbFunnel => {
            config::wb_request_config(&env, &config::WB_ANALYTICS_BASE_URL, &cli.store)?
        }
        Feature::OzonOrders | Feature::OzonStocks => {
            config::ozon_request_config(&env, &config::OZON_BASE_URL, &cli.store)?
        }
    };

    let client: Arc<dyn HttpClient> = match runtime {
        RuntimeEnv::Local => Arc::new(ReqwestClient::new()),
        RuntimeEnv::Sheets => Arc::new(HostFetchClient::from_env()),
    };
    let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);
    let retry = RetryPolicy::from_env();

    let sink: Arc<dyn TabularSink> = match runtime {
        RuntimeEnv::Local => Arc::new(FileSink::new(config::output_dir(&env), feature.file_codec())),
        RuntimeEnv::Sheets => {
            let table = SheetsConfig::from_source(&env, &config::GOOGLE_SHEETS_BASE_URL).map(
                |sheets| -> Arc<dyn SheetTable> {
                    Arc::new(
                        GoogleSheetsTable::new(
                            client.clone(),
                            sleeper.clone(),
                            &sheets.base_url,
                            &sheets.spreadsheet_id,
                            &sheets.token,
                        )
                        .with_retry(retry),
                    )
                },
            );
            Arc::new(SpreadsheetSink::new(table))
        }
    };

    let api = MarketplaceApi::new(client, sleeper, request_config).with_retry(retry);
    let pipeline = Pipeline::new(runtime, api, sink).with_poll(PollPolicy::from_env());

    let request = FeatureRequest {
        feature,
        store: cli.store.clone(),
        store_name: config::store_display_name(&env, &cli.store),
        window,
    };
    let summary = match pipeline.run(&request).await {
        Ok(summary) => summary,
        Err(err) => {
            error!(
                target: "reports.pipeline",
                stage = err.stage(),
                kind = ?err.kind(),
                detail = err.detail(),
                "pipeline failed"
            );
            return Err(err).wrap_err_with(|| format!("{feature} for store `{}`", cli.store));
        }
    };

    info!(
        target: "reports.cli",
        marketplace = feature.marketplace(),
        feature = %feature,
        store = %summary.store,
        window = %summary.window,
        runtime = summary.runtime,
        has_data = summary.has_data,
        deleted = summary.rows_deleted,
        written = summary.rows_written,
        stages = summary.stages.len(),
        "done"
    );
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
