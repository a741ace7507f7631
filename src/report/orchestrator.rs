use super::{ArtifactFormat, JobStatus, PollPolicy, ReportEndpoints, ReportError, ReportJob};
use crate::{
    archive,
    clock::Sleeper,
    http::{HttpClient, RequestConfig, RequestInit},
    models::Table,
    period::PeriodWindow,
    retry::{RetryPolicy, request_with_retry},
};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct ReportOrchestrator {
    client: Arc<dyn HttpClient>,
    sleeper: Arc<dyn Sleeper>,
    config: RequestConfig,
    endpoints: Arc<dyn ReportEndpoints>,
    retry: RetryPolicy,
    poll: PollPolicy,
}

impl ReportOrchestrator {
    pub fn new(
        client: Arc<dyn HttpClient>,
        sleeper: Arc<dyn Sleeper>,
        config: RequestConfig,
        endpoints: Arc<dyn ReportEndpoints>,
    ) -> Self {
        Self {
            client,
            sleeper,
            config,
            endpoints,
            retry: RetryPolicy::default(),
            poll: PollPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub async fn create_job(&self, window: PeriodWindow) -> Result<ReportJob, ReportError> {
        let mut job = ReportJob::new(window);
        let (path, init) = self.endpoints.create_request(&job)?;
        let response = request_with_retry(
            self.client.as_ref(),
            self.sleeper.as_ref(),
            &self.config,
            &path,
            init,
            self.retry,
        )
        .await?;
        let remote_id = self.endpoints.remote_id(&job, &response)?;
        job.set_remote_id(remote_id);
        info!(
            target: "reports.job",
            report = self.endpoints.name(),
            job_id = %job.id(),
            remote_id = %job.remote_id(),
            window = %window,
            "report job created"
        );
        Ok(job)
    }

    /// Sleeps one interval before every status check. Returns the artifact reference.
    pub async fn poll_until_ready(&self, job: &mut ReportJob) -> Result<String, ReportError> {
        let max_attempts = self.poll.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            self.sleeper.sleep(self.poll.interval).await;

            let (path, init) = self.endpoints.status_request(job.remote_id())?;
            let response = request_with_retry(
                self.client.as_ref(),
                self.sleeper.as_ref(),
                &self.config,
                &path,
                init,
                self.retry,
            )
            .await?;
            let report = self.endpoints.parse_status(job.remote_id(), &response)?;

            match report.status {
                Some(JobStatus::Ready) => {
                    let artifact = self.endpoints.artifact_ref(job.remote_id(), &report)?;
                    job.mark_ready(artifact.clone());
                    info!(target: "reports.job", job_id = %job.id(), attempt, "report ready");
                    return Ok(artifact);
                }
                Some(JobStatus::Error) => {
                    job.advance(JobStatus::Error);
                    let message = report
                        .error
                        .unwrap_or_else(|| format!("status `{}`", report.raw_status));
                    warn!(target: "reports.job", job_id = %job.id(), error = %message, "report generation failed");
                    return Err(ReportError::ReportGeneration {
                        job_id: job.remote_id().to_string(),
                        message,
                    });
                }
                Some(status) => {
                    job.advance(status);
                    debug!(
                        target: "reports.job",
                        job_id = %job.id(),
                        attempt,
                        max_attempts,
                        status = %report.raw_status,
                        "report not ready"
                    );
                }
                None => {
                    warn!(
                        target: "reports.job",
                        job_id = %job.id(),
                        attempt,
                        status = %report.raw_status,
                        "unknown report status, continuing to poll"
                    );
                }
            }
        }

        warn!(target: "reports.job", job_id = %job.id(), attempts = max_attempts, "report polling exhausted");
        Err(ReportError::ReportTimeout {
            job_id: job.remote_id().to_string(),
            attempts: max_attempts,
        })
    }

    /// Fetches the artifact once. Absolute URLs are fetched without the API auth headers.
    pub async fn download_artifact(&self, artifact_ref: &str) -> Result<Vec<u8>, ReportError> {
        let absolute = artifact_ref.starts_with("http://") || artifact_ref.starts_with("https://");
        let config = if absolute {
            RequestConfig::new("", self.config.log_prefix.clone())
        } else {
            self.config.clone()
        };
        let init = RequestInit::get().with_header("Accept", "*/*");
        let response = self.client.request(&config, artifact_ref, init).await?;
        if !response.is_success() {
            warn!(
                target: "reports.job",
                prefix = %self.config.log_prefix,
                status = response.status,
                "artifact download failed"
            );
            return Err(ReportError::Download {
                status: response.status,
                body: response.text(),
            });
        }
        debug!(target: "reports.job", bytes = response.body.len(), "artifact downloaded");
        Ok(response.body)
    }

    pub fn decode_artifact(&self, bytes: &[u8]) -> Result<Table, ReportError> {
        let text = match self.endpoints.artifact_format() {
            ArtifactFormat::Zip => archive::extract(bytes)?,
            ArtifactFormat::PlainText => String::from_utf8_lossy(bytes).into_owned(),
        };
        let table = self.endpoints.codec().decode_table(&text);
        if !table.header.is_empty() && table.header.iter().all(|name| name.is_empty()) {
            return Err(ReportError::Decode("artifact header line is blank".into()));
        }
        info!(
            target: "reports.job",
            report = self.endpoints.name(),
            rows = table.len(),
            columns = table.header.len(),
            "artifact decoded"
        );
        Ok(table)
    }

    /// create → poll → download → extract → decode.
    pub async fn acquire_report(&self, window: PeriodWindow) -> Result<Table, ReportError> {
        let mut job = self.create_job(window).await?;
        self.finish(&mut job).await
    }

    /// Acquires two windows concurrently. The second creation call waits for the first to
    /// complete plus the creation gap; status polls of both jobs overlap freely.
    pub async fn acquire_pair(
        &self,
        base: PeriodWindow,
        enrich: PeriodWindow,
    ) -> Result<(Table, Table), ReportError> {
        let (created_tx, created_rx) = oneshot::channel::<()>();

        let base_side = async move {
            let mut job = self.create_job(base).await?;
            let _ = created_tx.send(());
            self.finish(&mut job).await
        };

        let enrich_side = async move {
            if created_rx.await.is_err() {
                return Err(ReportError::Protocol(
                    "base report creation did not complete".into(),
                ));
            }
            debug!(
                target: "reports.job",
                gap_secs = self.poll.create_gap.as_secs(),
                "waiting before next report creation"
            );
            self.sleeper.sleep(self.poll.create_gap).await;
            let mut job = self.create_job(enrich).await?;
            self.finish(&mut job).await
        };

        tokio::try_join!(base_side, enrich_side)
    }

    async fn finish(&self, job: &mut ReportJob) -> Result<Table, ReportError> {
        let artifact = self.poll_until_ready(job).await?;
        let bytes = self.download_artifact(&artifact).await?;
        self.decode_artifact(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        archive::fixtures::zip_of,
        clock::recording::RecordingSleeper,
        codec::TabularCodec,
        http::scripted::RoutedClient,
        report::{StatusReport, string_field},
    };
    use chrono::NaiveDate;
    use serde_json::{Value, json};
    use std::time::Duration;

    struct FakeEndpoints {
        format: ArtifactFormat,
    }

    impl ReportEndpoints for FakeEndpoints {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn create_request(&self, job: &ReportJob) -> Result<(String, RequestInit), ReportError> {
            let init = RequestInit::get()
                .with_method(reqwest::Method::POST)
                .with_json(&json!({"id": job.id()}), "fake")?;
            Ok(("/create".into(), init))
        }

        fn remote_id(&self, _job: &ReportJob, response: &Value) -> Result<String, ReportError> {
            string_field(response, "id").ok_or_else(|| ReportError::Protocol("no id".into()))
        }

        fn status_request(&self, remote_id: &str) -> Result<(String, RequestInit), ReportError> {
            Ok((format!("/status/{remote_id}"), RequestInit::get()))
        }

        fn parse_status(&self, _remote_id: &str, response: &Value) -> Result<StatusReport, ReportError> {
            Ok(StatusReport::from_raw(
                string_field(response, "status").unwrap_or_default(),
                None,
                string_field(response, "error"),
            ))
        }

        fn artifact_ref(&self, remote_id: &str, _status: &StatusReport) -> Result<String, ReportError> {
            Ok(format!("/file/{remote_id}"))
        }

        fn artifact_format(&self) -> ArtifactFormat {
            self.format
        }

        fn codec(&self) -> TabularCodec {
            TabularCodec::CSV
        }
    }

    fn window() -> PeriodWindow {
        PeriodWindow::single(NaiveDate::from_ymd_opt(2026, 1, 1).expect("date"))
    }

    fn orchestrator(
        client: Arc<RoutedClient>,
        sleeper: Arc<RecordingSleeper>,
        format: ArtifactFormat,
    ) -> ReportOrchestrator {
        ReportOrchestrator::new(
            client,
            sleeper,
            RequestConfig::new("https://reports.test", "fake"),
            Arc::new(FakeEndpoints { format }),
        )
    }

    #[tokio::test]
    async fn returns_artifact_after_third_poll() {
        let client = Arc::new(RoutedClient::default());
        client
            .json("/create", json!({"id": "j1"}))
            .json("/status/j1", json!({"status": "PROCESSING"}))
            .json("/status/j1", json!({"status": "processing"}))
            .json("/status/j1", json!({"status": "SUCCESS"}));
        let sleeper = Arc::new(RecordingSleeper::default());
        let orchestrator = orchestrator(client.clone(), sleeper.clone(), ArtifactFormat::Zip);

        let mut job = orchestrator.create_job(window()).await.expect("create");
        let artifact = orchestrator.poll_until_ready(&mut job).await.expect("ready");

        assert_eq!(artifact, "/file/j1");
        assert_eq!(job.status(), JobStatus::Ready);
        assert_eq!(job.artifact_ref(), Some("/file/j1"));
        let polls = client.paths().iter().filter(|p| p.starts_with("/status")).count();
        assert_eq!(polls, 3);
        assert_eq!(sleeper.total(), Duration::from_secs(15));
    }

    #[tokio::test]
    async fn exhausted_polling_is_a_timeout() {
        let client = Arc::new(RoutedClient::default());
        client.json("/create", json!({"id": "j1"}));
        for _ in 0..5 {
            client.json("/status/j1", json!({"status": "processing"}));
        }
        let sleeper = Arc::new(RecordingSleeper::default());
        let orchestrator = orchestrator(client.clone(), sleeper.clone(), ArtifactFormat::Zip);

        let err = orchestrator.acquire_report(window()).await.expect_err("timeout");
        assert!(matches!(err, ReportError::ReportTimeout { attempts: 5, .. }));
        assert_eq!(sleeper.count(), 5);
    }

    #[tokio::test]
    async fn remote_failure_is_a_generation_error() {
        let client = Arc::new(RoutedClient::default());
        client
            .json("/create", json!({"id": "j1"}))
            .json("/status/j1", json!({"status": "FAILED", "error": "period too long"}));
        let sleeper = Arc::new(RecordingSleeper::default());
        let orchestrator = orchestrator(client, sleeper, ArtifactFormat::Zip);

        match orchestrator.acquire_report(window()).await {
            Err(ReportError::ReportGeneration { message, job_id }) => {
                assert_eq!(message, "period too long");
                assert_eq!(job_id, "j1");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_statuses_keep_polling() {
        let client = Arc::new(RoutedClient::default());
        client
            .json("/create", json!({"id": "j1"}))
            .json("/status/j1", json!({"status": "ARCHIVING"}))
            .json("/status/j1", json!({"status": "done"}))
            .route("/file/j1", 200, "a,b\n1,2\n");
        let sleeper = Arc::new(RecordingSleeper::default());
        let orchestrator = orchestrator(client, sleeper, ArtifactFormat::PlainText);

        let table = orchestrator.acquire_report(window()).await.expect("acquire");
        assert_eq!(table.header, vec!["a", "b"]);
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn download_failure_carries_status() {
        let client = Arc::new(RoutedClient::default());
        client
            .json("/create", json!({"id": "j1"}))
            .json("/status/j1", json!({"status": "success"}))
            .route("/file/j1", 404, "gone");
        let sleeper = Arc::new(RecordingSleeper::default());
        let orchestrator = orchestrator(client, sleeper, ArtifactFormat::Zip);

        let err = orchestrator.acquire_report(window()).await.expect_err("download");
        assert!(matches!(err, ReportError::Download { status: 404, .. }));
    }

    #[tokio::test]
    async fn zipped_artifact_is_extracted_and_decoded() {
        let client = Arc::new(RoutedClient::default());
        client
            .json("/create", json!({"id": "j1"}))
            .json("/status/j1", json!({"status": "success"}))
            .route(
                "/file/j1",
                200,
                zip_of(&[("meta.json", "{}"), ("report.csv", "NmID,Qty\n1,5\n2,7\n")]),
            );
        let sleeper = Arc::new(RecordingSleeper::default());
        let orchestrator = orchestrator(client, sleeper, ArtifactFormat::Zip);

        let table = orchestrator.acquire_report(window()).await.expect("acquire");
        assert_eq!(table.header, vec!["NmID", "Qty"]);
        assert_eq!(table.rows.len(), 2);
    }

    #[tokio::test]
    async fn pair_creation_is_sequenced_with_gap() {
        let client = Arc::new(RoutedClient::default());
        client
            .json("/create", json!({"id": "week"}))
            .json("/create", json!({"id": "month"}))
            .json("/status/week", json!({"status": "success"}))
            .json("/status/month", json!({"status": "processing"}))
            .json("/status/month", json!({"status": "success"}))
            .route("/file/week", 200, "k\nw\n")
            .route("/file/month", 200, "k\nm\n");
        let sleeper = Arc::new(RecordingSleeper::default());
        let orchestrator = orchestrator(client.clone(), sleeper.clone(), ArtifactFormat::PlainText);

        let day = NaiveDate::from_ymd_opt(2026, 1, 28).expect("date");
        let (week, month) = orchestrator
            .acquire_pair(PeriodWindow::trailing(day, 7), PeriodWindow::trailing(day, 28))
            .await
            .expect("pair");

        assert_eq!(week.rows[0][0].as_text(), "w");
        assert_eq!(month.rows[0][0].as_text(), "m");

        let paths = client.paths();
        let creates: Vec<usize> = paths
            .iter()
            .enumerate()
            .filter(|(_, p)| p.as_str() == "/create")
            .map(|(idx, _)| idx)
            .collect();
        assert_eq!(creates.len(), 2);
        assert_eq!(creates[0], 0);
        assert!(
            sleeper
                .slept
                .lock()
                .unwrap()
                .contains(&Duration::from_secs(20))
        );
    }

    #[tokio::test]
    async fn failed_base_creation_aborts_the_pair() {
        let client = Arc::new(RoutedClient::default());
        client.route("/create", 400, "{\"error\":\"bad\"}");
        let sleeper = Arc::new(RecordingSleeper::default());
        let orchestrator = orchestrator(client.clone(), sleeper, ArtifactFormat::PlainText);

        let err = orchestrator
            .acquire_pair(window(), window())
            .await
            .expect_err("base failure");
        assert!(matches!(err, ReportError::Request(_)));
        assert_eq!(client.paths(), vec!["/create"]);
    }
}
