//! One marketplace account: transport, credentials and retry policy bundled for direct calls.

use crate::{
    clock::Sleeper,
    http::{HttpClient, RequestConfig, RequestInit},
    report::{PollPolicy, ReportEndpoints, ReportOrchestrator},
    retry::{RequestError, RetryPolicy, request_json},
};
use reqwest::Method;
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;

#[derive(Clone)]
pub struct MarketplaceApi {
    client: Arc<dyn HttpClient>,
    sleeper: Arc<dyn Sleeper>,
    config: RequestConfig,
    retry: RetryPolicy,
}

impl MarketplaceApi {
    pub fn new(client: Arc<dyn HttpClient>, sleeper: Arc<dyn Sleeper>, config: RequestConfig) -> Self {
        Self {
            client,
            sleeper,
            config,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// POSTs `body` as JSON and decodes the 2xx response into `T`.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, RequestError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let init = RequestInit::get()
            .with_method(Method::POST)
            .with_json(body, &self.config.log_prefix)?;
        request_json(
            self.client.as_ref(),
            self.sleeper.as_ref(),
            &self.config,
            path,
            init,
            self.retry,
        )
        .await
    }

    /// Create/poll/download driver for an asynchronous report on this account.
    pub fn orchestrator(&self, endpoints: Arc<dyn ReportEndpoints>, poll: PollPolicy) -> ReportOrchestrator {
        ReportOrchestrator::new(
            self.client.clone(),
            self.sleeper.clone(),
            self.config.clone(),
            endpoints,
        )
        .with_retry(self.retry)
        .with_poll(poll)
    }
}
