//! [`HttpClient`] over the spreadsheet host's URL-fetch primitive.
//!
//! The primitive takes a flat options object, never raises on HTTP status ("mute HTTP
//! exceptions"), and refuses responses above a size cap. [`HostFetchClient`] adapts a prepared
//! request to that shape so both runtimes share the same request rules.

use crate::http::{HttpClient, HttpError, HttpResponse, PreparedRequest, build_client};
use async_trait::async_trait;
use reqwest::{Client, Method};
use std::sync::Arc;
use tracing::{debug, error};

pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub payload: Option<String>,
    pub content_type: Option<String>,
    pub mute_http_exceptions: bool,
}

impl FetchOptions {
    fn from_prepared(request: &PreparedRequest) -> Self {
        let mut content_type = None;
        let headers = request
            .headers
            .iter()
            .filter_map(|(name, value)| {
                let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
                if *name == reqwest::header::CONTENT_TYPE {
                    content_type = Some(value);
                    None
                } else {
                    Some((name.as_str().to_string(), value))
                }
            })
            .collect();
        Self {
            method: request.method.as_str().to_ascii_lowercase(),
            headers,
            payload: request.body.clone(),
            content_type,
            mute_http_exceptions: true,
        }
    }
}

/// The host's network primitive. Errors are plain messages, as the host reports them.
#[async_trait]
pub trait UrlFetch: Send + Sync {
    async fn fetch(&self, url: &str, options: FetchOptions) -> Result<HttpResponse, String>;
}

/// Host fetch served by reqwest with the host's response size cap.
#[derive(Debug, Clone)]
pub struct ReqwestUrlFetch {
    http: Client,
    max_response_bytes: usize,
}

impl ReqwestUrlFetch {
    pub fn new(max_response_bytes: usize) -> Self {
        Self {
            http: build_client(),
            max_response_bytes,
        }
    }

    pub fn from_env() -> Self {
        let max = std::env::var("HOST_FETCH_MAX_RESPONSE_BYTES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_MAX_RESPONSE_BYTES);
        Self::new(max)
    }
}

#[async_trait]
impl UrlFetch for ReqwestUrlFetch {
    async fn fetch(&self, url: &str, options: FetchOptions) -> Result<HttpResponse, String> {
        let method = Method::from_bytes(options.method.to_ascii_uppercase().as_bytes())
            .map_err(|err| err.to_string())?;
        let mut builder = self.http.request(method, url);
        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(content_type) = &options.content_type {
            builder = builder.header(reqwest::header::CONTENT_TYPE, content_type.as_str());
        }
        if let Some(payload) = options.payload {
            builder = builder.body(payload);
        }

        let mut response = builder.send().await.map_err(|err| err.to_string())?;
        let status = response.status().as_u16();
        if !options.mute_http_exceptions && !response.status().is_success() {
            return Err(format!("request failed with status {status}"));
        }
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|err| err.to_string())? {
            if body.len() + chunk.len() > self.max_response_bytes {
                return Err(format!(
                    "response exceeds {} bytes",
                    self.max_response_bytes
                ));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(HttpResponse { status, body })
    }
}

#[derive(Clone)]
pub struct HostFetchClient {
    fetch: Arc<dyn UrlFetch>,
}

impl HostFetchClient {
    pub fn new(fetch: Arc<dyn UrlFetch>) -> Self {
        Self { fetch }
    }

    pub fn from_env() -> Self {
        Self::new(Arc::new(ReqwestUrlFetch::from_env()))
    }
}

#[async_trait]
impl HttpClient for HostFetchClient {
    async fn execute(&self, request: PreparedRequest) -> Result<HttpResponse, HttpError> {
        debug!(target: "reports.http", prefix = %request.log_prefix, method = %request.method, url = %request.url, "host fetch");
        let options = FetchOptions::from_prepared(&request);
        self.fetch
            .fetch(&request.url, options)
            .await
            .map_err(|message| {
                error!(target: "reports.http", prefix = %request.log_prefix, error = %message, "host fetch error");
                HttpError::Transport {
                    prefix: request.log_prefix.clone(),
                    message,
                }
            })
    }
}
