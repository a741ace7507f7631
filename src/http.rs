//! HTTP request contract shared by the direct client and the host fetch client.
//!
//! Both implementations receive a [`PreparedRequest`] built by [`prepare`], so path
//! normalization, header merging and body serialization behave identically. Neither raises on
//! non-2xx; classification is left to the caller.

use async_trait::async_trait;
use reqwest::{
    Client, Method,
    header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue},
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

pub fn build_client() -> Client {
    let timeout = std::env::var("HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(15);
    let connect = std::env::var("HTTP_CONNECT_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(5);
    Client::builder()
        .timeout(Duration::from_secs(timeout))
        .connect_timeout(Duration::from_secs(connect))
        .build()
        .unwrap_or_else(|_| Client::new())
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("{prefix} transport failed: {message}")]
    Transport { prefix: String, message: String },
    #[error("{prefix} body serialization failed: {message}")]
    Serialization { prefix: String, message: String },
    #[error("{prefix} invalid request: {message}")]
    InvalidRequest { prefix: String, message: String },
}

/// Per-API settings resolved by the caller: where to send requests and how to authenticate.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub base_url: String,
    pub auth_headers: Vec<(String, String)>,
    pub log_prefix: String,
}

impl RequestConfig {
    pub fn new(base_url: impl Into<String>, log_prefix: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_headers: Vec::new(),
            log_prefix: log_prefix.into(),
        }
    }

    pub fn with_auth_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth_headers.push((name.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Text(String),
    Json(serde_json::Value),
}

impl RequestBody {
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Self::Json)
    }
}

#[derive(Debug, Clone)]
pub struct RequestInit {
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl RequestInit {
    pub fn get() -> Self {
        Self {
            method: Method::GET,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(body: RequestBody) -> Self {
        Self {
            method: Method::POST,
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Serializes `value` as the JSON body. Failure is surfaced rather than coerced to a string.
    pub fn with_json<T: Serialize + ?Sized>(
        mut self,
        value: &T,
        log_prefix: &str,
    ) -> Result<Self, HttpError> {
        let body = RequestBody::json(value).map_err(|err| {
            error!(target: "reports.http", prefix = %log_prefix, error = %err, "json body serialization failed");
            HttpError::Serialization {
                prefix: log_prefix.to_string(),
                message: err.to_string(),
            }
        })?;
        self.body = Some(body);
        Ok(self)
    }
}

#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<String>,
    pub log_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub fn build_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base_url.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Applies the shared request rules: `/`-prefixed path, `Accept: application/json` then auth
/// headers then caller headers (caller wins), JSON body with a default content type.
pub fn prepare(
    config: &RequestConfig,
    path: &str,
    init: RequestInit,
) -> Result<PreparedRequest, HttpError> {
    let invalid = |message: String| HttpError::InvalidRequest {
        prefix: config.log_prefix.clone(),
        message,
    };

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    for (name, value) in config.auth_headers.iter().chain(init.headers.iter()) {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| invalid(format!("header name `{name}`: {err}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|err| invalid(format!("header `{}` value: {err}", name.as_str())))?;
        headers.insert(name, value);
    }

    let body = match init.body {
        None => None,
        Some(RequestBody::Text(text)) => Some(text),
        Some(RequestBody::Json(value)) => Some(serde_json::to_string(&value).map_err(|err| {
            HttpError::Serialization {
                prefix: config.log_prefix.clone(),
                message: err.to_string(),
            }
        })?),
    };
    if body.is_some() && !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }

    Ok(PreparedRequest {
        method: init.method,
        url: build_url(&config.base_url, path),
        headers,
        body,
        log_prefix: config.log_prefix.clone(),
    })
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends an already prepared request. Non-2xx responses are returned, not raised.
    async fn execute(&self, request: PreparedRequest) -> Result<HttpResponse, HttpError>;

    async fn request(
        &self,
        config: &RequestConfig,
        path: &str,
        init: RequestInit,
    ) -> Result<HttpResponse, HttpError> {
        let prepared = prepare(config, path, init)?;
        self.execute(prepared).await
    }
}

/// Talks to marketplace APIs directly.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    http: Client,
}

impl ReqwestClient {
    pub fn new() -> Self {
        Self {
            http: build_client(),
        }
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn execute(&self, request: PreparedRequest) -> Result<HttpResponse, HttpError> {
        debug!(target: "reports.http", prefix = %request.log_prefix, method = %request.method, url = %request.url, "request");
        let transport = |err: reqwest::Error| {
            error!(target: "reports.http", prefix = %request.log_prefix, error = %err, "fetch error");
            HttpError::Transport {
                prefix: request.log_prefix.clone(),
                message: err.to_string(),
            }
        };

        let mut builder = self
            .http
            .request(request.method.clone(), request.url.as_str())
            .headers(request.headers.clone());
        if let Some(body) = request.body.clone() {
            builder = builder.body(body);
        }
        let response = builder.send().await.map_err(transport)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(transport)?;
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}
