use crate::{
    clock::Sleeper,
    http::{HttpClient, HttpError, HttpResponse, RequestConfig, RequestInit},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{fmt, time::Duration};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_env() -> Self {
        let max_attempts = std::env::var("HTTP_RETRY_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(3);
        let delay_ms = std::env::var("HTTP_RETRY_DELAY_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(2000);
        Self {
            max_attempts,
            delay: Duration::from_millis(delay_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(2000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFailureKind {
    /// 401: the credential is missing or wrong.
    Unauthorized,
    /// 403: the credential is valid but lacks access to the endpoint.
    Forbidden,
    Client,
    Server,
}

impl ApiFailureKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            500..=599 => Self::Server,
            _ => Self::Client,
        }
    }
}

impl fmt::Display for ApiFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Unauthorized => "unauthorized, check the API token",
            Self::Forbidden => "forbidden, the token has no access to this endpoint",
            Self::Client => "request rejected",
            Self::Server => "server error",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Error)]
#[error("{prefix} API error {status} on {path} ({kind}): {body}")]
pub struct ApiError {
    pub prefix: String,
    pub status: u16,
    pub path: String,
    pub body: String,
    pub kind: ApiFailureKind,
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("{prefix} unexpected response shape on {path}: {message}")]
    Decode {
        prefix: String,
        path: String,
        message: String,
    },
}

impl RequestError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api(err) => Some(err.status),
            _ => None,
        }
    }
}

/// Best-effort JSON; anything unparseable comes back as a raw string.
pub fn parse_body(text: &str) -> Value {
    if text.is_empty() {
        return Value::String(String::new());
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Sends the request, retrying 5xx responses with a fixed delay. Returns the raw 2xx response.
pub async fn send_with_retry(
    client: &dyn HttpClient,
    sleeper: &dyn Sleeper,
    config: &RequestConfig,
    path: &str,
    init: RequestInit,
    policy: RetryPolicy,
) -> Result<HttpResponse, RequestError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let response = client.request(config, path, init.clone()).await?;
        if response.is_success() {
            return Ok(response);
        }

        let status = response.status;
        if (500..600).contains(&status) && attempt < max_attempts {
            info!(
                target: "reports.http",
                prefix = %config.log_prefix,
                path,
                status,
                attempt,
                max_attempts,
                delay_ms = policy.delay.as_millis() as u64,
                "transient failure, retrying"
            );
            sleeper.sleep(policy.delay).await;
            attempt += 1;
            continue;
        }

        return Err(api_error(config, path, &response).into());
    }
}

/// [`send_with_retry`] plus best-effort body parsing.
pub async fn request_with_retry(
    client: &dyn HttpClient,
    sleeper: &dyn Sleeper,
    config: &RequestConfig,
    path: &str,
    init: RequestInit,
    policy: RetryPolicy,
) -> Result<Value, RequestError> {
    let response = send_with_retry(client, sleeper, config, path, init, policy).await?;
    Ok(parse_body(&response.text()))
}

pub async fn request_json<T: DeserializeOwned>(
    client: &dyn HttpClient,
    sleeper: &dyn Sleeper,
    config: &RequestConfig,
    path: &str,
    init: RequestInit,
    policy: RetryPolicy,
) -> Result<T, RequestError> {
    let value = request_with_retry(client, sleeper, config, path, init, policy).await?;
    serde_json::from_value(value).map_err(|err| RequestError::Decode {
        prefix: config.log_prefix.clone(),
        path: path.to_string(),
        message: err.to_string(),
    })
}

fn api_error(config: &RequestConfig, path: &str, response: &HttpResponse) -> ApiError {
    let kind = ApiFailureKind::from_status(response.status);
    let body = match parse_body(&response.text()) {
        Value::String(text) => text,
        other => other.to_string(),
    };
    match kind {
        ApiFailureKind::Unauthorized => {
            error!(target: "reports.http", prefix = %config.log_prefix, path, "401 Unauthorized, check the token")
        }
        ApiFailureKind::Forbidden => {
            error!(target: "reports.http", prefix = %config.log_prefix, path, "403 Forbidden, no access")
        }
        _ => {
            warn!(target: "reports.http", prefix = %config.log_prefix, path, status = response.status, body = %body, "error response")
        }
    }
    ApiError {
        prefix: config.log_prefix.clone(),
        status: response.status,
        path: path.to_string(),
        body,
        kind,
    }
}
