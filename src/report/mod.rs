//! Remote report jobs: create, poll until ready, download, decode.
//!
//! Marketplaces plug in through [`ReportEndpoints`]; the orchestration is the same for every one.

pub mod job;
pub mod orchestrator;

pub use job::{JobStatus, ReportJob};
pub use orchestrator::ReportOrchestrator;

use crate::{
    archive::ArchiveError,
    codec::TabularCodec,
    http::{HttpError, RequestInit},
    retry::RequestError,
};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("report job {job_id} failed remotely: {message}")]
    ReportGeneration { job_id: String, message: String },
    #[error("report job {job_id} not ready after {attempts} status checks")]
    ReportTimeout { job_id: String, attempts: u32 },
    #[error("artifact download failed with status {status}")]
    Download { status: u16, body: String },
    #[error(transparent)]
    Artifact(#[from] ArchiveError),
    #[error("artifact could not be decoded: {0}")]
    Decode(String),
    #[error("unexpected report API response: {0}")]
    Protocol(String),
}

impl From<HttpError> for ReportError {
    fn from(err: HttpError) -> Self {
        Self::Request(RequestError::Http(err))
    }
}

/// Parsed status check.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    /// `None` when the remote word is outside the known vocabulary.
    pub status: Option<JobStatus>,
    pub raw_status: String,
    pub file_url: Option<String>,
    pub error: Option<String>,
}

impl StatusReport {
    pub fn from_raw(
        raw_status: impl Into<String>,
        file_url: Option<String>,
        error: Option<String>,
    ) -> Self {
        let raw_status = raw_status.into();
        Self {
            status: JobStatus::from_remote(&raw_status),
            raw_status,
            file_url,
            error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    /// Archive holding one delimited-text entry.
    Zip,
    PlainText,
}

/// Marketplace-specific wire details of one report type.
pub trait ReportEndpoints: Send + Sync {
    fn name(&self) -> &'static str;

    /// Path and request that create `job` remotely.
    fn create_request(&self, job: &ReportJob) -> Result<(String, RequestInit), ReportError>;

    /// Remote id from the create response. Defaults to the caller-generated id.
    fn remote_id(&self, job: &ReportJob, _response: &Value) -> Result<String, ReportError> {
        Ok(job.id().to_string())
    }

    fn status_request(&self, remote_id: &str) -> Result<(String, RequestInit), ReportError>;

    fn parse_status(&self, remote_id: &str, response: &Value) -> Result<StatusReport, ReportError>;

    /// Path or absolute URL of a ready artifact.
    fn artifact_ref(&self, remote_id: &str, status: &StatusReport) -> Result<String, ReportError>;

    fn artifact_format(&self) -> ArtifactFormat;

    fn codec(&self) -> TabularCodec;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    /// Minimum spacing between two job-creation calls.
    pub create_gap: Duration,
}

impl PollPolicy {
    pub fn from_env() -> Self {
        let interval = std::env::var("REPORT_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(5);
        let max_attempts = std::env::var("REPORT_POLL_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(5);
        let create_gap = std::env::var("REPORT_CREATE_GAP_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(20);
        Self {
            interval: Duration::from_secs(interval),
            max_attempts,
            create_gap: Duration::from_secs(create_gap),
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 5,
            create_gap: Duration::from_secs(20),
        }
    }
}

/// Reads a string field that may also arrive as a number.
pub(crate) fn string_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
