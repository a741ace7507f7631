use crate::{
    codec::TabularCodec,
    http::RequestInit,
    period::{DATE_FORMAT, PeriodWindow},
    report::{ArtifactFormat, ReportEndpoints, ReportError, ReportJob, StatusReport, string_field},
};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

pub const CREATE_PATH: &str = "/v1/report/postings/create";
pub const INFO_PATH: &str = "/v1/report/info";

#[derive(Debug, Serialize)]
struct CreatePostingsReport {
    filter: PostingsFilter,
    language: &'static str,
}

#[derive(Debug, Serialize)]
struct PostingsFilter {
    processed_at_from: String,
    processed_at_to: String,
    delivery_schema: Vec<&'static str>,
    sku: Vec<i64>,
    cancel_reason_id: Vec<i64>,
    offer_id: String,
    status_alias: Vec<String>,
    statuses: Vec<i64>,
    title: String,
}

/// Whole UTC days covering the window.
fn postings_filter(window: PeriodWindow) -> PostingsFilter {
    PostingsFilter {
        processed_at_from: format!("{}T00:00:00.000Z", window.start().format(DATE_FORMAT)),
        processed_at_to: format!("{}T23:59:59.999Z", window.end().format(DATE_FORMAT)),
        delivery_schema: vec!["fbo"],
        sku: Vec::new(),
        cancel_reason_id: Vec::new(),
        offer_id: String::new(),
        status_alias: Vec::new(),
        statuses: Vec::new(),
        title: String::new(),
    }
}

/// Seller API postings export. The server assigns the job code and serves the CSV by URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostingsReportEndpoints;

impl ReportEndpoints for PostingsReportEndpoints {
    fn name(&self) -> &'static str {
        "ozon-postings"
    }

    fn create_request(&self, job: &ReportJob) -> Result<(String, RequestInit), ReportError> {
        let body = CreatePostingsReport {
            filter: postings_filter(job.window()),
            language: "DEFAULT",
        };
        let init = RequestInit::get()
            .with_method(Method::POST)
            .with_json(&body, "ozon")?;
        Ok((CREATE_PATH.to_string(), init))
    }

    fn remote_id(&self, _job: &ReportJob, response: &Value) -> Result<String, ReportError> {
        response
            .get("result")
            .and_then(|result| string_field(result, "code"))
            .ok_or_else(|| ReportError::Protocol(format!("create response without result.code: {response}")))
    }

    fn status_request(&self, remote_id: &str) -> Result<(String, RequestInit), ReportError> {
        let init = RequestInit::get()
            .with_method(Method::POST)
            .with_json(&serde_json::json!({ "code": remote_id }), "ozon")?;
        Ok((INFO_PATH.to_string(), init))
    }

    fn parse_status(&self, _remote_id: &str, response: &Value) -> Result<StatusReport, ReportError> {
        let result = response
            .get("result")
            .ok_or_else(|| ReportError::Protocol(format!("info response without result: {response}")))?;
        let status = string_field(result, "status")
            .ok_or_else(|| ReportError::Protocol(format!("info response without status: {response}")))?;
        Ok(StatusReport::from_raw(
            status,
            string_field(result, "file"),
            string_field(result, "error"),
        ))
    }

    fn artifact_ref(&self, remote_id: &str, status: &StatusReport) -> Result<String, ReportError> {
        status.file_url.clone().ok_or_else(|| {
            ReportError::Protocol(format!("report {remote_id} is ready but has no file URL"))
        })
    }

    fn artifact_format(&self) -> ArtifactFormat {
        ArtifactFormat::PlainText
    }

    fn codec(&self) -> TabularCodec {
        TabularCodec::SEMICOLON
    }
}
