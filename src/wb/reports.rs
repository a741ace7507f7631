use crate::{
    codec::TabularCodec,
    http::RequestInit,
    period::{DATE_FORMAT, PeriodWindow},
    report::{ArtifactFormat, ReportEndpoints, ReportError, ReportJob, StatusReport, string_field},
};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

pub const DOWNLOADS_PATH: &str = "/api/v2/nm-report/downloads";
pub const STOCK_HISTORY_REPORT: &str = "STOCK_HISTORY_REPORT_CSV";

const AVAILABILITY_FILTERS: [&str; 6] = [
    "deficient",
    "actual",
    "balanced",
    "nonActual",
    "nonLiquid",
    "invalidData",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateReport<'a> {
    id: &'a str,
    report_type: &'static str,
    params: StockHistoryParams,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StockHistoryParams {
    current_period: Period,
    stock_type: &'static str,
    skip_deleted_nm: bool,
    availability_filters: [&'static str; 6],
    order_by: OrderBy,
}

#[derive(Debug, Serialize)]
struct Period {
    start: String,
    end: String,
}

#[derive(Debug, Serialize)]
struct OrderBy {
    field: &'static str,
    mode: &'static str,
}

fn stock_history_params(window: PeriodWindow) -> StockHistoryParams {
    StockHistoryParams {
        current_period: Period {
            start: window.start().format(DATE_FORMAT).to_string(),
            end: window.end().format(DATE_FORMAT).to_string(),
        },
        stock_type: "wb",
        skip_deleted_nm: false,
        availability_filters: AVAILABILITY_FILTERS,
        order_by: OrderBy {
            field: "ordersCount",
            mode: "asc",
        },
    }
}

/// Seller analytics CSV download jobs; the caller-generated id is the remote id.
#[derive(Debug, Clone, Copy, Default)]
pub struct StockHistoryEndpoints;

impl ReportEndpoints for StockHistoryEndpoints {
    fn name(&self) -> &'static str {
        "wb-stock-history"
    }

    fn create_request(&self, job: &ReportJob) -> Result<(String, RequestInit), ReportError> {
        let body = CreateReport {
            id: job.id(),
            report_type: STOCK_HISTORY_REPORT,
            params: stock_history_params(job.window()),
        };
        let init = RequestInit::get()
            .with_method(Method::POST)
            .with_json(&body, "wb")?;
        Ok((DOWNLOADS_PATH.to_string(), init))
    }

    fn status_request(&self, remote_id: &str) -> Result<(String, RequestInit), ReportError> {
        let path = format!(
            "{DOWNLOADS_PATH}?filter[downloadIds]={}",
            urlencoding::encode(remote_id)
        );
        Ok((path, RequestInit::get()))
    }

    fn parse_status(&self, remote_id: &str, response: &Value) -> Result<StatusReport, ReportError> {
        // Either `{"data": [{id, status, ..}]}` or a bare status object.
        let entry = match response.get("data") {
            Some(Value::Array(items)) => items
                .iter()
                .find(|item| string_field(item, "id").as_deref() == Some(remote_id)),
            Some(object @ Value::Object(_)) => Some(object),
            _ => Some(response),
        };
        let Some(entry) = entry else {
            // Freshly created jobs can be missing from the listing for a moment.
            return Ok(StatusReport::from_raw("pending", None, None));
        };
        let status = string_field(entry, "status").ok_or_else(|| {
            ReportError::Protocol(format!("status response without `status`: {response}"))
        })?;
        Ok(StatusReport::from_raw(
            status,
            string_field(entry, "fileUrl"),
            string_field(entry, "error").or_else(|| string_field(entry, "errorText")),
        ))
    }

    fn artifact_ref(&self, remote_id: &str, _status: &StatusReport) -> Result<String, ReportError> {
        Ok(format!("{DOWNLOADS_PATH}/file/{}", urlencoding::encode(remote_id)))
    }

    fn artifact_format(&self) -> ArtifactFormat {
        ArtifactFormat::Zip
    }

    fn codec(&self) -> TabularCodec {
        TabularCodec::CSV
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::JobStatus;
    use chrono::NaiveDate;
    use serde_json::json;

    fn job() -> ReportJob {
        let end = NaiveDate::from_ymd_opt(2026, 1, 28).expect("date");
        ReportJob::new(PeriodWindow::trailing(end, 7))
    }

    #[test]
    fn create_body_embeds_period_and_filters() {
        let job = job();
        let (path, init) = StockHistoryEndpoints.create_request(&job).expect("create");
        assert_eq!(path, "/api/v2/nm-report/downloads");
        assert_eq!(init.method, Method::POST);
        let Some(crate::http::RequestBody::Json(body)) = init.body else {
            panic!("json body expected");
        };
        assert_eq!(body["id"], job.id());
        assert_eq!(body["reportType"], "STOCK_HISTORY_REPORT_CSV");
        assert_eq!(
            body["params"]["currentPeriod"],
            json!({"start": "2026-01-22", "end": "2026-01-28"})
        );
        assert_eq!(body["params"]["stockType"], "wb");
        assert_eq!(body["params"]["skipDeletedNm"], false);
        assert_eq!(body["params"]["availabilityFilters"].as_array().map(Vec::len), Some(6));
        assert_eq!(body["params"]["orderBy"], json!({"field": "ordersCount", "mode": "asc"}));
    }

    #[test]
    fn status_is_read_from_data_listing() {
        let report = StockHistoryEndpoints
            .parse_status(
                "b",
                &json!({"data": [{"id": "a", "status": "FAILED"}, {"id": "b", "status": "SUCCESS"}]}),
            )
            .expect("status");
        assert_eq!(report.status, Some(JobStatus::Ready));
    }

    #[test]
    fn flat_status_object_is_accepted() {
        let report = StockHistoryEndpoints
            .parse_status("x", &json!({"id": "x", "status": "error", "error": "bad filter"}))
            .expect("status");
        assert_eq!(report.status, Some(JobStatus::Error));
        assert_eq!(report.error.as_deref(), Some("bad filter"));
    }

    #[test]
    fn listing_of_other_jobs_counts_as_pending() {
        let report = StockHistoryEndpoints
            .parse_status(
                "mine",
                &json!({"data": [{"id": "someone-else", "status": "SUCCESS"}]}),
            )
            .expect("status");
        assert_eq!(report.status, Some(JobStatus::Pending));
    }

    #[test]
    fn empty_listing_counts_as_pending() {
        let report = StockHistoryEndpoints
            .parse_status("x", &json!({"data": []}))
            .expect("status");
        assert_eq!(report.status, Some(JobStatus::Pending));
    }

    #[test]
    fn download_path_uses_job_id() {
        let report = StatusReport::from_raw("success", None, None);
        assert_eq!(
            StockHistoryEndpoints.artifact_ref("id-1", &report).expect("ref"),
            "/api/v2/nm-report/downloads/file/id-1"
        );
        let (path, _) = StockHistoryEndpoints.status_request("id-1").expect("status");
        assert_eq!(path, "/api/v2/nm-report/downloads?filter[downloadIds]=id-1");
    }
}
