//! Google Sheets REST backend for [`SheetTable`].

use crate::{
    clock::Sleeper,
    http::{HttpClient, RequestBody, RequestConfig, RequestInit},
    retry::{RequestError, RetryPolicy, request_json, request_with_retry},
    sink::{SheetTable, SinkError},
};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

pub struct GoogleSheetsTable {
    client: Arc<dyn HttpClient>,
    sleeper: Arc<dyn Sleeper>,
    config: RequestConfig,
    retry: RetryPolicy,
}

impl GoogleSheetsTable {
    pub fn new(
        client: Arc<dyn HttpClient>,
        sleeper: Arc<dyn Sleeper>,
        base_url: &str,
        spreadsheet_id: &str,
        token: &str,
    ) -> Self {
        let config = RequestConfig::new(
            format!("{}/{}", base_url.trim_end_matches('/'), spreadsheet_id),
            "sheets",
        )
        .with_auth_header("Authorization", format!("Bearer {token}"));
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

    /// `suffix` is appended verbatim to the spreadsheet URL (`:batchUpdate`, `/values/..`).
    async fn call(&self, suffix: &str, init: RequestInit) -> Result<Value, SinkError> {
        let url = format!("{}{suffix}", self.config.base_url);
        request_with_retry(
            self.client.as_ref(),
            self.sleeper.as_ref(),
            &self.config,
            &url,
            init,
            self.retry,
        )
        .await
        .map_err(backend)
    }

    async fn post_json(&self, suffix: &str, body: Value) -> Result<Value, SinkError> {
        self.call(suffix, RequestInit::post(RequestBody::Json(body))).await
    }

    async fn sheet_id(&self, sheet: &str) -> Result<Option<i64>, SinkError> {
        let url = format!(
            "{}?fields=sheets.properties(sheetId,title)",
            self.config.base_url
        );
        let meta: SpreadsheetMeta = request_json(
            self.client.as_ref(),
            self.sleeper.as_ref(),
            &self.config,
            &url,
            RequestInit::get(),
            self.retry,
        )
        .await
        .map_err(backend)?;
        Ok(meta
            .sheets
            .into_iter()
            .find(|entry| entry.properties.title == sheet)
            .map(|entry| entry.properties.sheet_id))
    }

    async fn values(&self, range: &str) -> Result<Vec<Vec<String>>, SinkError> {
        let path = format!("/values/{}?majorDimension=ROWS", urlencoding::encode(range));
        let response = self.call(&path, RequestInit::get()).await?;
        Ok(response
            .get("values")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .map(|row| {
                        row.as_array()
                            .map(|cells| cells.iter().map(display_value).collect())
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl SheetTable for GoogleSheetsTable {
    async fn ensure_sheet(&self, sheet: &str) -> Result<bool, SinkError> {
        if self.sheet_id(sheet).await?.is_some() {
            return Ok(false);
        }
        self.post_json(
            ":batchUpdate",
            json!({"requests": [{"addSheet": {"properties": {"title": sheet}}}]}),
        )
        .await?;
        Ok(true)
    }

    async fn last_row(&self, sheet: &str) -> Result<usize, SinkError> {
        // The values API omits trailing empty rows.
        Ok(self.values(&quote_sheet(sheet)).await?.len())
    }

    async fn read_rows(
        &self,
        sheet: &str,
        first: usize,
        last: usize,
        width: usize,
    ) -> Result<Vec<Vec<String>>, SinkError> {
        if last < first {
            return Ok(Vec::new());
        }
        let range = format!(
            "{}!A{first}:{}{last}",
            quote_sheet(sheet),
            column_letter(width.max(1))
        );
        let mut rows = self.values(&range).await?;
        rows.resize(last + 1 - first, Vec::new());
        for row in &mut rows {
            row.resize(width.max(row.len()), String::new());
        }
        Ok(rows)
    }

    async fn write_rows(
        &self,
        sheet: &str,
        first: usize,
        rows: Vec<Vec<String>>,
    ) -> Result<(), SinkError> {
        if rows.is_empty() {
            return Ok(());
        }
        let range = format!("{}!A{first}", quote_sheet(sheet));
        let path = format!(
            "/values/{}?valueInputOption=USER_ENTERED",
            urlencoding::encode(&range)
        );
        let count = rows.len();
        let init = RequestInit::get()
            .with_method(Method::PUT)
            .with_json(
                &json!({"range": range, "majorDimension": "ROWS", "values": rows}),
                &self.config.log_prefix,
            )
            .map_err(|err| backend(err.into()))?;
        self.call(&path, init).await?;
        debug!(target: "reports.sink", sheet, first, rows = count, "rows written");
        Ok(())
    }

    async fn delete_rows(&self, sheet: &str, first: usize, count: usize) -> Result<(), SinkError> {
        if count == 0 {
            return Ok(());
        }
        let sheet_id = self
            .sheet_id(sheet)
            .await?
            .ok_or_else(|| SinkError::Backend(format!("sheet `{sheet}` not found")))?;
        self.post_json(
            ":batchUpdate",
            json!({"requests": [{"deleteDimension": {"range": {
                "sheetId": sheet_id,
                "dimension": "ROWS",
                "startIndex": first - 1,
                "endIndex": first - 1 + count,
            }}}]}),
        )
        .await?;
        Ok(())
    }

    async fn clear(&self, sheet: &str) -> Result<(), SinkError> {
        let path = format!("/values/{}:clear", urlencoding::encode(&quote_sheet(sheet)));
        self.post_json(&path, json!({})).await?;
        Ok(())
    }
}

fn backend(err: RequestError) -> SinkError {
    SinkError::Backend(err.to_string())
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn quote_sheet(sheet: &str) -> String {
    format!("'{}'", sheet.replace('\'', "''"))
}

/// 1 → `A`, 26 → `Z`, 27 → `AA`.
pub fn column_letter(mut index: usize) -> String {
    let mut letters = Vec::new();
    while index > 0 {
        let rem = (index - 1) % 26;
        letters.push(b'A' + rem as u8);
        index = (index - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}
