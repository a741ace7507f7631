//! Credentials and endpoints, resolved from the process environment (`.env` is loaded in `main`).

use crate::{host::sheets::DEFAULT_BASE_URL as SHEETS_DEFAULT_BASE_URL, http::RequestConfig};
use once_cell::sync::Lazy;
use std::env;
use thiserror::Error;

pub static WB_ANALYTICS_BASE_URL: Lazy<String> = Lazy::new(|| {
    env::var("WB_ANALYTICS_BASE_URL")
        .unwrap_or_else(|_| "https://seller-analytics-api.wildberries.ru".to_string())
});

pub static OZON_BASE_URL: Lazy<String> =
    Lazy::new(|| env::var("OZON_BASE_URL").unwrap_or_else(|_| "https://api-seller.ozon.ru".to_string()));

pub static GOOGLE_SHEETS_BASE_URL: Lazy<String> = Lazy::new(|| {
    env::var("GOOGLE_SHEETS_BASE_URL").unwrap_or_else(|_| SHEETS_DEFAULT_BASE_URL.to_string())
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    MissingVariable(String),
    #[error("environment variable {name} has an invalid value: {message}")]
    InvalidValue { name: String, message: String },
    #[error("unknown feature `{feature}` for marketplace `{marketplace}`")]
    UnknownFeature {
        marketplace: String,
        feature: String,
    },
}

/// Variable lookup; the process environment in production, a map in tests.
pub trait EnvSource {
    fn get(&self, name: &str) -> Option<String>;

    fn require(&self, name: &str) -> Result<String, ConfigError> {
        self.get(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::MissingVariable(name.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        env::var(name).ok()
    }
}

/// `povar-na-rayone` → `POVAR_NA_RAYONE`.
pub fn store_env_key(store: &str) -> String {
    store
        .trim()
        .chars()
        .map(|ch| match ch {
            '-' | ' ' | '.' => '_',
            ch => ch.to_ascii_uppercase(),
        })
        .collect()
}

/// Display name written into the `Store` column.
pub fn store_display_name(source: &dyn EnvSource, store: &str) -> String {
    source
        .get(&format!("STORE_{}_NAME", store_env_key(store)))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| store.to_string())
}

pub fn wb_request_config(
    source: &dyn EnvSource,
    base_url: &str,
    store: &str,
) -> Result<RequestConfig, ConfigError> {
    let token = source.require(&format!("WB_{}_TOKEN", store_env_key(store)))?;
    Ok(RequestConfig::new(base_url, format!("wb:{store}")).with_auth_header("Authorization", token))
}

pub fn ozon_request_config(
    source: &dyn EnvSource,
    base_url: &str,
    store: &str,
) -> Result<RequestConfig, ConfigError> {
    let key = store_env_key(store);
    let client_id = source.require(&format!("OZON_{key}_CLIENT_ID"))?;
    let api_key = source.require(&format!("OZON_{key}_API_KEY"))?;
    Ok(RequestConfig::new(base_url, format!("ozon:{store}"))
        .with_auth_header("Client-Id", client_id)
        .with_auth_header("Api-Key", api_key))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetsConfig {
    pub base_url: String,
    pub spreadsheet_id: String,
    pub token: String,
}

impl SheetsConfig {
    /// `None` when no spreadsheet is configured; the spreadsheet sink then reports itself
    /// unavailable instead of failing here.
    pub fn from_source(source: &dyn EnvSource, base_url: &str) -> Option<Self> {
        let spreadsheet_id = source.require("SPREADSHEET_ID").ok()?;
        let token = source.require("GOOGLE_SHEETS_TOKEN").ok()?;
        Some(Self {
            base_url: base_url.to_string(),
            spreadsheet_id,
            token,
        })
    }
}

pub fn output_dir(source: &dyn EnvSource) -> String {
    source
        .get("REPORTS_OUTPUT_DIR")
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "data/output".to_string())
}
