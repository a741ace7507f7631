use clap::ValueEnum;
use std::{fmt, str::FromStr};

/// Where the process runs. Resolved once in `main` and passed down; nothing below re-detects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RuntimeEnv {
    /// Direct HTTP, CSV files on local disk.
    #[default]
    Local,
    /// Host fetch primitive, spreadsheet sink.
    Sheets,
}

impl RuntimeEnv {
    /// CLI flag first, then `REPORTS_RUNTIME`, then [`RuntimeEnv::Local`].
    pub fn resolve(flag: Option<RuntimeEnv>) -> Self {
        flag.or_else(|| {
            std::env::var("REPORTS_RUNTIME")
                .ok()
                .and_then(|v| v.parse().ok())
        })
        .unwrap_or_default()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Sheets => "sheets",
        }
    }
}

impl FromStr for RuntimeEnv {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" | "node" => Ok(Self::Local),
            "sheets" | "gas" => Ok(Self::Sheets),
            other => Err(format!("unknown runtime `{other}`")),
        }
    }
}

impl fmt::Display for RuntimeEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
