use crate::period::PeriodWindow;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Ready,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Error)
    }

    /// Maps a remote status word onto the local lifecycle. Unknown words yield `None`.
    pub fn from_remote(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "waiting" | "new" | "pending" | "retry" | "queued" => Some(Self::Pending),
            "processing" | "in_progress" => Some(Self::Processing),
            "success" | "ready" | "done" => Some(Self::Ready),
            "failed" | "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// One remote report-generation job. Never reused across invocations.
#[derive(Debug, Clone, Serialize)]
pub struct ReportJob {
    id: String,
    remote_id: Option<String>,
    window: PeriodWindow,
    status: JobStatus,
    artifact_ref: Option<String>,
}

impl ReportJob {
    pub fn new(window: PeriodWindow) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            remote_id: None,
            window,
            status: JobStatus::Pending,
            artifact_ref: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Id the remote API knows the job by; the caller id until the create call says otherwise.
    pub fn remote_id(&self) -> &str {
        self.remote_id.as_deref().unwrap_or(&self.id)
    }

    pub fn set_remote_id(&mut self, remote_id: impl Into<String>) {
        self.remote_id = Some(remote_id.into());
    }

    pub fn window(&self) -> PeriodWindow {
        self.window
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn artifact_ref(&self) -> Option<&str> {
        self.artifact_ref.as_deref()
    }

    /// Moves the job forward. Regressions (e.g. a stale `Pending` after `Processing`) and any
    /// move out of a terminal state are ignored; returns whether the status changed.
    pub fn advance(&mut self, next: JobStatus) -> bool {
        if self.status.is_terminal() || next <= self.status {
            if next < self.status {
                warn!(
                    target: "reports.job",
                    job_id = %self.id,
                    current = ?self.status,
                    reported = ?next,
                    "ignoring status regression"
                );
            }
            return false;
        }
        self.status = next;
        true
    }

    pub fn mark_ready(&mut self, artifact_ref: impl Into<String>) {
        self.advance(JobStatus::Ready);
        self.artifact_ref = Some(artifact_ref.into());
    }
}
