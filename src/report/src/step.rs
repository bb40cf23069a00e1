//! Step records shared by the reporter and the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one advancing unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Ok,
    Warn,
    Err,
    Skipped,
}

impl std::fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepOutcome::Ok => "ok",
            StepOutcome::Warn => "warn",
            StepOutcome::Err => "err",
            StepOutcome::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// One advancing unit of work with a human label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallStep {
    pub label: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<StepOutcome>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub detail: serde_json::Value,
}

impl InstallStep {
    pub fn begin(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            started_at: Utc::now(),
            finished_at: None,
            outcome: None,
            detail: serde_json::Value::Null,
        }
    }

    pub fn finish(mut self, outcome: StepOutcome, detail: serde_json::Value) -> Self {
        self.finished_at = Some(Utc::now());
        self.outcome = Some(outcome);
        self.detail = detail;
        self
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }
}
