//! Append-only JSONL ledger for a single run.
//!
//! One JSON object per step event, in append order. The ledger lives in the
//! per-run directory next to the kubeconfig and values document, and is the
//! machine-readable counterpart of the on-screen transcript.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::step::{InstallStep, StepOutcome};

/// Event phase within a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerPhase {
    Begin,
    End,
    Info,
    Warn,
}

#[derive(Debug, Serialize)]
struct LedgerLine<'a> {
    ts: String,
    state: &'a str,
    phase: LedgerPhase,
    label: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<StepOutcome>,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    detail: serde_json::Value,
}

struct LedgerInner {
    file: File,
    state: String,
}

/// Serialized sink for step events. Writers funnel through one mutex so the
/// on-disk order matches the visible transcript.
pub struct RunLedger {
    path: PathBuf,
    inner: Mutex<LedgerInner>,
}

impl RunLedger {
    /// Open (creating if needed) the ledger file at `path`.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(LedgerInner {
                file,
                state: "start".to_string(),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Set the orchestrator state recorded on subsequent lines.
    pub fn set_state(&self, state: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.state = state.to_string();
        }
    }

    pub fn begin(&self, label: &str) {
        self.append(LedgerPhase::Begin, label, None, serde_json::Value::Null);
    }

    /// Record a completed step, attaching its elapsed time to the detail.
    pub fn end_step(&self, step: &InstallStep) {
        let mut detail = step.detail.clone();
        if let (Some(object), Some(elapsed)) = (detail.as_object_mut(), step.duration()) {
            object.insert(
                "elapsed_ms".to_string(),
                elapsed.num_milliseconds().into(),
            );
        }
        self.append(LedgerPhase::End, &step.label, step.outcome, detail);
    }

    pub fn info(&self, label: &str) {
        self.append(LedgerPhase::Info, label, None, serde_json::Value::Null);
    }

    pub fn warn(&self, label: &str, detail: serde_json::Value) {
        self.append(LedgerPhase::Warn, label, None, detail);
    }

    fn append(
        &self,
        phase: LedgerPhase,
        label: &str,
        outcome: Option<StepOutcome>,
        detail: serde_json::Value,
    ) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let state = inner.state.clone();
        let line = LedgerLine {
            ts: Utc::now().to_rfc3339(),
            state: &state,
            phase,
            label,
            outcome,
            detail,
        };
        match serde_json::to_string(&line) {
            Ok(json) => {
                if let Err(e) = writeln!(inner.file, "{}", json) {
                    tracing::warn!(error = %e, "failed to append ledger line");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize ledger line"),
        }
    }
}
