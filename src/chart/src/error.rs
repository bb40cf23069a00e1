//! Chart engine errors.

use std::time::Duration;

use host::ExecError;

use crate::apps::Snapshot;

#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    #[error("controller install failed: {0}")]
    Install(String),
    #[error("git operation failed: {0}")]
    Git(String),
    #[error("root application registration failed: {0}")]
    Registration(String),
    #[error(transparent)]
    Convergence(#[from] ConvergenceError),
    #[error("chart operation canceled")]
    Canceled,
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Terminal outcomes of the convergence monitor, each carrying the
/// last-observed application snapshot for diagnosis.
#[derive(Debug, thiserror::Error)]
pub enum ConvergenceError {
    #[error("applications did not converge within {deadline:?}")]
    Timeout {
        deadline: Duration,
        snapshot: Snapshot,
    },
    #[error("application {app} is stuck: {message}")]
    Stuck {
        app: String,
        message: String,
        snapshot: Snapshot,
    },
    #[error("convergence wait canceled")]
    Canceled,
}

impl ConvergenceError {
    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            ConvergenceError::Timeout { snapshot, .. } => Some(snapshot),
            ConvergenceError::Stuck { snapshot, .. } => Some(snapshot),
            ConvergenceError::Canceled => None,
        }
    }
}
