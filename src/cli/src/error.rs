//! Run-level error kinds and exit code mapping.

use chart::{ChartError, ConvergenceError};
use cluster::ClusterError;
use preflight::PreflightError;

/// Exit codes of the command surface.
pub mod exit {
    pub const SUCCESS: i32 = 0;
    pub const FAILURE: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const PREFLIGHT: i32 = 3;
    pub const CLUSTER: i32 = 4;
    pub const CHART: i32 = 5;
    pub const CANCELED: i32 = 130;
}

/// Invalid flags, arguments, or configuration.
#[derive(Debug, thiserror::Error)]
#[error("usage error: {0}")]
pub struct UsageError(pub String);

impl UsageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Top-level error of one run, wrapping the failing stage.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Usage(#[from] UsageError),
    #[error("preflight failed: {0}")]
    Preflight(#[from] PreflightError),
    #[error("cluster failed: {0}")]
    Cluster(#[from] ClusterError),
    #[error("chart failed: {0}")]
    Chart(#[from] ChartError),
    #[error("run canceled")]
    Canceled,
    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for RunError {
    fn from(e: std::io::Error) -> Self {
        RunError::Other(format!("i/o error: {}", e))
    }
}

/// Map a run error onto the documented exit codes. Cancellation wins over
/// the stage it happened in.
pub fn exit_code(error: &RunError) -> i32 {
    match error {
        RunError::Usage(_) => exit::USAGE,
        RunError::Preflight(PreflightError::Canceled) => exit::CANCELED,
        RunError::Preflight(_) => exit::PREFLIGHT,
        RunError::Cluster(ClusterError::Canceled) => exit::CANCELED,
        RunError::Cluster(_) => exit::CLUSTER,
        RunError::Chart(ChartError::Canceled)
        | RunError::Chart(ChartError::Convergence(ConvergenceError::Canceled)) => exit::CANCELED,
        RunError::Chart(_) => exit::CHART,
        RunError::Canceled => exit::CANCELED,
        RunError::Other(_) => exit::FAILURE,
    }
}
