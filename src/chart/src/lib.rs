//! Chart engine.
//!
//! Installs the GitOps controller into a freshly created cluster, registers
//! the app-of-apps root application pointing at a Git source, and drives the
//! convergence wait until every child application reports Synced and
//! Healthy.

pub mod apps;
pub mod engine;
pub mod error;
pub mod git;
pub mod monitor;
pub mod values;

pub use apps::{AppStatus, HealthState, Snapshot, SyncState};
pub use engine::{ChartEngine, ChartSpec, CONTROLLER_NAMESPACE};
pub use error::{ChartError, ConvergenceError};
pub use monitor::ConvergenceMonitor;
pub use values::ValuesResolution;
