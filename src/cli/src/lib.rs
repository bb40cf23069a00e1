//! bosun library surface.
//!
//! The binary in `main.rs` is a thin caller: it parses the command line,
//! resolves the run configuration, and hands control to the orchestrator.
//! Everything here is also exercised directly by the test suite.

pub mod commands;
pub mod config;
pub mod error;
pub mod ops;
pub mod orchestrator;
pub mod runs;

pub use config::{DeploymentMode, EnvOverrides, RunConfig};
pub use error::{exit_code, RunError, UsageError};
pub use orchestrator::Orchestrator;
pub use runs::RunPaths;
