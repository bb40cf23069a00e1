//! Post-create cluster descriptor.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// Connection descriptor for a created cluster. Owned by the orchestrator
/// for the remainder of the run; only the kubeconfig file it references
/// outlives the process.
#[derive(Debug, Clone)]
pub struct ClusterHandle {
    pub name: String,
    pub api_endpoint: String,
    pub kubeconfig_path: PathBuf,
    pub created_at: DateTime<Utc>,
}
