//! The cluster engine proper.

use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use host::exec::truncated_lossy;
use host::{CancelToken, CommandSpec, Executor, OutputMode};
use report::Reporter;

use crate::error::ClusterError;
use crate::handle::ClusterHandle;
use crate::name::validate_name;
use crate::spec::ClusterSpec;

const API_WAIT_DEADLINE: Duration = Duration::from_secs(300);
const API_POLL_INTERVAL: Duration = Duration::from_secs(2);
const PROVISIONER_WAIT: &str = "300s";
const PROVISIONER_TIMEOUT: Duration = Duration::from_secs(330);
const STDERR_ATTACH_LIMIT: usize = 2000;

/// Readiness probe against the cluster API endpoint.
#[async_trait]
pub trait ApiProbe: Send + Sync {
    async fn ready(&self, endpoint: &str) -> bool;
}

/// Probe via HTTPS GET. Any well-formed HTTP response counts as ready: the
/// API server answers 401/403 to anonymous requests long before workloads
/// schedule, and that is all the engine needs to know.
pub struct HttpsApiProbe {
    client: reqwest::Client,
}

impl HttpsApiProbe {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(Duration::from_secs(5))
            .build()
            .expect("reqwest client builds");
        Self { client }
    }
}

impl Default for HttpsApiProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApiProbe for HttpsApiProbe {
    async fn ready(&self, endpoint: &str) -> bool {
        let url = format!("{}/version", endpoint.trim_end_matches('/'));
        self.client.get(&url).send().await.is_ok()
    }
}

/// One row of `cluster list` output.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterRow {
    pub name: String,
    pub status: String,
    pub nodes: String,
    pub age: String,
}

/// Detailed status of one cluster.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub name: String,
    pub status: String,
    pub nodes: String,
    pub endpoint: Option<String>,
    /// Control-plane pods as (name, phase) when the API is reachable.
    pub pods: Vec<(String, String)>,
}

/// Creates, destroys, inspects, and cleans up local clusters.
pub struct ClusterEngine {
    executor: Arc<dyn Executor>,
    reporter: Arc<dyn Reporter>,
    probe: Arc<dyn ApiProbe>,
    cancel: CancelToken,
    /// Root of all per-run directories, scanned by `cleanup`.
    runs_root: PathBuf,
    /// Directory of the current run; receives the kubeconfig fragment.
    run_dir: PathBuf,
    verbose: bool,
    api_deadline: Duration,
}

impl ClusterEngine {
    pub fn new(
        executor: Arc<dyn Executor>,
        reporter: Arc<dyn Reporter>,
        probe: Arc<dyn ApiProbe>,
        cancel: CancelToken,
        runs_root: PathBuf,
        run_dir: PathBuf,
        verbose: bool,
    ) -> Self {
        Self {
            executor,
            reporter,
            probe,
            cancel,
            runs_root,
            run_dir,
            verbose,
            api_deadline: API_WAIT_DEADLINE,
        }
    }

    /// Shrink the API-wait deadline; used by tests.
    pub fn with_api_deadline(mut self, deadline: Duration) -> Self {
        self.api_deadline = deadline;
        self
    }

    fn checkpoint(&self) -> Result<(), ClusterError> {
        if self.cancel.is_cancelled() {
            Err(ClusterError::Canceled)
        } else {
            Ok(())
        }
    }

    /// Create a cluster and block until its API endpoint answers.
    pub async fn create(&self, spec: &ClusterSpec) -> Result<ClusterHandle, ClusterError> {
        validate_name(&spec.name)?;
        self.checkpoint()?;

        // List-first conflict detection: an existing cluster of the same
        // name is never touched.
        let existing = self.list().await?;
        if existing.iter().any(|c| c.name == spec.name) {
            return Err(ClusterError::NameConflict(spec.name.clone()));
        }

        for port in spec.host_ports() {
            check_host_port(port)?;
        }

        self.reporter
            .start_step(&format!("Creating cluster {}", spec.name));

        let config = spec.provisioner_config();
        let mut _tmp_guard = None;
        let config_path = if self.verbose {
            std::fs::create_dir_all(&self.run_dir)?;
            let path = self.run_dir.join("cluster-config.yaml");
            std::fs::write(&path, &config)?;
            self.reporter
                .info(&format!("provisioner config: {}", path.display()));
            path
        } else {
            let tmp = tempfile::Builder::new()
                .prefix("bosun-cluster-")
                .suffix(".yaml")
                .tempfile()?;
            std::fs::write(tmp.path(), &config)?;
            let path = tmp.path().to_path_buf();
            _tmp_guard = Some(tmp);
            path
        };

        let mode = if self.verbose {
            OutputMode::StreamCapture
        } else {
            OutputMode::Capture
        };
        let result = self
            .executor
            .run(
                CommandSpec::new("k3d")
                    .args(["cluster", "create", "--config"])
                    .host_path(&config_path)
                    .args(["--wait", "--timeout", PROVISIONER_WAIT])
                    .timeout(PROVISIONER_TIMEOUT)
                    .mode(mode)
                    .tool("k3d"),
            )
            .await?;
        if !result.success() {
            let stderr = truncated_lossy(&result.stderr, STDERR_ATTACH_LIMIT);
            self.reporter.fail("provisioner failed");
            return Err(ClusterError::Provisioner { stderr });
        }
        self.reporter.succeed("cluster created");
        self.checkpoint()?;

        let kubeconfig_path = self.write_kubeconfig(&spec.name).await?;
        let endpoint = endpoint_from_kubeconfig(&kubeconfig_path)
            .unwrap_or_else(|| format!("https://127.0.0.1:{}", spec.api_port));

        self.reporter.start_step("Waiting for cluster API");
        let started = Instant::now();
        loop {
            self.checkpoint()?;
            if self.probe.ready(&endpoint).await {
                break;
            }
            let elapsed = started.elapsed();
            if elapsed >= self.api_deadline {
                self.reporter.fail("API endpoint never answered");
                return Err(ClusterError::ApiUnreachable(self.api_deadline));
            }
            tokio::time::sleep(API_POLL_INTERVAL.min(self.api_deadline - elapsed)).await;
        }
        self.reporter.succeed(&endpoint);

        Ok(ClusterHandle {
            name: spec.name.clone(),
            api_endpoint: endpoint,
            kubeconfig_path,
            created_at: Utc::now(),
        })
    }

    async fn write_kubeconfig(&self, name: &str) -> Result<PathBuf, ClusterError> {
        let result = self
            .executor
            .run(
                CommandSpec::new("k3d")
                    .args(["kubeconfig", "get", name])
                    .tool("k3d"),
            )
            .await?;
        if !result.success() {
            return Err(ClusterError::Provisioner {
                stderr: truncated_lossy(&result.stderr, STDERR_ATTACH_LIMIT),
            });
        }
        std::fs::create_dir_all(&self.run_dir)?;
        let path = self.run_dir.join("kubeconfig");
        std::fs::write(&path, &result.stdout)?;
        tracing::debug!(path = %path.display(), "kubeconfig fragment written");
        Ok(path)
    }

    /// Delete a cluster. Idempotent: a missing cluster reports a skip and
    /// succeeds.
    pub async fn delete(&self, name: &str) -> Result<(), ClusterError> {
        validate_name(name)?;
        let existing = self.list().await?;
        if !existing.iter().any(|c| c.name == name) {
            self.reporter
                .skip(&format!("cluster {} not found (nothing to delete)", name));
            return Ok(());
        }

        self.reporter
            .start_step(&format!("Deleting cluster {}", name));
        let result = self
            .executor
            .run(
                CommandSpec::new("k3d")
                    .args(["cluster", "delete", name])
                    .timeout(Duration::from_secs(120))
                    .tool("k3d"),
            )
            .await?;
        if !result.success() {
            let stderr = truncated_lossy(&result.stderr, STDERR_ATTACH_LIMIT);
            self.reporter.fail(&stderr);
            return Err(ClusterError::Provisioner { stderr });
        }
        self.reporter.succeed("deleted");
        Ok(())
    }

    /// Aggregate the provisioner's cluster listing.
    pub async fn list(&self) -> Result<Vec<ClusterRow>, ClusterError> {
        let result = self
            .executor
            .run(
                CommandSpec::new("k3d")
                    .args(["cluster", "list", "-o", "json"])
                    .tool("k3d"),
            )
            .await?;
        if !result.success() {
            return Err(ClusterError::Provisioner {
                stderr: truncated_lossy(&result.stderr, STDERR_ATTACH_LIMIT),
            });
        }
        Ok(parse_cluster_list(&result.stdout))
    }

    /// Detailed status of one cluster, including control-plane pods when the
    /// API is reachable.
    pub async fn status(&self, name: &str) -> Result<StatusReport, ClusterError> {
        validate_name(name)?;
        let rows = self.list().await?;
        let row = rows.into_iter().find(|r| r.name == name);
        let (status, nodes) = match &row {
            Some(r) => (r.status.clone(), r.nodes.clone()),
            None => ("Unknown".to_string(), "-".to_string()),
        };

        let mut report = StatusReport {
            name: name.to_string(),
            status,
            nodes,
            endpoint: None,
            pods: Vec::new(),
        };
        if row.is_none() {
            return Ok(report);
        }

        // Reachability is best-effort; a stopped cluster still gets a row.
        let kc = self
            .executor
            .run(
                CommandSpec::new("k3d")
                    .args(["kubeconfig", "get", name])
                    .tool("k3d"),
            )
            .await?;
        if !kc.success() {
            return Ok(report);
        }
        let tmp = tempfile::NamedTempFile::new()?;
        std::fs::write(tmp.path(), &kc.stdout)?;
        report.endpoint = endpoint_from_kubeconfig(tmp.path());

        let pods = self
            .executor
            .run(
                CommandSpec::new("kubectl")
                    .arg("--kubeconfig")
                    .host_path(tmp.path())
                    .args(["get", "pods", "-n", "kube-system", "-o", "json"])
                    .timeout(Duration::from_secs(15))
                    .tool("kubectl"),
            )
            .await;
        if let Ok(pods) = pods {
            if pods.success() {
                report.pods = parse_pod_phases(&pods.stdout);
            }
        }
        Ok(report)
    }

    /// Stronger delete: removes the cluster plus every per-run artifact that
    /// references it.
    pub async fn cleanup(&self, name: &str) -> Result<(), ClusterError> {
        self.delete(name).await?;

        let marker = format!("k3d-{}", name);
        let Ok(entries) = std::fs::read_dir(&self.runs_root) else {
            return Ok(());
        };
        for entry in entries.flatten() {
            let kubeconfig = entry.path().join("kubeconfig");
            let references_cluster = std::fs::read_to_string(&kubeconfig)
                .map(|content| content.contains(&marker))
                .unwrap_or(false);
            if references_cluster {
                std::fs::remove_dir_all(entry.path())?;
                self.reporter.info(&format!(
                    "removed run artifacts: {}",
                    entry.path().display()
                ));
            }
        }
        Ok(())
    }
}

/// Only a confirmed bind conflict blocks the run; permission errors on
/// privileged ports are left for the provisioner to sort out.
fn check_host_port(port: u16) -> Result<(), ClusterError> {
    match TcpListener::bind(("127.0.0.1", port)) {
        Ok(listener) => {
            drop(listener);
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => Err(ClusterError::PortInUse(port)),
        Err(_) => Ok(()),
    }
}

fn parse_cluster_list(bytes: &[u8]) -> Vec<ClusterRow> {
    let Ok(parsed) = serde_json::from_slice::<serde_json::Value>(bytes) else {
        return Vec::new();
    };
    let Some(items) = parsed.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let name = item.get("name")?.as_str()?.to_string();
            let servers = item.get("serversCount").and_then(|v| v.as_u64()).unwrap_or(0);
            let servers_up = item
                .get("serversRunning")
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            let agents = item.get("agentsCount").and_then(|v| v.as_u64()).unwrap_or(0);
            let agents_up = item
                .get("agentsRunning")
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            let total = servers + agents;
            let running = servers_up + agents_up;
            let status = if total == 0 {
                "Unknown"
            } else if running == total {
                "Running"
            } else if running == 0 {
                "Stopped"
            } else {
                "Degraded"
            };
            let age = item
                .get("nodes")
                .and_then(|n| n.as_array())
                .and_then(|n| n.first())
                .and_then(|n| n.get("created"))
                .and_then(|c| c.as_str())
                .and_then(|c| DateTime::parse_from_rfc3339(c).ok())
                .map(|c| humanize_age(c.with_timezone(&Utc)))
                .unwrap_or_else(|| "-".to_string());
            Some(ClusterRow {
                name,
                status: status.to_string(),
                nodes: format!("{}/{}", running, total),
                age,
            })
        })
        .collect()
}

fn parse_pod_phases(bytes: &[u8]) -> Vec<(String, String)> {
    let Ok(parsed) = serde_json::from_slice::<serde_json::Value>(bytes) else {
        return Vec::new();
    };
    parsed
        .get("items")
        .and_then(|i| i.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|pod| {
                    let name = pod.get("metadata")?.get("name")?.as_str()?.to_string();
                    let phase = pod
                        .get("status")
                        .and_then(|s| s.get("phase"))
                        .and_then(|p| p.as_str())
                        .unwrap_or("Unknown")
                        .to_string();
                    Some((name, phase))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn endpoint_from_kubeconfig(path: &std::path::Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    for line in content.lines() {
        if let Some(value) = line.trim().strip_prefix("server:") {
            return Some(value.trim().to_string());
        }
    }
    None
}

fn humanize_age(created: DateTime<Utc>) -> String {
    let age = Utc::now().signed_duration_since(created);
    let minutes = age.num_minutes().max(0);
    if minutes < 60 {
        format!("{}m", minutes)
    } else if minutes < 48 * 60 {
        format!("{}h", minutes / 60)
    } else {
        format!("{}d", minutes / (24 * 60))
    }
}
