//! The chart engine proper.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cluster::ClusterHandle;
use host::exec::truncated_lossy;
use host::{CancelToken, CommandSpec, Executor, OutputMode};
use report::Reporter;

use crate::error::ChartError;
use crate::git;
use crate::monitor::ConvergenceMonitor;

/// Conventional namespace of the GitOps controller.
pub const CONTROLLER_NAMESPACE: &str = "argocd";

const CONTROLLER_RELEASE: &str = "argocd";
const CONTROLLER_CHART: &str = "argo/argo-cd";
const CONTROLLER_REPO_NAME: &str = "argo";
const CONTROLLER_REPO_URL: &str = "https://argoproj.github.io/argo-helm";

const CONTROLLER_DEADLINE: Duration = Duration::from_secs(600);
const CONTROLLER_POLL: Duration = Duration::from_secs(5);
const HELM_TIMEOUT: Duration = Duration::from_secs(660);
const STDERR_ATTACH_LIMIT: usize = 1200;

/// What to register as the root application.
#[derive(Debug, Clone)]
pub struct ChartSpec {
    pub repo_url: String,
    pub revision: String,
    /// Path of the app-of-apps chart inside the repository.
    pub path: String,
    pub release_name: String,
    pub namespace: String,
}

impl ChartSpec {
    pub fn new(repo_url: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
            revision: revision.into(),
            path: "manifests/app-of-apps".to_string(),
            release_name: "root".to_string(),
            namespace: CONTROLLER_NAMESPACE.to_string(),
        }
    }
}

/// Installs the controller, registers the root application, and waits for
/// convergence.
pub struct ChartEngine {
    executor: Arc<dyn Executor>,
    reporter: Arc<dyn Reporter>,
    cancel: CancelToken,
    run_dir: PathBuf,
    verbose: bool,
    controller_deadline: Duration,
}

impl ChartEngine {
    pub fn new(
        executor: Arc<dyn Executor>,
        reporter: Arc<dyn Reporter>,
        cancel: CancelToken,
        run_dir: PathBuf,
        verbose: bool,
    ) -> Self {
        Self {
            executor,
            reporter,
            cancel,
            run_dir,
            verbose,
            controller_deadline: CONTROLLER_DEADLINE,
        }
    }

    /// Shrink the controller-availability deadline; used by tests.
    pub fn with_controller_deadline(mut self, deadline: Duration) -> Self {
        self.controller_deadline = deadline;
        self
    }

    fn checkpoint(&self) -> Result<(), ChartError> {
        if self.cancel.is_cancelled() {
            Err(ChartError::Canceled)
        } else {
            Ok(())
        }
    }

    /// Install or upgrade the GitOps controller release and wait for its
    /// deployments to become available. A failed install is retried once.
    pub async fn install_gitops_controller(
        &self,
        handle: &ClusterHandle,
        values_file: &Path,
    ) -> Result<(), ChartError> {
        self.checkpoint()?;
        self.ensure_controller_repo().await?;

        self.reporter.start_step("Installing GitOps controller");
        match self.install_release(handle, values_file).await {
            Ok(()) => {}
            Err(first) => {
                // One retry with a fresh attempt before giving up.
                self.reporter
                    .warn(&format!("install failed, retrying once: {}", first));
                self.reporter.start_step("Retrying controller install");
                self.install_release(handle, values_file).await?;
            }
        }
        self.reporter.succeed("controller release deployed");

        self.wait_controller_available(handle).await
    }

    async fn ensure_controller_repo(&self) -> Result<(), ChartError> {
        let result = self
            .executor
            .run(
                CommandSpec::new("helm")
                    .args(["repo", "add", CONTROLLER_REPO_NAME, CONTROLLER_REPO_URL])
                    .timeout(Duration::from_secs(60))
                    .tool("helm"),
            )
            .await?;
        // An already-configured repo is fine.
        if !result.success() && !result.stderr_str().contains("already exists") {
            return Err(ChartError::Install(truncated_lossy(
                &result.stderr,
                STDERR_ATTACH_LIMIT,
            )));
        }
        Ok(())
    }

    async fn install_release(
        &self,
        handle: &ClusterHandle,
        values_file: &Path,
    ) -> Result<(), ChartError> {
        let mode = if self.verbose {
            OutputMode::StreamCapture
        } else {
            OutputMode::Capture
        };
        let result = self
            .executor
            .run(
                CommandSpec::new("helm")
                    .args(["upgrade", "--install", CONTROLLER_RELEASE, CONTROLLER_CHART])
                    .args(["--namespace", CONTROLLER_NAMESPACE, "--create-namespace"])
                    .arg("--kubeconfig")
                    .host_path(&handle.kubeconfig_path)
                    .arg("-f")
                    .host_path(values_file)
                    .args(["--wait", "--timeout", "10m"])
                    .timeout(HELM_TIMEOUT)
                    .mode(mode)
                    .tool("helm"),
            )
            .await?;
        if result.success() {
            Ok(())
        } else {
            Err(ChartError::Install(truncated_lossy(
                &result.stderr,
                STDERR_ATTACH_LIMIT,
            )))
        }
    }

    /// Poll controller deployments until every one reports an available
    /// replica.
    async fn wait_controller_available(&self, handle: &ClusterHandle) -> Result<(), ChartError> {
        self.reporter.start_step("Waiting for controller availability");
        let started = Instant::now();
        loop {
            self.checkpoint()?;
            let result = self
                .executor
                .run(
                    CommandSpec::new("kubectl")
                        .arg("--kubeconfig")
                        .host_path(&handle.kubeconfig_path)
                        .args(["get", "deployments", "-n", CONTROLLER_NAMESPACE, "-o", "json"])
                        .timeout(Duration::from_secs(15))
                        .tool("kubectl"),
                )
                .await;
            if let Ok(output) = result {
                if output.success() && deployments_available(&output.stdout) {
                    self.reporter.succeed("controller is available");
                    return Ok(());
                }
            }
            let elapsed = started.elapsed();
            if elapsed >= self.controller_deadline {
                self.reporter.fail("controller never became available");
                return Err(ChartError::Install(format!(
                    "controller deployments not available within {:?}",
                    self.controller_deadline
                )));
            }
            tokio::time::sleep(CONTROLLER_POLL.min(self.controller_deadline - elapsed)).await;
        }
    }

    /// Clone the source and register the root application. Registration is
    /// idempotent: a live application with a matching spec is reported as
    /// skipped, a differing one is updated.
    pub async fn register_root_app(
        &self,
        handle: &ClusterHandle,
        spec: &ChartSpec,
    ) -> Result<String, ChartError> {
        self.checkpoint()?;

        self.reporter.start_step(&format!(
            "Cloning {} at {}",
            spec.repo_url, spec.revision
        ));
        let workdir = self.run_dir.join("workdir");
        git::clone_repo(self.executor.as_ref(), &spec.repo_url, &spec.revision, &workdir).await?;
        self.reporter.succeed("source ready");

        let manifest = render_root_application(spec);
        let desired: serde_json::Value =
            serde_yaml::from_str(&manifest).expect("rendered manifest is valid YAML");

        self.reporter
            .start_step(&format!("Registering root application {}", spec.release_name));

        let live = self
            .executor
            .run(
                CommandSpec::new("kubectl")
                    .arg("--kubeconfig")
                    .host_path(&handle.kubeconfig_path)
                    .args([
                        "get",
                        "application",
                        &spec.release_name,
                        "-n",
                        &spec.namespace,
                        "-o",
                        "json",
                    ])
                    .timeout(Duration::from_secs(15))
                    .tool("kubectl"),
            )
            .await?;
        if live.success() {
            if let Ok(live_doc) = serde_json::from_slice::<serde_json::Value>(&live.stdout) {
                if specs_match(&live_doc, &desired) {
                    self.reporter.skip("root application already registered");
                    return Ok(spec.release_name.clone());
                }
            }
        }

        let result = self
            .executor
            .run(
                CommandSpec::new("kubectl")
                    .arg("--kubeconfig")
                    .host_path(&handle.kubeconfig_path)
                    .args(["apply", "-f", "-"])
                    .stdin_bytes(manifest.into_bytes())
                    .timeout(Duration::from_secs(60))
                    .tool("kubectl"),
            )
            .await?;
        if !result.success() {
            let stderr = truncated_lossy(&result.stderr, STDERR_ATTACH_LIMIT);
            self.reporter.fail(&stderr);
            return Err(ChartError::Registration(stderr));
        }
        self.reporter.succeed("root application registered");
        Ok(spec.release_name.clone())
    }

    /// Delegate to the convergence monitor with the root application as the
    /// entry point.
    pub async fn wait_for_convergence(
        &self,
        handle: &ClusterHandle,
        entry: &str,
        deadline: Duration,
    ) -> Result<(), ChartError> {
        self.reporter.start_step("Waiting for applications to converge");
        let monitor = ConvergenceMonitor::new(
            self.executor.clone(),
            self.reporter.clone(),
            self.cancel.clone(),
            handle.kubeconfig_path.clone(),
            CONTROLLER_NAMESPACE,
            self.verbose,
        );
        monitor.wait(entry, deadline).await.map_err(ChartError::from)
    }

    /// Best-effort reversal: remove the root application (the controller
    /// cascades to children through its ownership), then the controller
    /// release.
    pub async fn uninstall_all(&self, handle: &ClusterHandle) -> Result<(), ChartError> {
        self.reporter.start_step("Removing root application");
        let result = self
            .executor
            .run(
                CommandSpec::new("kubectl")
                    .arg("--kubeconfig")
                    .host_path(&handle.kubeconfig_path)
                    .args([
                        "delete",
                        "application",
                        "--all",
                        "-n",
                        CONTROLLER_NAMESPACE,
                        "--ignore-not-found",
                    ])
                    .timeout(Duration::from_secs(120))
                    .tool("kubectl"),
            )
            .await;
        match result {
            Ok(output) if output.success() => self.reporter.succeed("applications removed"),
            Ok(output) => self.reporter.warn(&output.stderr_str()),
            Err(e) => self.reporter.warn(&e.to_string()),
        }

        self.reporter.start_step("Uninstalling controller release");
        let result = self
            .executor
            .run(
                CommandSpec::new("helm")
                    .args(["uninstall", CONTROLLER_RELEASE, "-n", CONTROLLER_NAMESPACE])
                    .arg("--kubeconfig")
                    .host_path(&handle.kubeconfig_path)
                    .timeout(Duration::from_secs(300))
                    .tool("helm"),
            )
            .await;
        match result {
            Ok(output) if output.success() => self.reporter.succeed("controller removed"),
            Ok(output) => self.reporter.warn(&output.stderr_str()),
            Err(e) => self.reporter.warn(&e.to_string()),
        }
        Ok(())
    }
}

/// Every deployment in the listing reports at least one available replica.
fn deployments_available(bytes: &[u8]) -> bool {
    let Ok(parsed) = serde_json::from_slice::<serde_json::Value>(bytes) else {
        return false;
    };
    let Some(items) = parsed.get("items").and_then(|i| i.as_array()) else {
        return false;
    };
    if items.is_empty() {
        return false;
    }
    items.iter().all(|deploy| {
        deploy
            .get("status")
            .and_then(|s| s.get("availableReplicas"))
            .and_then(|r| r.as_u64())
            .unwrap_or(0)
            >= 1
    })
}

/// Render the root Application manifest.
fn render_root_application(spec: &ChartSpec) -> String {
    let doc = serde_json::json!({
        "apiVersion": "argoproj.io/v1alpha1",
        "kind": "Application",
        "metadata": {
            "name": spec.release_name,
            "namespace": spec.namespace,
            "finalizers": ["resources-finalizer.argocd.argoproj.io"],
        },
        "spec": {
            "project": "default",
            "source": {
                "repoURL": spec.repo_url,
                "targetRevision": spec.revision,
                "path": spec.path,
            },
            "destination": {
                "server": "https://kubernetes.default.svc",
                "namespace": spec.namespace,
            },
            "syncPolicy": {
                "automated": { "prune": true, "selfHeal": true },
                "syncOptions": ["CreateNamespace=true"],
            },
        },
    });
    serde_yaml::to_string(&doc).expect("manifest serializes")
}

/// Compare the parts of the spec the engine owns; the live object carries
/// controller-added defaults that must not defeat idempotence.
fn specs_match(live: &serde_json::Value, desired: &serde_json::Value) -> bool {
    for field in ["project", "source", "destination"] {
        if live.get("spec").and_then(|s| s.get(field))
            != desired.get("spec").and_then(|s| s.get(field))
        {
            return false;
        }
    }
    true
}
