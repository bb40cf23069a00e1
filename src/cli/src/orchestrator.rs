//! The bootstrap orchestrator.
//!
//! start → preflight → create_cluster → install_controller → register_root →
//! await_convergence → summarize. Every state is cancelable; rollback on
//! failure happens only when `--force` is unset and the run is interactive.
//! Clusters that pre-existed before the run are never deleted: the engine
//! rejects name conflicts before creating, so any cluster with the run's
//! name was made by this run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chart::{ChartEngine, ChartError, ChartSpec, ConvergenceError, Snapshot, ValuesResolution};
use cluster::{ApiProbe, ClusterEngine, ClusterError, ClusterHandle, ClusterSpec};
use host::{CancelToken, CommandSpec, Executor, HostProfile};
use preflight::{MemoryReading, PreflightGate, PreflightOptions};
use report::{Confirmer, Reporter, RunLedger};

use crate::config::{DeploymentMode, RunConfig};
use crate::error::RunError;
use crate::runs::RunPaths;

const CANCEL_GRACE: Duration = Duration::from_secs(10);

/// States of one run, as recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Preflight,
    CreateCluster,
    InstallController,
    RegisterRoot,
    AwaitConvergence,
    Summarize,
}

impl RunState {
    pub fn ledger_name(self) -> &'static str {
        match self {
            RunState::Preflight => "preflight",
            RunState::CreateCluster => "create_cluster",
            RunState::InstallController => "install_controller",
            RunState::RegisterRoot => "register_root",
            RunState::AwaitConvergence => "await_convergence",
            RunState::Summarize => "summarize",
        }
    }
}

pub struct Orchestrator {
    cfg: RunConfig,
    profile: &'static HostProfile,
    executor: Arc<dyn Executor>,
    reporter: Arc<dyn Reporter>,
    confirmer: Arc<dyn Confirmer>,
    probe: Arc<dyn ApiProbe>,
    ledger: Arc<RunLedger>,
    cancel: CancelToken,
    paths: RunPaths,
    cancel_grace: Duration,
    memory_override: Option<MemoryReading>,
    api_deadline: Option<Duration>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: RunConfig,
        profile: &'static HostProfile,
        executor: Arc<dyn Executor>,
        reporter: Arc<dyn Reporter>,
        confirmer: Arc<dyn Confirmer>,
        probe: Arc<dyn ApiProbe>,
        ledger: Arc<RunLedger>,
        cancel: CancelToken,
        paths: RunPaths,
    ) -> Self {
        Self {
            cfg,
            profile,
            executor,
            reporter,
            confirmer,
            probe,
            ledger,
            cancel,
            paths,
            cancel_grace: CANCEL_GRACE,
            memory_override: None,
            api_deadline: None,
        }
    }

    /// Shrink the cancel grace period; used by tests.
    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    /// Use a fixed memory reading instead of probing the host; used by tests.
    pub fn with_memory_reading(mut self, reading: MemoryReading) -> Self {
        self.memory_override = Some(reading);
        self
    }

    /// Shrink the cluster API wait deadline; used by tests.
    pub fn with_api_deadline(mut self, deadline: Duration) -> Self {
        self.api_deadline = Some(deadline);
        self
    }

    fn enter(&self, state: RunState) {
        tracing::info!(state = state.ledger_name(), "entering state");
        self.ledger.set_state(state.ledger_name());
        self.ledger
            .info(&format!("entering {}", state.ledger_name()));
    }

    fn rollback_enabled(&self) -> bool {
        !self.cfg.force && self.cfg.interactive
    }

    fn cluster_engine(&self) -> ClusterEngine {
        let engine = ClusterEngine::new(
            self.executor.clone(),
            self.reporter.clone(),
            self.probe.clone(),
            self.cancel.clone(),
            self.paths.runs_root.clone(),
            self.paths.root.clone(),
            self.cfg.verbose,
        );
        match self.api_deadline {
            Some(deadline) => engine.with_api_deadline(deadline),
            None => engine,
        }
    }

    fn chart_engine(&self) -> ChartEngine {
        ChartEngine::new(
            self.executor.clone(),
            self.reporter.clone(),
            self.cancel.clone(),
            self.paths.root.clone(),
            self.cfg.verbose,
        )
    }

    /// Drive a full bootstrap.
    pub async fn run(&self) -> Result<(), RunError> {
        let run_start = Instant::now();
        let mut state_durations: Vec<(&'static str, Duration)> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();

        // Preflight. The memory reading is captured first so nothing mutates
        // a low-memory host.
        self.enter(RunState::Preflight);
        let stage = Instant::now();
        let memory = match self.memory_override {
            Some(reading) => reading,
            None => preflight::memory::read_memory(self.profile, self.executor.as_ref()).await,
        };
        let gate = PreflightGate::new(
            self.profile,
            self.executor.clone(),
            self.reporter.clone(),
            self.confirmer.clone(),
            self.cancel.clone(),
            PreflightOptions {
                interactive: self.cfg.interactive,
                force: self.cfg.force,
                verbose: self.cfg.verbose,
            },
        );
        let preflight_result = gate.run(memory).await?;
        warnings.extend(preflight_result.warnings.iter().cloned());
        state_durations.push((RunState::Preflight.ledger_name(), stage.elapsed()));

        // Cluster creation.
        self.enter(RunState::CreateCluster);
        let stage = Instant::now();
        let engine = self.cluster_engine();
        let spec = ClusterSpec::new(&self.cfg.cluster_name, self.cfg.node_count)
            .with_version(&self.cfg.kubernetes_version);
        let handle = match engine.create(&spec).await {
            Ok(handle) => handle,
            Err(ClusterError::Canceled) => {
                // The cluster may or may not have come up; delete is
                // idempotent either way.
                return self.canceled(Some(&engine)).await;
            }
            Err(err @ ClusterError::ApiUnreachable(_)) => {
                if self.rollback_enabled() {
                    self.reporter
                        .info("rolling back the cluster created by this run");
                    let _ = engine.delete(&self.cfg.cluster_name).await;
                } else {
                    self.print_remediation();
                }
                return Err(err.into());
            }
            Err(err) => {
                // Port conflicts, provisioner failures, and the rest abort
                // with the same remediation hint.
                self.print_remediation();
                return Err(err.into());
            }
        };
        state_durations.push((RunState::CreateCluster.ledger_name(), stage.elapsed()));

        // Controller install.
        self.enter(RunState::InstallController);
        let stage = Instant::now();
        let charts = self.chart_engine();
        self.render_values()?;
        if let Err(err) = charts
            .install_gitops_controller(&handle, &self.paths.values)
            .await
        {
            return self.chart_failed(err, &engine, &charts, &handle).await;
        }
        state_durations.push((RunState::InstallController.ledger_name(), stage.elapsed()));

        // Root application.
        self.enter(RunState::RegisterRoot);
        let stage = Instant::now();
        let chart_spec = ChartSpec::new(&self.cfg.repo_url, &self.cfg.branch);
        let root = match charts.register_root_app(&handle, &chart_spec).await {
            Ok(name) => name,
            Err(err) => return self.chart_failed(err, &engine, &charts, &handle).await,
        };
        state_durations.push((RunState::RegisterRoot.ledger_name(), stage.elapsed()));

        // Convergence.
        self.enter(RunState::AwaitConvergence);
        let stage = Instant::now();
        let deadline = Duration::from_secs(self.cfg.timeout_minutes * 60);
        if let Err(err) = charts.wait_for_convergence(&handle, &root, deadline).await {
            if let ChartError::Convergence(convergence) = &err {
                if matches!(convergence, ConvergenceError::Canceled) {
                    return self.canceled(Some(&engine)).await;
                }
                if let Some(snapshot) = convergence.snapshot() {
                    self.render_apps_table(snapshot);
                }
            }
            // No rollback: the cluster stays for inspection.
            self.reporter
                .info("cluster left in place for inspection");
            self.print_remediation();
            return Err(err.into());
        }
        state_durations.push((RunState::AwaitConvergence.ledger_name(), stage.elapsed()));

        // Summary.
        self.enter(RunState::Summarize);
        let snapshot = self.fetch_final_snapshot(&handle).await;
        self.summarize(run_start.elapsed(), &state_durations, &snapshot, &warnings);
        Ok(())
    }

    /// Resolve and render the values document for this run.
    fn render_values(&self) -> Result<(), RunError> {
        let mut resolution = ValuesResolution {
            file: self.cfg.values_file.clone(),
            ..Default::default()
        };
        if self.cfg.deployment_mode.is_set() {
            resolution.overrides.push((
                "deployment.mode".to_string(),
                self.cfg.deployment_mode.to_string(),
            ));
        } else if self.cfg.interactive {
            let options: Vec<String> = DeploymentMode::CHOICES
                .iter()
                .map(|c| c.to_string())
                .collect();
            if let Some(choice) = self.confirmer.select_one("Select deployment mode", &options) {
                resolution
                    .wizard
                    .push(("deployment.mode".to_string(), choice));
            }
        }
        resolution
            .render_to(&self.paths.values)
            .map_err(RunError::Chart)?;
        self.reporter
            .info(&format!("values: {}", self.paths.values.display()));
        Ok(())
    }

    async fn chart_failed(
        &self,
        err: ChartError,
        engine: &ClusterEngine,
        charts: &ChartEngine,
        handle: &ClusterHandle,
    ) -> Result<(), RunError> {
        if matches!(err, ChartError::Canceled) {
            return self.canceled(Some(engine)).await;
        }
        if self.rollback_enabled() {
            self.reporter.info("rolling back controller release");
            let _ = charts.uninstall_all(handle).await;
        } else {
            self.print_remediation();
        }
        Err(err.into())
    }

    /// Orderly shutdown after a cancel signal: let in-flight externals
    /// drain, then roll back the cluster this run created, if any.
    async fn canceled(&self, engine: Option<&ClusterEngine>) -> Result<(), RunError> {
        self.reporter
            .info("cancel received; waiting for in-flight processes");
        tokio::time::sleep(self.cancel_grace).await;
        if let Some(engine) = engine {
            let _ = engine.delete(&self.cfg.cluster_name).await;
        }
        Err(RunError::Canceled)
    }

    fn print_remediation(&self) {
        self.reporter.info(&format!(
            "remediation: bosun cluster cleanup {}",
            self.cfg.cluster_name
        ));
    }

    async fn fetch_final_snapshot(&self, handle: &ClusterHandle) -> Snapshot {
        let result = self
            .executor
            .run(
                CommandSpec::new("kubectl")
                    .arg("--kubeconfig")
                    .host_path(&handle.kubeconfig_path)
                    .args([
                        "get",
                        "applications.argoproj.io",
                        "-n",
                        chart::CONTROLLER_NAMESPACE,
                        "-o",
                        "json",
                    ])
                    .timeout(Duration::from_secs(15))
                    .tool("kubectl"),
            )
            .await;
        match result {
            Ok(output) if output.success() => chart::apps::parse_application_list(&output.stdout),
            _ => Vec::new(),
        }
    }

    fn render_apps_table(&self, snapshot: &Snapshot) {
        let mut rows = vec![vec![
            "Application".to_string(),
            "Sync".to_string(),
            "Health".to_string(),
            "Message".to_string(),
        ]];
        for app in snapshot {
            rows.push(vec![
                app.name.clone(),
                app.sync.to_string(),
                app.health.to_string(),
                app.message.clone(),
            ]);
        }
        self.reporter.table(&rows);
    }

    fn summarize(
        &self,
        total: Duration,
        states: &[(&'static str, Duration)],
        snapshot: &Snapshot,
        warnings: &[String],
    ) {
        self.reporter.info("─────────────── summary ───────────────");
        self.reporter
            .info(&format!("total duration: {}", fmt_duration(total)));
        for (state, duration) in states {
            self.reporter
                .info(&format!("  {}: {}", state, fmt_duration(*duration)));
        }
        if !snapshot.is_empty() {
            self.render_apps_table(snapshot);
        }
        for warning in warnings {
            self.reporter.info(&format!("warning: {}", warning));
        }
        self.reporter
            .succeed(&format!("environment {} is ready", self.cfg.cluster_name));
    }
}

fn fmt_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}s", secs)
    } else {
        format!("{}ms", duration.as_millis())
    }
}
