//! Convergence monitor.
//!
//! Polls every known application until all of them report Synced and
//! Healthy, the deadline passes, or one of them is demonstrably stuck.
//! Per-application reads fan out through a bounded worker pool inside a
//! tick; ticks themselves are sequential, and the aggregate is reported once
//! per tick so the transcript stays monotonic.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use host::{Backoff, CancelToken, CommandSpec, Executor};
use report::Reporter;

use crate::apps::{self, AppStatus, Snapshot};
use crate::error::ConvergenceError;

const DEFAULT_TICK: Duration = Duration::from_secs(3);
const PER_CALL_TIMEOUT: Duration = Duration::from_secs(5);
const WORKER_POOL: usize = 8;
/// Consecutive bad ticks (with no new discoveries) before an application is
/// declared stuck.
const STUCK_TICKS: u32 = 5;

pub struct ConvergenceMonitor {
    executor: Arc<dyn Executor>,
    reporter: Arc<dyn Reporter>,
    cancel: CancelToken,
    kubeconfig: PathBuf,
    namespace: String,
    verbose: bool,
    tick: Duration,
    per_call_timeout: Duration,
    pool: usize,
    stuck_ticks: u32,
}

impl ConvergenceMonitor {
    pub fn new(
        executor: Arc<dyn Executor>,
        reporter: Arc<dyn Reporter>,
        cancel: CancelToken,
        kubeconfig: PathBuf,
        namespace: impl Into<String>,
        verbose: bool,
    ) -> Self {
        Self {
            executor,
            reporter,
            cancel,
            kubeconfig,
            namespace: namespace.into(),
            verbose,
            tick: DEFAULT_TICK,
            per_call_timeout: PER_CALL_TIMEOUT,
            pool: WORKER_POOL,
            stuck_ticks: STUCK_TICKS,
        }
    }

    /// Shrink the tick for tests.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Lower the stuck threshold for tests.
    pub fn with_stuck_ticks(mut self, ticks: u32) -> Self {
        self.stuck_ticks = ticks.max(1);
        self
    }

    /// Wait until every transitively discovered application is Synced and
    /// Healthy, or fail with the last snapshot attached.
    pub async fn wait(&self, entry: &str, deadline: Duration) -> Result<(), ConvergenceError> {
        let mut known: BTreeSet<String> = BTreeSet::new();
        known.insert(entry.to_string());

        // A zero deadline times out immediately with an initial snapshot and
        // no requests issued.
        if deadline.is_zero() {
            return Err(ConvergenceError::Timeout {
                deadline,
                snapshot: initial_snapshot(&known),
            });
        }

        let started = Instant::now();
        let mut last_snapshot = initial_snapshot(&known);
        // Per-application (message, consecutive ticks) while in a bad state.
        let mut bad_streaks: HashMap<String, (String, u32)> = HashMap::new();
        let mut ticks_without_discovery: u32 = 0;
        let mut backoff = Backoff::transient();

        loop {
            if self.cancel.is_cancelled() {
                return Err(ConvergenceError::Canceled);
            }
            if started.elapsed() >= deadline {
                return Err(ConvergenceError::Timeout {
                    deadline,
                    snapshot: last_snapshot,
                });
            }

            // Discover applications in the controller namespace. Transient
            // listing errors back off without counting toward stuck.
            match self.list_applications().await {
                Ok(names) => {
                    backoff.reset(Duration::from_millis(500));
                    for name in names {
                        if known.insert(name) {
                            ticks_without_discovery = 0;
                        }
                    }
                }
                Err(message) => {
                    tracing::warn!(error = %message, "application listing failed, backing off");
                    let remaining = deadline.saturating_sub(started.elapsed());
                    tokio::time::sleep(backoff.next_delay().min(remaining)).await;
                    continue;
                }
            }

            // Fan out per-application reads, bounded by the worker pool.
            let observations = self.read_applications(&known).await;

            let mut discovered = Vec::new();
            let mut snapshot: Snapshot = Vec::with_capacity(known.len());
            for (status, children) in observations {
                for child in children {
                    if !known.contains(&child) {
                        discovered.push(child);
                    }
                }
                snapshot.push(status);
            }
            snapshot.sort_by(|a, b| a.name.cmp(&b.name));
            if !discovered.is_empty() {
                ticks_without_discovery = 0;
                for name in discovered {
                    tracing::debug!(app = %name, "discovered child application");
                    known.insert(name);
                }
            }

            let healthy = snapshot.iter().filter(|a| a.converged()).count();
            self.report_tick(&snapshot, healthy, known.len());

            if healthy == known.len() {
                self.reporter.succeed(&format!(
                    "all {} applications Synced and Healthy",
                    known.len()
                ));
                return Ok(());
            }

            // Stuck detection: a bad state with an unchanged message across
            // enough consecutive ticks, while nothing new appears.
            for app in &snapshot {
                if !app.health.is_terminal_bad() {
                    bad_streaks.remove(&app.name);
                    continue;
                }
                let streak = bad_streaks
                    .entry(app.name.clone())
                    .and_modify(|(message, count)| {
                        if *message == app.message {
                            *count += 1;
                        } else {
                            *message = app.message.clone();
                            *count = 1;
                        }
                    })
                    .or_insert_with(|| (app.message.clone(), 1));
                if streak.1 >= self.stuck_ticks && ticks_without_discovery >= self.stuck_ticks {
                    return Err(ConvergenceError::Stuck {
                        app: app.name.clone(),
                        message: app.message.clone(),
                        snapshot,
                    });
                }
            }

            last_snapshot = snapshot;
            ticks_without_discovery = ticks_without_discovery.saturating_add(1);

            let remaining = deadline.saturating_sub(started.elapsed());
            tokio::time::sleep(jittered(self.tick).min(remaining)).await;
        }
    }

    fn report_tick(&self, snapshot: &Snapshot, healthy: usize, total: usize) {
        let fraction = if total == 0 {
            0.0
        } else {
            healthy as f64 / total as f64
        };
        self.reporter.gauge(
            fraction,
            &format!("{}/{} applications healthy", healthy, total),
        );
        if self.verbose {
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
    }

    async fn list_applications(&self) -> Result<Vec<String>, String> {
        let result = self
            .executor
            .run(
                CommandSpec::new("kubectl")
                    .arg("--kubeconfig")
                    .host_path(&self.kubeconfig)
                    .args(["get", "applications.argoproj.io", "-n", &self.namespace])
                    .args(["-o", "json"])
                    .timeout(self.per_call_timeout)
                    .tool("kubectl"),
            )
            .await
            .map_err(|e| e.to_string())?;
        if !result.success() {
            return Err(result.stderr_str());
        }
        apps::parse_application_names(&result.stdout).ok_or_else(|| "unparseable listing".to_string())
    }

    /// Read every known application concurrently. Results come back over a
    /// bounded channel; completion order within the tick is irrelevant.
    async fn read_applications(
        &self,
        known: &BTreeSet<String>,
    ) -> Vec<(AppStatus, Vec<String>)> {
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.pool));
        let (tx, mut rx) = tokio::sync::mpsc::channel(self.pool);

        for name in known {
            let semaphore = semaphore.clone();
            let tx = tx.clone();
            let executor = self.executor.clone();
            let kubeconfig = self.kubeconfig.clone();
            let namespace = self.namespace.clone();
            let timeout = self.per_call_timeout;
            let name = name.clone();
            tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let observation =
                    read_one(executor.as_ref(), &kubeconfig, &namespace, &name, timeout).await;
                let _ = tx.send(observation).await;
            });
        }
        drop(tx);

        let mut observations = Vec::with_capacity(known.len());
        while let Some(observation) = rx.recv().await {
            observations.push(observation);
        }
        observations
    }
}

async fn read_one(
    executor: &dyn Executor,
    kubeconfig: &std::path::Path,
    namespace: &str,
    name: &str,
    timeout: Duration,
) -> (AppStatus, Vec<String>) {
    let result = executor
        .run(
            CommandSpec::new("kubectl")
                .arg("--kubeconfig")
                .host_path(kubeconfig)
                .args(["get", "application", name, "-n", namespace, "-o", "json"])
                .timeout(timeout)
                .tool("kubectl"),
        )
        .await;
    match result {
        Ok(output) if output.success() => {
            match serde_json::from_slice::<serde_json::Value>(&output.stdout) {
                Ok(value) => {
                    let children = apps::child_application_names(&value);
                    let status = apps::parse_application(&value)
                        .unwrap_or_else(|| AppStatus::unknown(name, "unparseable application"));
                    (status, children)
                }
                Err(e) => (
                    AppStatus::unknown(name, format!("bad JSON: {}", e)),
                    Vec::new(),
                ),
            }
        }
        Ok(output) => (
            AppStatus::unknown(name, output.stderr_str()),
            Vec::new(),
        ),
        Err(e) => (AppStatus::unknown(name, e.to_string()), Vec::new()),
    }
}

fn initial_snapshot(known: &BTreeSet<String>) -> Snapshot {
    known
        .iter()
        .map(|name| AppStatus::unknown(name.clone(), "not yet observed"))
        .collect()
}

/// Ticks are jittered by ±10% to avoid lock-step with other pollers.
fn jittered(tick: Duration) -> Duration {
    let factor = 0.9 + rand::random::<f64>() * 0.2;
    tick.mul_f64(factor)
}
