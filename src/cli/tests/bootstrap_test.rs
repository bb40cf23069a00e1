//! End-to-end bootstrap scenarios against a fully scripted tool stack.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bosun::commands::BootstrapArgs;
use bosun::{exit_code, EnvOverrides, Orchestrator, RunConfig, RunError, RunPaths};
use chart::{ChartError, ConvergenceError};
use cluster::{ApiProbe, ClusterError};
use host::testing::{reply, ScriptedExecutor};
use host::{host_profile, CancelSource, CancelToken};
use preflight::MemoryReading;
use report::{AutoConfirmer, CaptureReporter, ReporterEvent, RunLedger};

struct FixedProbe(bool);

#[async_trait]
impl ApiProbe for FixedProbe {
    async fn ready(&self, _endpoint: &str) -> bool {
        self.0
    }
}

const KUBECONFIG: &str = "apiVersion: v1\nclusters:\n- cluster:\n    server: https://0.0.0.0:6445\n  name: k3d-demo-1\n";

const DEPLOYMENTS_READY: &str =
    r#"{"items":[{"metadata":{"name":"argocd-server"},"status":{"availableReplicas":1}}]}"#;

fn healthy_app(name: &str, children: &[&str]) -> serde_json::Value {
    let resources: Vec<serde_json::Value> = children
        .iter()
        .map(|c| serde_json::json!({ "kind": "Application", "name": c }))
        .collect();
    serde_json::json!({
        "metadata": { "name": name },
        "status": {
            "sync": { "status": "Synced" },
            "health": { "status": "Healthy" },
            "resources": resources,
        }
    })
}

struct Fixture {
    exec: Arc<ScriptedExecutor>,
    reporter: Arc<CaptureReporter>,
    ledger: Arc<RunLedger>,
    paths: RunPaths,
    _dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let paths = RunPaths::create_under(dir.path()).unwrap();
        let ledger = Arc::new(RunLedger::open(&paths.ledger).unwrap());
        Self {
            exec: Arc::new(ScriptedExecutor::new()),
            reporter: Arc::new(CaptureReporter::new()),
            ledger,
            paths,
            _dir: dir,
        }
    }

    /// Script a run where every external tool behaves.
    fn stub_happy_path(&self) {
        self.exec.stub("cluster list", reply::ok("[]"));
        self.exec.stub("kubeconfig get demo-1", reply::ok(KUBECONFIG));
        self.exec
            .stub("get deployments -n argocd", reply::ok(DEPLOYMENTS_READY));
        // First lookup of the root application is the not-yet-registered case.
        self.exec
            .stub_times("get application root", 1, reply::exit(1, "", "NotFound"));
        self.exec.stub(
            "get application root",
            reply::ok(healthy_app("root", &["infra", "workloads"]).to_string()),
        );
        self.exec.stub(
            "get application infra",
            reply::ok(healthy_app("infra", &[]).to_string()),
        );
        self.exec.stub(
            "get application workloads",
            reply::ok(healthy_app("workloads", &[]).to_string()),
        );
        let listing = serde_json::json!({
            "items": [
                healthy_app("root", &["infra", "workloads"]),
                healthy_app("infra", &[]),
                healthy_app("workloads", &[]),
            ]
        });
        self.exec
            .stub("applications.argoproj.io", reply::ok(listing.to_string()));
    }

    fn orchestrator(&self, cfg: RunConfig, probe_ready: bool, cancel: CancelToken) -> Orchestrator {
        Orchestrator::new(
            cfg,
            host_profile(),
            self.exec.clone(),
            self.reporter.clone(),
            Arc::new(AutoConfirmer),
            Arc::new(FixedProbe(probe_ready)),
            self.ledger.clone(),
            cancel,
            self.paths.clone(),
        )
        .with_memory_reading(MemoryReading::new(32_000, 24_000))
        .with_api_deadline(Duration::from_millis(50))
        .with_cancel_grace(Duration::from_millis(10))
    }
}

fn cfg(name: &str) -> RunConfig {
    let mut args = BootstrapArgs::default();
    args.name = Some(name.to_string());
    args.deployment_mode = Some("oss-tenant".to_string());
    args.nodes = Some(1);
    RunConfig::resolve(&args, &EnvOverrides::default()).unwrap()
}

#[tokio::test]
async fn test_happy_path_bootstrap_converges() {
    let fx = Fixture::new();
    fx.stub_happy_path();

    fx.orchestrator(cfg("demo-1"), true, CancelToken::never())
        .run()
        .await
        .unwrap();

    // The pipeline ran in order.
    assert_eq!(fx.exec.call_count("cluster create"), 1);
    assert_eq!(fx.exec.call_count("upgrade --install argocd"), 1);
    assert_eq!(fx.exec.call_count("apply -f -"), 1);
    assert!(fx.paths.root.join("kubeconfig").exists());
    assert!(fx.paths.values.exists());

    // The ledger recorded every orchestrator state.
    let ledger = std::fs::read_to_string(&fx.paths.ledger).unwrap();
    for state in [
        "preflight",
        "create_cluster",
        "install_controller",
        "register_root",
        "await_convergence",
    ] {
        assert!(ledger.contains(&format!("\"state\":\"{}\"", state)), "missing {state}");
    }

    let succeeded = fx
        .reporter
        .events()
        .iter()
        .any(|e| matches!(e, ReporterEvent::Succeed(p) if p.contains("demo-1 is ready")));
    assert!(succeeded);
}

#[tokio::test]
async fn test_low_memory_with_force_still_converges() {
    let fx = Fixture::new();
    fx.stub_happy_path();

    let mut config = cfg("demo-1");
    config.force = true;
    let orchestrator = fx
        .orchestrator(config, true, CancelToken::never())
        .with_memory_reading(MemoryReading::new(18_000, 24_000));

    orchestrator.run().await.unwrap();
    assert!(fx
        .reporter
        .warnings()
        .iter()
        .any(|w| w.contains("18000 MB")));
}

#[tokio::test]
async fn test_values_document_reflects_forked_source() {
    let fx = Fixture::new();
    fx.stub_happy_path();

    let mut args = BootstrapArgs::default();
    args.name = Some("demo-1".to_string());
    args.deployment_mode = Some("saas-shared".to_string());
    args.non_interactive = true;
    args.nodes = Some(1);
    args.repo = Some("https://example.invalid/fork".to_string());
    args.branch = Some("dev".to_string());
    let config = RunConfig::resolve(&args, &EnvOverrides::default()).unwrap();

    fx.orchestrator(config, true, CancelToken::never())
        .run()
        .await
        .unwrap();

    let values = std::fs::read_to_string(&fx.paths.values).unwrap();
    assert!(values.contains("mode: saas-shared"));

    let clone = fx
        .exec
        .calls()
        .into_iter()
        .find(|c| c.contains("git clone"))
        .unwrap();
    assert!(clone.contains("https://example.invalid/fork"));
    assert!(clone.contains("--branch dev"));
}

#[tokio::test]
async fn test_occupied_api_port_aborts_without_kubeconfig() {
    let fx = Fixture::new();
    fx.exec.stub("cluster list", reply::ok("[]"));

    // Keep 6443 (or whatever is there already) occupied for the duration.
    let _listener = TcpListener::bind(("127.0.0.1", 6443)).ok();

    let err = fx
        .orchestrator(cfg("demo-1"), true, CancelToken::never())
        .run()
        .await
        .unwrap_err();
    match &err {
        RunError::Cluster(ClusterError::PortInUse(port)) => assert_eq!(*port, 6443),
        other => panic!("unexpected: {other}"),
    }
    assert_eq!(exit_code(&err), 4);
    assert_eq!(fx.exec.call_count("cluster create"), 0);
    assert!(!fx.paths.root.join("kubeconfig").exists());

    let remediation = fx
        .reporter
        .events()
        .iter()
        .any(|e| matches!(e, ReporterEvent::Info(l) if l.contains("cluster cleanup demo-1")));
    assert!(remediation, "remediation hint expected");
}

#[tokio::test]
async fn test_unreachable_api_rolls_back_when_enabled() {
    let fx = Fixture::new();
    fx.exec.stub_times("cluster list", 1, reply::ok("[]"));
    fx.exec.stub(
        "cluster list",
        reply::ok(r#"[{"name":"demo-1","serversCount":1,"serversRunning":1,"agentsCount":0,"agentsRunning":0}]"#),
    );
    fx.exec.stub("kubeconfig get demo-1", reply::ok(KUBECONFIG));

    // Interactive, no --force: rollback is enabled.
    let err = fx
        .orchestrator(cfg("demo-1"), false, CancelToken::never())
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::Cluster(ClusterError::ApiUnreachable(_))));
    assert_eq!(fx.exec.call_count("cluster delete demo-1"), 1);
}

#[tokio::test]
async fn test_unreachable_api_keeps_artifacts_with_force() {
    let fx = Fixture::new();
    fx.exec.stub("cluster list", reply::ok("[]"));
    fx.exec.stub("kubeconfig get demo-1", reply::ok(KUBECONFIG));

    let mut config = cfg("demo-1");
    config.force = true;
    let err = fx
        .orchestrator(config, false, CancelToken::never())
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::Cluster(ClusterError::ApiUnreachable(_))));
    assert_eq!(fx.exec.call_count("cluster delete"), 0);

    let remediation = fx
        .reporter
        .events()
        .iter()
        .any(|e| matches!(e, ReporterEvent::Info(l) if l.contains("cluster cleanup demo-1")));
    assert!(remediation, "remediation hint expected");
}

#[tokio::test]
async fn test_convergence_timeout_leaves_cluster_running() {
    let fx = Fixture::new();
    fx.stub_happy_path();

    let mut config = cfg("demo-1");
    // A zero deadline forces the timeout branch immediately.
    config.timeout_minutes = 0;
    let err = fx
        .orchestrator(config, true, CancelToken::never())
        .run()
        .await
        .unwrap_err();
    match &err {
        RunError::Chart(ChartError::Convergence(ConvergenceError::Timeout { snapshot, .. })) => {
            assert_eq!(snapshot.len(), 1);
            assert_eq!(snapshot[0].name, "root");
        }
        other => panic!("unexpected: {other}"),
    }
    assert_eq!(exit_code(&err), 5);
    assert_eq!(fx.exec.call_count("cluster delete"), 0);
}

#[tokio::test]
async fn test_cancel_before_work_exits_130() {
    let fx = Fixture::new();
    let source = CancelSource::new();
    source.cancel();

    let err = fx
        .orchestrator(cfg("demo-1"), true, source.token())
        .run()
        .await
        .unwrap_err();
    assert_eq!(exit_code(&err), 130);
    assert_eq!(fx.exec.call_count("cluster create"), 0);
}

#[tokio::test]
async fn test_bootstrap_is_idempotent_when_rerun() {
    // Second run against the state the first run left behind: the cluster
    // exists, so the engine refuses the name instead of mutating it.
    let fx = Fixture::new();
    fx.exec.stub(
        "cluster list",
        reply::ok(r#"[{"name":"demo-1","serversCount":1,"serversRunning":1,"agentsCount":0,"agentsRunning":0}]"#),
    );

    let err = fx
        .orchestrator(cfg("demo-1"), true, CancelToken::never())
        .run()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RunError::Cluster(ClusterError::NameConflict(_))
    ));
}
