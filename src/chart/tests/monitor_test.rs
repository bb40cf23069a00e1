//! Convergence monitor behavior against scripted Kubernetes client output.

use std::sync::Arc;
use std::time::Duration;

use chart::{ConvergenceError, ConvergenceMonitor, HealthState, SyncState};
use host::testing::{reply, ScriptedExecutor};
use host::CancelToken;
use report::CaptureReporter;

fn list_json(names: &[&str]) -> String {
    let items: Vec<serde_json::Value> = names
        .iter()
        .map(|n| serde_json::json!({ "metadata": { "name": n } }))
        .collect();
    serde_json::json!({ "items": items }).to_string()
}

fn app_json(name: &str, sync: &str, health: &str, children: &[&str]) -> String {
    let resources: Vec<serde_json::Value> = children
        .iter()
        .map(|c| serde_json::json!({ "kind": "Application", "name": c }))
        .collect();
    serde_json::json!({
        "metadata": { "name": name },
        "status": {
            "sync": { "status": sync },
            "health": { "status": health },
            "resources": resources,
        }
    })
    .to_string()
}

fn degraded_json(name: &str, message: &str) -> String {
    serde_json::json!({
        "metadata": { "name": name },
        "status": {
            "sync": { "status": "OutOfSync" },
            "health": { "status": "Degraded", "message": message },
        }
    })
    .to_string()
}

struct Fixture {
    exec: Arc<ScriptedExecutor>,
    reporter: Arc<CaptureReporter>,
    _dir: tempfile::TempDir,
    kubeconfig: std::path::PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let kubeconfig = dir.path().join("kubeconfig");
        std::fs::write(&kubeconfig, "apiVersion: v1\n").unwrap();
        Self {
            exec: Arc::new(ScriptedExecutor::new()),
            reporter: Arc::new(CaptureReporter::new()),
            _dir: dir,
            kubeconfig,
        }
    }

    fn monitor(&self) -> ConvergenceMonitor {
        ConvergenceMonitor::new(
            self.exec.clone(),
            self.reporter.clone(),
            CancelToken::never(),
            self.kubeconfig.clone(),
            "argocd",
            false,
        )
        .with_tick(Duration::from_millis(5))
        .with_stuck_ticks(2)
    }
}

#[tokio::test]
async fn test_children_are_discovered_and_awaited() {
    let fx = Fixture::new();
    fx.exec
        .stub("applications.argoproj.io", reply::ok(list_json(&["root"])));
    fx.exec.stub(
        "get application root",
        reply::ok(app_json("root", "Synced", "Healthy", &["infra", "workloads"])),
    );
    fx.exec.stub(
        "get application infra",
        reply::ok(app_json("infra", "Synced", "Healthy", &[])),
    );
    fx.exec.stub(
        "get application workloads",
        reply::ok(app_json("workloads", "Synced", "Healthy", &[])),
    );

    fx.monitor()
        .wait("root", Duration::from_secs(10))
        .await
        .unwrap();

    assert!(fx.exec.call_count("get application infra") >= 1);
    assert!(fx.exec.call_count("get application workloads") >= 1);
    assert!(fx.reporter.gauge_count() >= 2, "one gauge per tick expected");
}

#[tokio::test]
async fn test_zero_deadline_times_out_without_requests() {
    let fx = Fixture::new();
    let err = fx
        .monitor()
        .wait("root", Duration::ZERO)
        .await
        .unwrap_err();
    match err {
        ConvergenceError::Timeout { snapshot, .. } => {
            assert_eq!(snapshot.len(), 1);
            assert_eq!(snapshot[0].name, "root");
            assert_eq!(snapshot[0].sync, SyncState::Unknown);
        }
        other => panic!("unexpected: {other}"),
    }
    assert!(fx.exec.calls().is_empty(), "no requests may be issued");
}

#[tokio::test]
async fn test_deadline_attaches_last_snapshot() {
    let fx = Fixture::new();
    fx.exec
        .stub("applications.argoproj.io", reply::ok(list_json(&["root"])));
    fx.exec.stub(
        "get application root",
        reply::ok(app_json("root", "OutOfSync", "Progressing", &[])),
    );

    let err = fx
        .monitor()
        .wait("root", Duration::from_millis(80))
        .await
        .unwrap_err();
    match err {
        ConvergenceError::Timeout { snapshot, .. } => {
            let root = snapshot.iter().find(|a| a.name == "root").unwrap();
            assert_eq!(root.sync, SyncState::OutOfSync);
            assert_eq!(root.health, HealthState::Progressing);
        }
        other => panic!("unexpected: {other}"),
    }
}

#[tokio::test]
async fn test_unchanged_degraded_app_is_declared_stuck() {
    let fx = Fixture::new();
    fx.exec
        .stub("applications.argoproj.io", reply::ok(list_json(&["root"])));
    fx.exec.stub(
        "get application root",
        reply::ok(degraded_json("root", "ImagePullBackOff")),
    );

    let err = fx
        .monitor()
        .wait("root", Duration::from_secs(10))
        .await
        .unwrap_err();
    match err {
        ConvergenceError::Stuck { app, message, snapshot } => {
            assert_eq!(app, "root");
            assert_eq!(message, "ImagePullBackOff");
            assert!(!snapshot.is_empty());
        }
        other => panic!("unexpected: {other}"),
    }
}

#[tokio::test]
async fn test_changing_message_does_not_trip_stuck_detection() {
    let fx = Fixture::new();
    fx.exec
        .stub("applications.argoproj.io", reply::ok(list_json(&["root"])));
    // The message changes every observation, so the streak keeps resetting
    // and the run ends by deadline instead.
    fx.exec.stub_times(
        "get application root",
        1,
        reply::ok(degraded_json("root", "attempt one")),
    );
    fx.exec.stub_times(
        "get application root",
        1,
        reply::ok(degraded_json("root", "attempt two")),
    );
    fx.exec.stub_times(
        "get application root",
        1,
        reply::ok(degraded_json("root", "attempt three")),
    );
    fx.exec.stub_times(
        "get application root",
        1,
        reply::ok(degraded_json("root", "attempt four")),
    );
    fx.exec.stub(
        "get application root",
        reply::ok(app_json("root", "Synced", "Healthy", &[])),
    );

    fx.monitor()
        .wait("root", Duration::from_secs(10))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_transient_list_errors_back_off_and_recover() {
    let fx = Fixture::new();
    fx.exec
        .stub_times("applications.argoproj.io", 2, reply::spawn_error());
    fx.exec
        .stub("applications.argoproj.io", reply::ok(list_json(&["root"])));
    fx.exec.stub(
        "get application root",
        reply::ok(app_json("root", "Synced", "Healthy", &[])),
    );

    fx.monitor()
        .wait("root", Duration::from_secs(30))
        .await
        .unwrap();
    assert!(fx.exec.call_count("applications.argoproj.io") >= 3);
}

#[tokio::test]
async fn test_failed_per_app_read_shows_as_unknown() {
    let fx = Fixture::new();
    fx.exec
        .stub("applications.argoproj.io", reply::ok(list_json(&["root"])));
    fx.exec
        .stub("get application root", reply::exit(1, "", "connection refused"));

    let err = fx
        .monitor()
        .wait("root", Duration::from_millis(60))
        .await
        .unwrap_err();
    match err {
        ConvergenceError::Timeout { snapshot, .. } => {
            assert_eq!(snapshot[0].sync, SyncState::Unknown);
            assert!(snapshot[0].message.contains("connection refused"));
        }
        other => panic!("unexpected: {other}"),
    }
}
