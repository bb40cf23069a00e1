//! Integration tests for the process executor against real processes.

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use host::exec::truncated_lossy;
use host::{host_profile, CommandSpec, ExecError, Executor, HostExecutor, OutputMode};
use report::{CaptureReporter, Reporter, ReporterEvent};

fn executor() -> (HostExecutor, Arc<CaptureReporter>) {
    let reporter = Arc::new(CaptureReporter::new());
    let exec = HostExecutor::new(host_profile(), reporter.clone() as Arc<dyn Reporter>);
    (exec, reporter)
}

#[tokio::test]
async fn test_capture_collects_stdout_and_exit_code() {
    let (exec, _) = executor();
    let result = exec
        .run(CommandSpec::shell("/bin/sh", "echo hello; exit 3"))
        .await
        .unwrap();
    assert_eq!(result.exit_code, 3);
    assert_eq!(result.stdout_str(), "hello");
    assert!(!result.success());
}

#[tokio::test]
async fn test_nonzero_exit_is_not_an_error() {
    let (exec, _) = executor();
    let result = exec
        .run(CommandSpec::new("/bin/sh").arg("-c").arg("exit 7"))
        .await
        .unwrap();
    assert_eq!(result.exit_code, 7);
}

#[tokio::test]
async fn test_stdin_is_fed_to_the_child() {
    let (exec, _) = executor();
    let result = exec
        .run(
            CommandSpec::new("cat")
                .stdin_bytes("manifest: yes\n".as_bytes().to_vec()),
        )
        .await
        .unwrap();
    assert_eq!(result.stdout_str(), "manifest: yes");
}

#[tokio::test]
async fn test_spawn_failure_surfaces_as_error() {
    let (exec, _) = executor();
    let err = exec
        .run(CommandSpec::new("/definitely/not/a/binary"))
        .await
        .unwrap_err();
    assert!(matches!(err, ExecError::Spawn { .. }));
}

#[tokio::test]
async fn test_timeout_kills_the_child() {
    let (exec, _) = executor();
    let started = std::time::Instant::now();
    let err = exec
        .run(
            CommandSpec::shell("/bin/sh", "sleep 30")
                .timeout(Duration::from_millis(300)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ExecError::Timeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_stream_lines_are_prefixed_with_tool_id() {
    let (exec, reporter) = executor();
    let result = exec
        .run(
            CommandSpec::shell("/bin/sh", "echo one; echo two")
                .tool("k3d")
                .mode(OutputMode::StreamCapture),
        )
        .await
        .unwrap();
    assert_eq!(result.stdout_str(), "one\ntwo");

    let lines: Vec<String> = reporter
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ReporterEvent::Info(l) => Some(l),
            _ => None,
        })
        .collect();
    assert!(lines.contains(&"k3d | one".to_string()));
    assert!(lines.contains(&"k3d | two".to_string()));
}

#[tokio::test]
async fn test_stream_mode_captures_nothing() {
    let (exec, _) = executor();
    let result = exec
        .run(CommandSpec::shell("/bin/sh", "echo noisy").mode(OutputMode::Stream))
        .await
        .unwrap();
    assert!(result.stdout.is_empty());
}

#[test]
fn test_truncated_lossy_elides_long_output() {
    assert_eq!(truncated_lossy(b"short", 10), "short");
    let out = truncated_lossy(&[b'x'; 50], 10);
    assert_eq!(out.chars().count(), 11);
    assert!(out.ends_with('…'));
}
