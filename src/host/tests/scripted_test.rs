//! Sanity tests for the scripted test executor itself.

use host::testing::{reply, ScriptedExecutor};
use host::{CommandSpec, Executor};

#[tokio::test]
async fn test_rules_match_in_insertion_order_and_expire() {
    let exec = ScriptedExecutor::new();
    exec.stub_times("helm upgrade", 1, reply::exit(1, "", "release failed"));
    exec.stub("helm upgrade", reply::ok("deployed"));

    let first = exec
        .run(CommandSpec::new("helm").args(["upgrade", "--install", "argocd"]))
        .await
        .unwrap();
    assert_eq!(first.exit_code, 1);

    let second = exec
        .run(CommandSpec::new("helm").args(["upgrade", "--install", "argocd"]))
        .await
        .unwrap();
    assert_eq!(second.exit_code, 0);
    assert_eq!(second.stdout_str(), "deployed");

    assert_eq!(exec.call_count("helm upgrade"), 2);
}

#[tokio::test]
async fn test_unmatched_commands_succeed_with_empty_output() {
    let exec = ScriptedExecutor::new();
    let result = exec.run(CommandSpec::new("kubectl").arg("version")).await.unwrap();
    assert!(result.success());
    assert!(result.stdout.is_empty());
}
