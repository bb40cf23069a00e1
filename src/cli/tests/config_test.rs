//! Run configuration resolution and validation.

use bosun::commands::BootstrapArgs;
use bosun::{DeploymentMode, EnvOverrides, RunConfig};

fn args() -> BootstrapArgs {
    BootstrapArgs::default()
}

fn env() -> EnvOverrides {
    EnvOverrides::default()
}

#[test]
fn test_defaults_apply_when_nothing_is_given() {
    let cfg = RunConfig::resolve(&args(), &env()).unwrap();
    assert_eq!(cfg.cluster_name, "bosun");
    assert_eq!(cfg.deployment_mode, DeploymentMode::Unset);
    assert!(cfg.interactive);
    assert!(!cfg.force);
    assert_eq!(cfg.branch, "main");
    assert_eq!(cfg.node_count, 3);
    assert_eq!(cfg.timeout_minutes, 30);
}

#[test]
fn test_env_variables_apply_below_flags() {
    let e = EnvOverrides {
        force: true,
        non_interactive: true,
        kubeconfig: None,
    };
    let mut a = args();
    a.deployment_mode = Some("oss-tenant".to_string());
    let cfg = RunConfig::resolve(&a, &e).unwrap();
    assert!(cfg.force);
    assert!(!cfg.interactive);
}

#[test]
fn test_flags_beat_values_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("values.yaml");
    std::fs::write(
        &file,
        "bootstrap:\n  cluster_name: from-file\n  branch: file-branch\n  node_count: 5\n",
    )
    .unwrap();

    let mut a = args();
    a.values = Some(file);
    a.branch = Some("flag-branch".to_string());
    let cfg = RunConfig::resolve(&a, &env()).unwrap();
    assert_eq!(cfg.cluster_name, "from-file");
    assert_eq!(cfg.branch, "flag-branch");
    assert_eq!(cfg.node_count, 5);
}

#[test]
fn test_cluster_name_boundaries() {
    let mut a = args();
    a.name = Some("a".repeat(63));
    assert!(RunConfig::resolve(&a, &env()).is_ok());

    a.name = Some("a".repeat(64));
    assert!(RunConfig::resolve(&a, &env()).is_err());

    a.name = Some("Has_Caps".to_string());
    assert!(RunConfig::resolve(&a, &env()).is_err());
}

#[test]
fn test_branch_character_set_is_enforced() {
    let mut a = args();
    a.branch = Some("feature/x-1.2_ok".to_string());
    assert!(RunConfig::resolve(&a, &env()).is_ok());

    a.branch = Some("bad branch".to_string());
    assert!(RunConfig::resolve(&a, &env()).is_err());

    a.branch = Some(String::new());
    assert!(RunConfig::resolve(&a, &env()).is_err());
}

#[test]
fn test_node_count_range() {
    let mut a = args();
    a.nodes = Some(1);
    assert!(RunConfig::resolve(&a, &env()).is_ok());
    a.nodes = Some(50);
    assert!(RunConfig::resolve(&a, &env()).is_ok());
    a.nodes = Some(0);
    assert!(RunConfig::resolve(&a, &env()).is_err());
    a.nodes = Some(51);
    assert!(RunConfig::resolve(&a, &env()).is_err());
}

#[test]
fn test_non_interactive_needs_mode_or_values() {
    let mut a = args();
    a.non_interactive = true;
    assert!(RunConfig::resolve(&a, &env()).is_err());

    a.deployment_mode = Some("saas-shared".to_string());
    let cfg = RunConfig::resolve(&a, &env()).unwrap();
    assert_eq!(cfg.deployment_mode, DeploymentMode::SaasShared);

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("values.yaml");
    std::fs::write(&file, "deployment:\n  mode: oss-tenant\n").unwrap();
    let mut a = args();
    a.non_interactive = true;
    a.values = Some(file);
    assert!(RunConfig::resolve(&a, &env()).is_ok());
}

#[test]
fn test_unknown_deployment_mode_is_a_usage_error() {
    let mut a = args();
    a.deployment_mode = Some("on-prem".to_string());
    let err = RunConfig::resolve(&a, &env()).unwrap_err();
    assert!(err.to_string().contains("usage error"));
}

#[test]
fn test_rejection_is_deterministic() {
    let mut a = args();
    a.name = Some("-bad".to_string());
    let first = RunConfig::resolve(&a, &env()).unwrap_err().to_string();
    let second = RunConfig::resolve(&a, &env()).unwrap_err().to_string();
    assert_eq!(first, second);
}

#[test]
fn test_render_reload_round_trip() {
    let mut a = args();
    a.name = Some("demo-1".to_string());
    a.deployment_mode = Some("saas-tenant".to_string());
    a.repo = Some("https://example.invalid/fork".to_string());
    a.branch = Some("dev".to_string());
    a.verbose = true;
    let cfg = RunConfig::resolve(&a, &env()).unwrap();

    let rendered = cfg.render();
    let reloaded = RunConfig::reload(&rendered).unwrap();
    assert_eq!(cfg, reloaded);
}

#[test]
fn test_missing_values_file_is_a_usage_error() {
    let mut a = args();
    a.values = Some("/definitely/not/here.yaml".into());
    assert!(RunConfig::resolve(&a, &env()).is_err());
}
