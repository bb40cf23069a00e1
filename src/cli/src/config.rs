//! Run configuration resolution.
//!
//! Precedence, highest first: command-line flags → environment variables →
//! values file → built-in defaults. The aggregate is validated before any
//! side effect; rejection is deterministic and maps to the usage exit code.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::commands::BootstrapArgs;
use crate::error::UsageError;

/// Default Git source of the app-of-apps charts.
pub const DEFAULT_REPO: &str = "https://github.com/bosun-dev/bosun-charts";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_CLUSTER_NAME: &str = "bosun";
pub const DEFAULT_NODE_COUNT: u32 = 3;
const MAX_NODE_COUNT: u32 = 50;

/// Which shape of environment the charts deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentMode {
    OssTenant,
    SaasTenant,
    SaasShared,
    #[default]
    Unset,
}

impl DeploymentMode {
    pub const CHOICES: [&'static str; 3] = ["oss-tenant", "saas-tenant", "saas-shared"];

    pub fn is_set(self) -> bool {
        self != DeploymentMode::Unset
    }
}

impl std::str::FromStr for DeploymentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oss-tenant" => Ok(DeploymentMode::OssTenant),
            "saas-tenant" => Ok(DeploymentMode::SaasTenant),
            "saas-shared" => Ok(DeploymentMode::SaasShared),
            other => Err(format!(
                "unknown deployment mode {:?}, expected one of {}",
                other,
                Self::CHOICES.join(", ")
            )),
        }
    }
}

impl std::fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeploymentMode::OssTenant => "oss-tenant",
            DeploymentMode::SaasTenant => "saas-tenant",
            DeploymentMode::SaasShared => "saas-shared",
            DeploymentMode::Unset => "unset",
        };
        f.write_str(s)
    }
}

/// Environment-variable overrides recognized by the resolver.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub force: bool,
    pub non_interactive: bool,
    pub kubeconfig: Option<PathBuf>,
}

impl EnvOverrides {
    /// Read from the process environment.
    pub fn from_process() -> Self {
        let flag = |name: &str| std::env::var(name).map(|v| v == "1").unwrap_or(false);
        Self {
            force: flag("FORCE"),
            non_interactive: flag("NON_INTERACTIVE"),
            kubeconfig: std::env::var_os("KUBECONFIG").map(PathBuf::from),
        }
    }
}

/// The immutable configuration of one bootstrap run. Created before any side
/// effect; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub cluster_name: String,
    pub deployment_mode: DeploymentMode,
    pub interactive: bool,
    pub force: bool,
    pub verbose: bool,
    pub repo_url: String,
    pub branch: String,
    pub node_count: u32,
    /// Opaque Kubernetes version string; empty means provisioner default.
    #[serde(default)]
    pub kubernetes_version: String,
    /// Run-level convergence deadline.
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values_file: Option<PathBuf>,
}

fn default_timeout_minutes() -> u64 {
    30
}

impl RunConfig {
    /// Resolve flags, environment, values file, and defaults into a
    /// validated configuration.
    pub fn resolve(args: &BootstrapArgs, env: &EnvOverrides) -> Result<RunConfig, UsageError> {
        // Values file may carry a `bootstrap:` section with the same keys.
        let file_section = match &args.values {
            Some(path) => Some(load_file_section(path)?),
            None => None,
        };
        let file = file_section.unwrap_or_default();

        let deployment_mode = match &args.deployment_mode {
            Some(raw) => raw.parse::<DeploymentMode>().map_err(UsageError::new)?,
            None => file.deployment_mode.unwrap_or_default(),
        };

        let non_interactive = args.non_interactive || env.non_interactive;
        let config = RunConfig {
            cluster_name: args
                .name
                .clone()
                .or(file.cluster_name)
                .unwrap_or_else(|| DEFAULT_CLUSTER_NAME.to_string()),
            deployment_mode,
            interactive: !non_interactive,
            force: args.force || env.force,
            verbose: args.verbose,
            repo_url: args
                .repo
                .clone()
                .or(file.repo_url)
                .unwrap_or_else(|| DEFAULT_REPO.to_string()),
            branch: args
                .branch
                .clone()
                .or(file.branch)
                .unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
            node_count: args.nodes.or(file.node_count).unwrap_or(DEFAULT_NODE_COUNT),
            kubernetes_version: args
                .kubernetes_version
                .clone()
                .or(file.kubernetes_version)
                .unwrap_or_default(),
            timeout_minutes: file.timeout_minutes.unwrap_or_else(default_timeout_minutes),
            values_file: args.values.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), UsageError> {
        cluster::validate_name(&self.cluster_name)
            .map_err(|e| UsageError::new(e.to_string()))?;
        if !valid_branch(&self.branch) {
            return Err(UsageError::new(format!(
                "invalid branch {:?}: only letters, digits, and ._-/ are allowed",
                self.branch
            )));
        }
        if self.node_count < 1 || self.node_count > MAX_NODE_COUNT {
            return Err(UsageError::new(format!(
                "node count {} is out of range [1, {}]",
                self.node_count, MAX_NODE_COUNT
            )));
        }
        if !self.interactive && !self.deployment_mode.is_set() && self.values_file.is_none() {
            return Err(UsageError::new(
                "--non-interactive requires --deployment-mode or --values",
            ));
        }
        Ok(())
    }

    /// Render the configuration back into a values-file `bootstrap:`
    /// section. Reloading the result reproduces the configuration.
    pub fn render(&self) -> String {
        let doc = serde_yaml::to_string(self).expect("run config serializes");
        format!("bootstrap:\n{}", indent(&doc))
    }

    /// Reload a configuration rendered by [`render`](Self::render).
    pub fn reload(content: &str) -> Result<RunConfig, UsageError> {
        #[derive(Deserialize)]
        struct Wrapper {
            bootstrap: RunConfig,
        }
        let wrapper: Wrapper = serde_yaml::from_str(content)
            .map_err(|e| UsageError::new(format!("invalid bootstrap section: {}", e)))?;
        Ok(wrapper.bootstrap)
    }
}

/// Optional `bootstrap:` keys a values file may carry.
#[derive(Debug, Default, Deserialize)]
struct FileSection {
    cluster_name: Option<String>,
    deployment_mode: Option<DeploymentMode>,
    repo_url: Option<String>,
    branch: Option<String>,
    node_count: Option<u32>,
    kubernetes_version: Option<String>,
    timeout_minutes: Option<u64>,
}

fn load_file_section(path: &std::path::Path) -> Result<FileSection, UsageError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        UsageError::new(format!("cannot read values file {}: {}", path.display(), e))
    })?;
    let doc: serde_yaml::Value = serde_yaml::from_str(&content).map_err(|e| {
        UsageError::new(format!("values file {} is invalid: {}", path.display(), e))
    })?;
    match doc.get("bootstrap") {
        Some(section) => serde_yaml::from_value(section.clone()).map_err(|e| {
            UsageError::new(format!(
                "bootstrap section of {} is invalid: {}",
                path.display(),
                e
            ))
        }),
        None => Ok(FileSection::default()),
    }
}

fn valid_branch(branch: &str) -> bool {
    !branch.is_empty()
        && branch
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-' | b'/'))
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|l| format!("  {}", l))
        .collect::<Vec<_>>()
        .join("\n")
        + "\n"
}
