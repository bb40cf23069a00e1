//! Handlers for the `cluster` and `chart` subcommand trees.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chart::{ChartEngine, ChartSpec, ValuesResolution};
use chrono::Utc;
use cluster::{ApiProbe, ClusterEngine, ClusterHandle, ClusterSpec};
use host::{CancelToken, Executor};
use report::{Confirmer, Reporter};

use crate::commands::{ChartCommands, ClusterCommands};
use crate::config::{DeploymentMode, EnvOverrides, DEFAULT_BRANCH, DEFAULT_CLUSTER_NAME, DEFAULT_REPO};
use crate::error::{RunError, UsageError};
use crate::runs::RunPaths;

/// Shared wiring for one-shot subcommands.
pub struct Context {
    pub executor: Arc<dyn Executor>,
    pub reporter: Arc<dyn Reporter>,
    pub confirmer: Arc<dyn Confirmer>,
    pub probe: Arc<dyn ApiProbe>,
    pub cancel: CancelToken,
    pub paths: RunPaths,
}

impl Context {
    fn cluster_engine(&self, verbose: bool) -> ClusterEngine {
        ClusterEngine::new(
            self.executor.clone(),
            self.reporter.clone(),
            self.probe.clone(),
            self.cancel.clone(),
            self.paths.runs_root.clone(),
            self.paths.root.clone(),
            verbose,
        )
    }
}

pub async fn run_cluster(ctx: &Context, command: ClusterCommands) -> Result<(), RunError> {
    match command {
        ClusterCommands::Create {
            name,
            nodes,
            k8s_version,
            skip_wizard: _,
            force: _,
        } => {
            let name = name.unwrap_or_else(|| DEFAULT_CLUSTER_NAME.to_string());
            let spec = ClusterSpec::new(name, nodes).with_version(k8s_version.unwrap_or_default());
            let handle = ctx.cluster_engine(false).create(&spec).await?;
            ctx.reporter
                .info(&format!("kubeconfig: {}", handle.kubeconfig_path.display()));
            Ok(())
        }
        ClusterCommands::Delete { name, force: _ } => {
            ctx.cluster_engine(false).delete(&name).await?;
            Ok(())
        }
        ClusterCommands::List => {
            let rows = ctx.cluster_engine(false).list().await?;
            let mut table = vec![vec![
                "Name".to_string(),
                "Status".to_string(),
                "Nodes".to_string(),
                "Age".to_string(),
            ]];
            for row in rows {
                table.push(vec![row.name, row.status, row.nodes, row.age]);
            }
            ctx.reporter.table(&table);
            Ok(())
        }
        ClusterCommands::Status { name, detailed } => {
            let report = ctx.cluster_engine(false).status(&name).await?;
            let mut table = vec![
                vec!["Cluster".to_string(), report.name.clone()],
                vec!["Status".to_string(), report.status.clone()],
                vec!["Nodes".to_string(), report.nodes.clone()],
            ];
            if let Some(endpoint) = &report.endpoint {
                table.push(vec!["Endpoint".to_string(), endpoint.clone()]);
            }
            ctx.reporter.table(&table);
            if detailed && !report.pods.is_empty() {
                let mut pods = vec![vec!["Pod".to_string(), "Phase".to_string()]];
                for (name, phase) in report.pods {
                    pods.push(vec![name, phase]);
                }
                ctx.reporter.table(&pods);
            }
            Ok(())
        }
        ClusterCommands::Cleanup { name, force: _ } => {
            ctx.cluster_engine(false).cleanup(&name).await?;
            Ok(())
        }
    }
}

pub async fn run_chart(ctx: &Context, command: ChartCommands) -> Result<(), RunError> {
    let ChartCommands::Install {
        deployment_mode,
        non_interactive,
        verbose,
        values,
        repo,
        branch,
    } = command;

    let env = EnvOverrides::from_process();
    let non_interactive = non_interactive || env.non_interactive;
    let mode = match &deployment_mode {
        Some(raw) => raw
            .parse::<DeploymentMode>()
            .map_err(UsageError::new)
            .map_err(RunError::from)?,
        None => DeploymentMode::Unset,
    };
    if non_interactive && !mode.is_set() && values.is_none() {
        return Err(UsageError::new("--non-interactive requires --deployment-mode or --values").into());
    }

    // Without a cluster of our own, the Kubernetes client config comes from
    // the environment.
    let kubeconfig = env
        .kubeconfig
        .clone()
        .or_else(|| dirs::home_dir().map(|h| h.join(".kube/config")))
        .filter(|p| p.exists())
        .ok_or_else(|| {
            RunError::Other("no kubeconfig found; set KUBECONFIG or run `bosun bootstrap`".into())
        })?;
    let handle = handle_from_kubeconfig(kubeconfig);

    let mut resolution = ValuesResolution {
        file: values,
        ..Default::default()
    };
    if mode.is_set() {
        resolution
            .overrides
            .push(("deployment.mode".to_string(), mode.to_string()));
    } else if !non_interactive {
        let options: Vec<String> = DeploymentMode::CHOICES.iter().map(|c| c.to_string()).collect();
        if let Some(choice) = ctx.confirmer.select_one("Select deployment mode", &options) {
            resolution
                .wizard
                .push(("deployment.mode".to_string(), choice));
        }
    }
    resolution
        .render_to(&ctx.paths.values)
        .map_err(RunError::Chart)?;

    let engine = ChartEngine::new(
        ctx.executor.clone(),
        ctx.reporter.clone(),
        ctx.cancel.clone(),
        ctx.paths.root.clone(),
        verbose,
    );
    engine
        .install_gitops_controller(&handle, &ctx.paths.values)
        .await?;
    let spec = ChartSpec::new(
        repo.unwrap_or_else(|| DEFAULT_REPO.to_string()),
        branch.unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
    );
    let root = engine.register_root_app(&handle, &spec).await?;
    engine
        .wait_for_convergence(&handle, &root, Duration::from_secs(30 * 60))
        .await?;
    Ok(())
}

fn handle_from_kubeconfig(path: PathBuf) -> ClusterHandle {
    let endpoint = std::fs::read_to_string(&path)
        .ok()
        .and_then(|content| {
            content.lines().find_map(|line| {
                line.trim()
                    .strip_prefix("server:")
                    .map(|v| v.trim().to_string())
            })
        })
        .unwrap_or_default();
    ClusterHandle {
        name: "external".to_string(),
        api_endpoint: endpoint,
        kubeconfig_path: path,
        created_at: Utc::now(),
    }
}
