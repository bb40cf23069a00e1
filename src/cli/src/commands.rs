//! Command-line surface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "bosun",
    version,
    about = "Bootstrap a local Kubernetes environment from zero to healthy applications",
    long_about = "Bootstrap a complete local environment in one command:\n\
                  1. Preflight: validates every prerequisite (tools, memory, runtime) upfront\n\
                  2. Cluster: creates a local Kubernetes cluster\n\
                  3. Charts: installs the GitOps controller and the app-of-apps, then waits\n\
                     until every application is Synced and Healthy"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run preflight, create a cluster, install charts, wait for convergence
    Bootstrap(BootstrapArgs),
    /// Manage local clusters
    Cluster {
        #[command(subcommand)]
        command: ClusterCommands,
    },
    /// Install charts into an existing cluster
    Chart {
        #[command(subcommand)]
        command: ChartCommands,
    },
}

#[derive(Args, Debug, Default, Clone)]
pub struct BootstrapArgs {
    /// Cluster name
    pub name: Option<String>,

    /// Deployment mode (skips the selection wizard)
    #[arg(long, value_parser = crate::config::DeploymentMode::CHOICES)]
    pub deployment_mode: Option<String>,

    /// Skip all prompts; requires --deployment-mode or --values
    #[arg(long)]
    pub non_interactive: bool,

    /// Show detailed logging including sync progress
    #[arg(short, long)]
    pub verbose: bool,

    /// Continue even with insufficient memory or other warnings
    #[arg(long)]
    pub force: bool,

    /// Override the charts repository URL
    #[arg(long)]
    pub repo: Option<String>,

    /// Override the Git branch (default: main)
    #[arg(long)]
    pub branch: Option<String>,

    /// Values file merged below command-line overrides
    #[arg(long)]
    pub values: Option<PathBuf>,

    /// Number of cluster nodes
    #[arg(long)]
    pub nodes: Option<u32>,

    /// Kubernetes version for the cluster
    #[arg(long = "kubernetes-version")]
    pub kubernetes_version: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ClusterCommands {
    /// Create a local cluster
    Create {
        name: Option<String>,
        #[arg(long, default_value_t = 3)]
        nodes: u32,
        /// Kubernetes version for the cluster
        #[arg(long = "version")]
        k8s_version: Option<String>,
        /// Skip the configuration wizard
        #[arg(long)]
        skip_wizard: bool,
        #[arg(long)]
        force: bool,
    },
    /// Delete a cluster (idempotent)
    Delete {
        name: String,
        #[arg(long)]
        force: bool,
    },
    /// List local clusters
    List,
    /// Show cluster status
    Status {
        name: String,
        /// Include control-plane pod details
        #[arg(long)]
        detailed: bool,
    },
    /// Delete a cluster and remove its per-run artifacts
    Cleanup {
        name: String,
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ChartCommands {
    /// Install the GitOps controller and register the root application
    Install {
        /// Deployment mode
        #[arg(long, value_parser = crate::config::DeploymentMode::CHOICES)]
        deployment_mode: Option<String>,
        #[arg(long)]
        non_interactive: bool,
        #[arg(short, long)]
        verbose: bool,
        /// Values file merged below command-line overrides
        #[arg(long)]
        values: Option<PathBuf>,
        /// Override the charts repository URL
        #[arg(long)]
        repo: Option<String>,
        /// Override the Git branch
        #[arg(long)]
        branch: Option<String>,
    },
}
