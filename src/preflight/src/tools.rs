//! The preflight tool catalog.
//!
//! New tools are added by appending a descriptor here; the gate iterates the
//! catalog and never matches on individual tools outside of install
//! dispatch.

use std::sync::OnceLock;
use std::time::Duration;

use host::{CommandSpec, Executor};

/// Presence probes must answer within this window.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Identifier of a required external tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolId {
    Docker,
    Kubectl,
    K3d,
    Helm,
    Git,
    Mkcert,
}

impl ToolId {
    /// Executable name on the search path.
    pub fn command(self) -> &'static str {
        match self {
            ToolId::Docker => "docker",
            ToolId::Kubectl => "kubectl",
            ToolId::K3d => "k3d",
            ToolId::Helm => "helm",
            ToolId::Git => "git",
            ToolId::Mkcert => "mkcert",
        }
    }

    /// Human-facing name.
    pub fn display(self) -> &'static str {
        match self {
            ToolId::Docker => "Docker",
            ToolId::Kubectl => "kubectl",
            ToolId::K3d => "k3d",
            ToolId::Helm => "Helm",
            ToolId::Git => "Git",
            ToolId::Mkcert => "mkcert",
        }
    }
}

impl std::fmt::Display for ToolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display())
    }
}

/// Which phase of the run needs the tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCategory {
    Cluster,
    Chart,
}

/// One entry in the preflight catalog.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub id: ToolId,
    pub category: ToolCategory,
    /// False for tools whose installation is never automated (Git).
    pub installable: bool,
    /// Arguments of the cheap presence probe. For Docker this is the
    /// operational probe; a dormant daemon is reclassified by the gate.
    pub probe_args: &'static [&'static str],
}

static CATALOG: OnceLock<Vec<ToolDescriptor>> = OnceLock::new();

/// The process-wide tool catalog.
pub fn catalog() -> &'static [ToolDescriptor] {
    CATALOG.get_or_init(|| {
        vec![
            ToolDescriptor {
                id: ToolId::Docker,
                category: ToolCategory::Cluster,
                installable: true,
                probe_args: &["ps"],
            },
            ToolDescriptor {
                id: ToolId::Kubectl,
                category: ToolCategory::Cluster,
                installable: true,
                probe_args: &["version", "--client"],
            },
            ToolDescriptor {
                id: ToolId::K3d,
                category: ToolCategory::Cluster,
                installable: true,
                probe_args: &["version"],
            },
            ToolDescriptor {
                id: ToolId::Helm,
                category: ToolCategory::Cluster,
                installable: true,
                probe_args: &["version", "--short"],
            },
            ToolDescriptor {
                id: ToolId::Git,
                category: ToolCategory::Chart,
                installable: false,
                probe_args: &["--version"],
            },
            ToolDescriptor {
                id: ToolId::Mkcert,
                category: ToolCategory::Chart,
                installable: true,
                probe_args: &["-version"],
            },
        ]
    })
}

/// Cheap presence probe: the executable resolves and answers its version-like
/// subcommand with exit 0 within [`PROBE_TIMEOUT`]. A non-zero exit means
/// "not present".
pub async fn is_present(descriptor: &ToolDescriptor, executor: &dyn Executor) -> bool {
    let spec = CommandSpec::new(descriptor.id.command())
        .args(descriptor.probe_args.iter().copied())
        .timeout(PROBE_TIMEOUT)
        .tool(descriptor.id.command());
    matches!(executor.run(spec).await, Ok(result) if result.success())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lists_every_tool_once() {
        let ids: Vec<ToolId> = catalog().iter().map(|d| d.id).collect();
        assert_eq!(ids.len(), 6);
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn git_is_the_only_non_installable() {
        let manual: Vec<ToolId> = catalog()
            .iter()
            .filter(|d| !d.installable)
            .map(|d| d.id)
            .collect();
        assert_eq!(manual, vec![ToolId::Git]);
    }
}
