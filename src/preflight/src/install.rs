//! Platform-aware tool installation.
//!
//! Linux (and the Linux-under-Windows layer) prefers the native package
//! manager and falls back to the tool's published release channel, installing
//! into `~/.local/bin`. macOS prefers Homebrew. Bare Windows is never
//! automated; the installer reports manual instructions instead.

use std::time::Duration;

use host::exec::truncated_lossy;
use host::{CommandSpec, Executor, HostProfile, OsFamily, PackageManager};

use crate::tools::ToolId;

const INSTALL_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    /// Installation is not automated on this platform.
    #[error("{tool} must be installed manually: {help}")]
    Manual { tool: String, help: String },
    #[error("installing {tool} failed: {message}")]
    Failed { tool: String, message: String },
}

/// Install a single tool with the platform-appropriate strategy.
pub async fn install(
    id: ToolId,
    profile: &HostProfile,
    executor: &dyn Executor,
) -> Result<(), InstallError> {
    if id == ToolId::Git {
        return Err(InstallError::Manual {
            tool: id.display().to_string(),
            help: install_help(id, profile),
        });
    }
    if profile.family == OsFamily::Windows {
        return Err(InstallError::Manual {
            tool: id.display().to_string(),
            help: install_help(id, profile),
        });
    }

    let spec = match plan(id, profile) {
        Some(spec) => spec,
        None => {
            return Err(InstallError::Manual {
                tool: id.display().to_string(),
                help: install_help(id, profile),
            })
        }
    };

    let result = executor
        .run(spec.timeout(INSTALL_TIMEOUT).tool(id.command()))
        .await
        .map_err(|e| InstallError::Failed {
            tool: id.display().to_string(),
            message: e.to_string(),
        })?;
    if result.success() {
        Ok(())
    } else {
        Err(InstallError::Failed {
            tool: id.display().to_string(),
            message: truncated_lossy(&result.stderr, 400),
        })
    }
}

/// The invocation that installs `id` on this host, or None when only manual
/// installation applies.
fn plan(id: ToolId, profile: &HostProfile) -> Option<CommandSpec> {
    let shell = profile.shell.to_string_lossy().into_owned();
    match (id, profile.family, profile.package_manager) {
        // Docker: package manager only; the desktop app on macOS.
        (ToolId::Docker, f, Some(pm)) if f.is_linux_like() => Some(pm_install(
            pm,
            match pm {
                PackageManager::Apt => "docker.io",
                _ => "docker",
            },
        )),
        (ToolId::Docker, OsFamily::MacOs, Some(PackageManager::Brew)) => Some(
            CommandSpec::new("brew").args(["install", "--cask", "docker"]),
        ),
        (ToolId::Docker, _, _) => None,

        (ToolId::Kubectl, OsFamily::MacOs, Some(PackageManager::Brew)) => {
            Some(CommandSpec::new("brew").args(["install", "kubectl"]))
        }
        (ToolId::Kubectl, _, _) => Some(CommandSpec::shell(
            shell,
            "set -e; mkdir -p \"$HOME/.local/bin\"; \
             ver=$(curl -fsSL https://dl.k8s.io/release/stable.txt); \
             arch=$(uname -m); case \"$arch\" in x86_64) arch=amd64;; aarch64|arm64) arch=arm64;; esac; \
             os=$(uname | tr '[:upper:]' '[:lower:]'); \
             curl -fsSL -o \"$HOME/.local/bin/kubectl\" \"https://dl.k8s.io/release/${ver}/bin/${os}/${arch}/kubectl\"; \
             chmod +x \"$HOME/.local/bin/kubectl\"",
        )),

        (ToolId::K3d, OsFamily::MacOs, Some(PackageManager::Brew)) => {
            Some(CommandSpec::new("brew").args(["install", "k3d"]))
        }
        (ToolId::K3d, _, _) => Some(CommandSpec::shell(
            shell,
            "curl -fsSL https://raw.githubusercontent.com/k3d-io/k3d/main/install.sh | bash",
        )),

        (ToolId::Helm, OsFamily::MacOs, Some(PackageManager::Brew)) => {
            Some(CommandSpec::new("brew").args(["install", "helm"]))
        }
        (ToolId::Helm, _, _) => Some(CommandSpec::shell(
            shell,
            "curl -fsSL https://raw.githubusercontent.com/helm/helm/main/scripts/get-helm-3 | bash",
        )),

        (ToolId::Mkcert, f, Some(pm)) if f.is_linux_like() => Some(pm_install(pm, "mkcert")),
        (ToolId::Mkcert, OsFamily::MacOs, Some(PackageManager::Brew)) => {
            Some(CommandSpec::new("brew").args(["install", "mkcert"]))
        }
        (ToolId::Mkcert, _, _) => None,

        (ToolId::Git, _, _) => None,
    }
}

fn pm_install(pm: PackageManager, package: &str) -> CommandSpec {
    match pm {
        PackageManager::Apt => CommandSpec::new("sudo").args(["apt-get", "install", "-y", package]),
        PackageManager::Dnf => CommandSpec::new("sudo").args(["dnf", "install", "-y", package]),
        PackageManager::Pacman => {
            CommandSpec::new("sudo").args(["pacman", "-S", "--noconfirm", package])
        }
        PackageManager::Brew => CommandSpec::new("brew").args(["install", package]),
    }
}

/// Manual installation instructions shown on opt-out or install failure.
pub fn install_help(id: ToolId, profile: &HostProfile) -> String {
    match id {
        ToolId::Docker => match profile.family {
            OsFamily::MacOs => "Docker: install Docker Desktop from https://docs.docker.com/desktop/install/mac-install/".to_string(),
            OsFamily::Windows => "Docker: install Docker Desktop from https://docs.docker.com/desktop/install/windows-install/".to_string(),
            _ => "Docker: https://docs.docker.com/engine/install/ (e.g. sudo apt-get install docker.io)".to_string(),
        },
        ToolId::Kubectl => "kubectl: https://kubernetes.io/docs/tasks/tools/".to_string(),
        ToolId::K3d => "k3d: https://k3d.io/stable/#installation".to_string(),
        ToolId::Helm => "Helm: https://helm.sh/docs/intro/install/".to_string(),
        ToolId::Git => match profile.family {
            OsFamily::MacOs => "Git: run xcode-select --install or brew install git".to_string(),
            OsFamily::Windows => "Git: https://git-scm.com/download/win".to_string(),
            _ => "Git: install with your package manager (e.g. sudo apt-get install git)".to_string(),
        },
        ToolId::Mkcert => "mkcert: https://github.com/FiloSottile/mkcert#installation".to_string(),
    }
}
