//! Host OS discovery and executable lookup.
//!
//! Discovery runs once; the profile is cached for the process lifetime and
//! treated as read-only afterwards.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// OS family of the host, including the Linux-under-Windows layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Linux,
    MacOs,
    Windows,
    /// Linux userland running on a Windows host with translated filesystem
    /// semantics (drive letters visible under /mnt).
    WindowsLinuxLayer,
    Other,
}

impl OsFamily {
    pub fn is_linux_like(self) -> bool {
        matches!(self, OsFamily::Linux | OsFamily::WindowsLinuxLayer)
    }
}

impl std::fmt::Display for OsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OsFamily::Linux => "linux",
            OsFamily::MacOs => "macos",
            OsFamily::Windows => "windows",
            OsFamily::WindowsLinuxLayer => "windows-linux-layer",
            OsFamily::Other => "other",
        };
        f.write_str(s)
    }
}

/// Native package manager found on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Dnf,
    Pacman,
    Brew,
}

impl PackageManager {
    pub fn command(self) -> &'static str {
        match self {
            PackageManager::Apt => "apt-get",
            PackageManager::Dnf => "dnf",
            PackageManager::Pacman => "pacman",
            PackageManager::Brew => "brew",
        }
    }
}

/// Discovered host facts. Populated once at startup, read-only thereafter.
#[derive(Debug, Clone)]
pub struct HostProfile {
    pub family: OsFamily,
    pub package_manager: Option<PackageManager>,
    /// Shell used for explicit "run shell" invocations (inline install
    /// scripts); engines never concatenate arguments themselves.
    pub shell: PathBuf,
}

static PROFILE: OnceLock<HostProfile> = OnceLock::new();

/// The process-wide host profile.
pub fn host_profile() -> &'static HostProfile {
    PROFILE.get_or_init(discover)
}

fn discover() -> HostProfile {
    let family = detect_family();
    let package_manager = detect_package_manager(family);
    let shell = detect_shell(family);
    tracing::debug!(
        family = %family,
        package_manager = ?package_manager,
        shell = %shell.display(),
        "host profile discovered"
    );
    HostProfile {
        family,
        package_manager,
        shell,
    }
}

#[cfg(target_os = "macos")]
fn detect_family() -> OsFamily {
    OsFamily::MacOs
}

#[cfg(target_os = "windows")]
fn detect_family() -> OsFamily {
    OsFamily::Windows
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn detect_family() -> OsFamily {
    match std::fs::read_to_string("/proc/version") {
        Ok(version) => {
            let lower = version.to_lowercase();
            if lower.contains("microsoft") || lower.contains("wsl") {
                OsFamily::WindowsLinuxLayer
            } else {
                OsFamily::Linux
            }
        }
        Err(_) if cfg!(target_os = "linux") => OsFamily::Linux,
        Err(_) => OsFamily::Other,
    }
}

fn detect_package_manager(family: OsFamily) -> Option<PackageManager> {
    let candidates: &[PackageManager] = match family {
        OsFamily::Linux | OsFamily::WindowsLinuxLayer => {
            &[PackageManager::Apt, PackageManager::Dnf, PackageManager::Pacman]
        }
        OsFamily::MacOs => &[PackageManager::Brew],
        _ => &[],
    };
    candidates
        .iter()
        .copied()
        .find(|pm| find_executable(pm.command()).is_some())
}

fn detect_shell(family: OsFamily) -> PathBuf {
    match family {
        OsFamily::Windows => PathBuf::from("cmd.exe"),
        _ => PathBuf::from("/bin/sh"),
    }
}

/// Well-known install locations consulted in addition to PATH.
fn extra_search_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![
        PathBuf::from("/usr/local/bin"),
        PathBuf::from("/opt/homebrew/bin"),
    ];
    if let Some(home) = std::env::var_os("HOME") {
        dirs.push(Path::new(&home).join(".local/bin"));
        dirs.push(Path::new(&home).join("bin"));
    }
    dirs
}

/// Locate an executable by name on PATH or in well-known install locations.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let name_path = Path::new(name);
    if name_path.is_absolute() {
        return is_executable(name_path).then(|| name_path.to_path_buf());
    }

    let path_var = std::env::var_os("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&path_var).chain(extra_search_dirs()) {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.is_file()
        && std::fs::metadata(path)
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
