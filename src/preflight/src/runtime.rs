//! Container runtime (Docker) probing and start.
//!
//! Starting the daemon is owned by the gate, not the installer: "installed
//! but not running" is a distinct state with its own remediation.

use std::time::{Duration, Instant};

use host::{CancelToken, CommandSpec, Executor, HostProfile, OsFamily};

use crate::tools::PROBE_TIMEOUT;

const START_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// True when the docker binary resolves and answers `--version`.
pub async fn binary_present(executor: &dyn Executor) -> bool {
    let spec = CommandSpec::new("docker")
        .arg("--version")
        .timeout(PROBE_TIMEOUT);
    matches!(executor.run(spec).await, Ok(r) if r.success())
}

/// True when the daemon answers; listing containers is the operational probe.
pub async fn is_operational(executor: &dyn Executor) -> bool {
    let spec = CommandSpec::new("docker").arg("ps").timeout(PROBE_TIMEOUT);
    matches!(executor.run(spec).await, Ok(r) if r.success())
}

/// Attempt to start the daemon. The caller polls [`is_operational`]
/// afterwards; a clean exit here does not mean the daemon is up yet.
pub async fn start(profile: &HostProfile, executor: &dyn Executor) -> Result<(), String> {
    let spec = match profile.family {
        OsFamily::Linux | OsFamily::WindowsLinuxLayer => {
            CommandSpec::new("sudo").args(["systemctl", "start", "docker"])
        }
        OsFamily::MacOs => CommandSpec::new("open").args(["-a", "Docker"]),
        _ => return Err(start_instructions(profile.family)),
    };
    match executor.run(spec.tool("docker")).await {
        Ok(result) if result.success() => Ok(()),
        Ok(result) => Err(result.stderr_str()),
        Err(e) => Err(e.to_string()),
    }
}

/// Poll until the daemon answers or the deadline elapses.
pub async fn wait_operational(
    executor: &dyn Executor,
    cancel: &CancelToken,
    deadline: Duration,
) -> bool {
    let started = Instant::now();
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        if is_operational(executor).await {
            return true;
        }
        let elapsed = started.elapsed();
        if elapsed >= deadline {
            return false;
        }
        let nap = START_POLL_INTERVAL.min(deadline - elapsed);
        tokio::time::sleep(nap).await;
    }
}

/// Platform-specific instructions for starting the daemon manually.
pub fn start_instructions(family: OsFamily) -> String {
    match family {
        OsFamily::MacOs => "Open Docker Desktop or run: open -a Docker".to_string(),
        OsFamily::Linux | OsFamily::WindowsLinuxLayer => "Run: sudo systemctl start docker".to_string(),
        OsFamily::Windows => "Start Docker Desktop from the Start Menu".to_string(),
        OsFamily::Other => "Verify Docker is running: docker ps".to_string(),
    }
}
