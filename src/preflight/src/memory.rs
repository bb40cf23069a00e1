//! System memory probe.

use host::{CommandSpec, Executor, HostProfile, OsFamily};

/// Recommended available memory for a full environment, in megabytes.
pub const RECOMMENDED_MEMORY_MB: u64 = 24_000;

/// Pair of available and recommended memory, captured once at preflight
/// entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryReading {
    pub available_mb: u64,
    pub recommended_mb: u64,
}

impl MemoryReading {
    pub fn new(available_mb: u64, recommended_mb: u64) -> Self {
        Self {
            available_mb,
            recommended_mb,
        }
    }

    /// Available memory meeting the recommendation exactly is sufficient.
    pub fn sufficient(&self) -> bool {
        self.available_mb >= self.recommended_mb
    }
}

/// Read available memory for the host. When the probe fails the reading is
/// reported as sufficient so a broken probe never blocks a run; the scan
/// result is logged either way.
pub async fn read_memory(profile: &HostProfile, executor: &dyn Executor) -> MemoryReading {
    let available = match profile.family {
        OsFamily::Linux | OsFamily::WindowsLinuxLayer => read_proc_meminfo(),
        OsFamily::MacOs => read_sysctl(executor).await,
        _ => None,
    };
    match available {
        Some(mb) => {
            tracing::debug!(available_mb = mb, "memory probe");
            MemoryReading::new(mb, RECOMMENDED_MEMORY_MB)
        }
        None => {
            tracing::warn!("memory probe failed, assuming sufficient memory");
            MemoryReading::new(RECOMMENDED_MEMORY_MB, RECOMMENDED_MEMORY_MB)
        }
    }
}

/// MemAvailable from /proc/meminfo, in MB.
fn read_proc_meminfo() -> Option<u64> {
    let content = std::fs::read_to_string("/proc/meminfo").ok()?;
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("MemAvailable:") {
            let kb: u64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
            return Some(kb / 1024);
        }
    }
    None
}

/// Total physical memory via sysctl, in MB.
async fn read_sysctl(executor: &dyn Executor) -> Option<u64> {
    let result = executor
        .run(CommandSpec::new("sysctl").args(["-n", "hw.memsize"]))
        .await
        .ok()?;
    if !result.success() {
        return None;
    }
    let bytes: u64 = result.stdout_str().parse().ok()?;
    Some(bytes / (1024 * 1024))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_to_recommended_is_sufficient() {
        assert!(MemoryReading::new(24_000, 24_000).sufficient());
        assert!(!MemoryReading::new(23_999, 24_000).sufficient());
        assert!(MemoryReading::new(32_000, 24_000).sufficient());
    }
}
