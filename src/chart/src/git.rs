//! Git working-copy management for the root application source.

use std::path::Path;
use std::time::Duration;

use host::exec::truncated_lossy;
use host::{CommandSpec, Executor};

use crate::error::ChartError;

const CLONE_TIMEOUT: Duration = Duration::from_secs(300);

/// A revision made of 7 to 40 hex digits is treated as a commit id; shallow
/// clones cannot fetch those directly.
pub fn is_commit_id(revision: &str) -> bool {
    revision.len() >= 7
        && revision.len() <= 40
        && revision.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Clone `url` at `revision` into `dest`, replacing any previous working
/// copy. Branches and tags use a shallow depth-1 clone; commit ids fall back
/// to a full clone plus checkout.
pub async fn clone_repo(
    executor: &dyn Executor,
    url: &str,
    revision: &str,
    dest: &Path,
) -> Result<(), ChartError> {
    if dest.exists() {
        std::fs::remove_dir_all(dest)?;
    }
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if is_commit_id(revision) {
        run_git(
            executor,
            CommandSpec::new("git")
                .arg("clone")
                .arg(url)
                .host_path(dest)
                .timeout(CLONE_TIMEOUT),
        )
        .await?;
        run_git(
            executor,
            CommandSpec::new("git")
                .arg("-C")
                .host_path(dest)
                .args(["checkout", revision])
                .timeout(Duration::from_secs(60)),
        )
        .await
    } else {
        run_git(
            executor,
            CommandSpec::new("git")
                .args(["clone", "--depth", "1", "--branch", revision])
                .arg(url)
                .host_path(dest)
                .timeout(CLONE_TIMEOUT),
        )
        .await
    }
}

async fn run_git(executor: &dyn Executor, spec: CommandSpec) -> Result<(), ChartError> {
    let result = executor.run(spec.tool("git")).await?;
    if result.success() {
        Ok(())
    } else {
        Err(ChartError::Git(truncated_lossy(&result.stderr, 800)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_ids_are_hex_of_plausible_length() {
        assert!(is_commit_id("abc1234"));
        assert!(is_commit_id("0123456789abcdef0123456789abcdef01234567"));
        assert!(!is_commit_id("main"));
        assert!(!is_commit_id("dev"));
        assert!(!is_commit_id("feature/x-123"));
        assert!(!is_commit_id("abc123")); // too short
    }
}
