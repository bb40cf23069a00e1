//! Per-run on-disk layout.
//!
//! Everything a run leaves behind lives under one timestamped directory in
//! the per-user cache: the kubeconfig fragment, the resolved values
//! document, the Git working copy, and the step ledger.

use std::path::{Path, PathBuf};

/// Paths of one run directory.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub root: PathBuf,
    pub kubeconfig: PathBuf,
    pub values: PathBuf,
    pub workdir: PathBuf,
    pub ledger: PathBuf,
    /// Root of all run directories, for cleanup scans.
    pub runs_root: PathBuf,
}

impl RunPaths {
    /// Create `base/runs/<timestamp>/`.
    pub fn create_under(base: &Path) -> std::io::Result<Self> {
        let runs_root = base.join("runs");
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
        let root = runs_root.join(stamp);
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            kubeconfig: root.join("kubeconfig"),
            values: root.join("values.yaml"),
            workdir: root.join("workdir"),
            ledger: root.join("ledger.jsonl"),
            root,
            runs_root,
        })
    }

    /// Create under the conventional per-user cache directory.
    pub fn create_default() -> std::io::Result<Self> {
        let base = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("bosun");
        Self::create_under(&base)
    }
}
