//! The preflight gate state machine.
//!
//! memory_check → tool_scan → classify → install → runtime_start. The memory
//! check runs before every other action so a low-memory host fails fast
//! before any mutation. The outcome depends only on the scan observations,
//! the memory reading, and the flags, never on probe order.

use std::sync::Arc;
use std::time::Duration;

use host::{CancelToken, Executor, HostProfile};
use report::{Confirmer, Reporter};

use crate::install::{self, InstallError};
use crate::memory::MemoryReading;
use crate::runtime;
use crate::tools::{self, ToolDescriptor, ToolId};

const RUNTIME_START_DEADLINE: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum PreflightError {
    #[error("insufficient memory: {available_mb} MB available, {recommended_mb} MB recommended. Use --force to override")]
    InsufficientMemory {
        available_mb: u64,
        recommended_mb: u64,
    },
    #[error("prerequisites not installed: {0}")]
    MissingTools(String),
    #[error("failed to install {tool}: {message}")]
    InstallFailed { tool: String, message: String },
    #[error("container runtime is not running. {0}")]
    RuntimeUnavailable(String),
    #[error("preflight canceled")]
    Canceled,
}

/// Flags that shape the gate's policy.
#[derive(Debug, Clone, Copy)]
pub struct PreflightOptions {
    pub interactive: bool,
    pub force: bool,
    pub verbose: bool,
}

/// What the pass observed and decided. Returning `Ok` is the "proceed"
/// decision; every abort is a [`PreflightError`] carrying the reason.
#[derive(Debug, Default)]
pub struct PreflightResult {
    pub memory: Option<MemoryReading>,
    pub present: Vec<ToolId>,
    pub installed: Vec<ToolId>,
    pub runtime_was_dormant: bool,
    pub warnings: Vec<String>,
}

/// Orchestrates probes, memory check, installation, and runtime start.
pub struct PreflightGate {
    profile: &'static HostProfile,
    executor: Arc<dyn Executor>,
    reporter: Arc<dyn Reporter>,
    confirmer: Arc<dyn Confirmer>,
    cancel: CancelToken,
    opts: PreflightOptions,
    runtime_deadline: Duration,
}

impl PreflightGate {
    pub fn new(
        profile: &'static HostProfile,
        executor: Arc<dyn Executor>,
        reporter: Arc<dyn Reporter>,
        confirmer: Arc<dyn Confirmer>,
        cancel: CancelToken,
        opts: PreflightOptions,
    ) -> Self {
        Self {
            profile,
            executor,
            reporter,
            confirmer,
            cancel,
            opts,
            runtime_deadline: RUNTIME_START_DEADLINE,
        }
    }

    /// Shrink the runtime-start deadline; used by tests.
    pub fn with_runtime_deadline(mut self, deadline: Duration) -> Self {
        self.runtime_deadline = deadline;
        self
    }

    /// Run the full pass. The memory reading is captured by the caller at
    /// preflight entry so the check is the first thing that happens.
    pub async fn run(&self, memory: MemoryReading) -> Result<PreflightResult, PreflightError> {
        let mut result = PreflightResult {
            memory: Some(memory),
            ..Default::default()
        };

        self.check_memory(memory, &mut result)?;
        self.checkpoint()?;

        let missing = self.scan_tools(&mut result).await;
        self.checkpoint()?;

        if missing.is_empty() {
            return Ok(result);
        }

        // Classify: a missing runtime whose binary answers at the version
        // layer is dormant, not absent.
        let mut installable: Vec<&ToolDescriptor> = Vec::new();
        let mut manual: Vec<&ToolDescriptor> = Vec::new();
        for descriptor in missing {
            if descriptor.id == ToolId::Docker && runtime::binary_present(self.executor.as_ref()).await
            {
                result.runtime_was_dormant = true;
            } else if descriptor.installable {
                installable.push(descriptor);
            } else {
                manual.push(descriptor);
            }
        }

        if !manual.is_empty() {
            return Err(self.abort_manual(&manual));
        }

        if !installable.is_empty() {
            self.install_missing(&installable, &mut result).await?;
        }
        self.checkpoint()?;

        if result.runtime_was_dormant {
            self.start_runtime(&mut result).await?;
        }

        Ok(result)
    }

    fn checkpoint(&self) -> Result<(), PreflightError> {
        if self.cancel.is_cancelled() {
            Err(PreflightError::Canceled)
        } else {
            Ok(())
        }
    }

    fn check_memory(
        &self,
        memory: MemoryReading,
        result: &mut PreflightResult,
    ) -> Result<(), PreflightError> {
        self.reporter.start_step("Checking system memory");
        if memory.sufficient() {
            self.reporter.succeed(&format!(
                "{} MB available ({} MB recommended)",
                memory.available_mb, memory.recommended_mb
            ));
            return Ok(());
        }

        let warning = format!(
            "{} MB available, {} MB recommended",
            memory.available_mb, memory.recommended_mb
        );
        if self.opts.force {
            self.reporter
                .warn(&format!("{} (continuing, --force)", warning));
            result.warnings.push(warning);
            return Ok(());
        }
        if !self.opts.interactive {
            self.reporter
                .warn(&format!("{} (continuing, non-interactive mode)", warning));
            result.warnings.push(warning);
            return Ok(());
        }

        self.reporter.warn(&warning);
        self.reporter
            .info("Charts may not deploy successfully with insufficient memory.");
        if self.confirmer.confirm("Continue anyway?", false) {
            result.warnings.push(warning);
            Ok(())
        } else {
            Err(PreflightError::InsufficientMemory {
                available_mb: memory.available_mb,
                recommended_mb: memory.recommended_mb,
            })
        }
    }

    async fn scan_tools(&self, result: &mut PreflightResult) -> Vec<&'static ToolDescriptor> {
        self.reporter.start_step("Scanning required tools");
        let catalog = tools::catalog();
        let mut missing = Vec::new();
        for descriptor in catalog {
            if tools::is_present(descriptor, self.executor.as_ref()).await {
                result.present.push(descriptor.id);
                if self.opts.verbose {
                    self.reporter.info(&format!("{}: present", descriptor.id));
                }
            } else {
                if self.opts.verbose {
                    self.reporter.info(&format!("{}: missing", descriptor.id));
                }
                missing.push(descriptor);
            }
        }
        if missing.is_empty() {
            self.reporter
                .succeed(&format!("all {} tools present", catalog.len()));
        } else {
            let names: Vec<&str> = missing.iter().map(|d| d.id.display()).collect();
            self.reporter
                .warn(&format!("missing: {}", names.join(", ")));
        }
        missing
    }

    fn abort_manual(&self, manual: &[&ToolDescriptor]) -> PreflightError {
        let mut rows = vec![vec!["Tool".to_string(), "Installation".to_string()]];
        for descriptor in manual {
            let help = install::install_help(descriptor.id, self.profile);
            let instructions = help
                .split_once(": ")
                .map(|(_, rest)| rest.to_string())
                .unwrap_or(help);
            rows.push(vec![descriptor.id.display().to_string(), instructions]);
        }
        self.reporter.table(&rows);
        let names: Vec<&str> = manual.iter().map(|d| d.id.display()).collect();
        PreflightError::MissingTools(names.join(", "))
    }

    async fn install_missing(
        &self,
        installable: &[&ToolDescriptor],
        result: &mut PreflightResult,
    ) -> Result<(), PreflightError> {
        let names: Vec<&str> = installable.iter().map(|d| d.id.display()).collect();
        self.reporter
            .info(&format!("Missing prerequisites: {}", names.join(", ")));

        let consented = if self.opts.interactive {
            self.confirmer
                .confirm("Would you like me to install them automatically?", true)
        } else {
            self.reporter
                .info("Auto-installing prerequisites (non-interactive mode)");
            true
        };
        if !consented {
            self.reporter
                .info("Installation skipped. Manual installation instructions:");
            return Err(self.abort_manual(installable));
        }

        // Installers run strictly one at a time.
        let total = installable.len();
        for (index, descriptor) in installable.iter().enumerate() {
            self.checkpoint()?;
            self.reporter.start_step(&format!(
                "[{}/{}] Installing {}",
                index + 1,
                total,
                descriptor.id
            ));

            // Certificate tooling is optional convenience; never a blocker in
            // non-interactive runs.
            if descriptor.id == ToolId::Mkcert && !self.opts.interactive {
                self.reporter
                    .skip("certificate tooling skipped (non-interactive)");
                continue;
            }

            match install::install(descriptor.id, self.profile, self.executor.as_ref()).await {
                Ok(()) => {
                    self.reporter.succeed("installed");
                    result.installed.push(descriptor.id);
                }
                Err(err) => {
                    if self.opts.interactive {
                        self.reporter.fail(&err.to_string());
                        return Err(match err {
                            InstallError::Manual { tool, help } => {
                                PreflightError::MissingTools(format!("{} ({})", tool, help))
                            }
                            InstallError::Failed { tool, message } => {
                                PreflightError::InstallFailed { tool, message }
                            }
                        });
                    }
                    let warning = format!("skipped {}: {}", descriptor.id, err);
                    self.reporter.warn(&warning);
                    result.warnings.push(warning);
                }
            }
        }
        Ok(())
    }

    async fn start_runtime(&self, result: &mut PreflightResult) -> Result<(), PreflightError> {
        let instructions = runtime::start_instructions(self.profile.family);

        if self.opts.interactive {
            self.reporter.info("Docker is not running.");
            if !self
                .confirmer
                .confirm("Would you like me to start Docker for you?", true)
            {
                self.reporter.info(&instructions);
                return Err(PreflightError::RuntimeUnavailable(instructions));
            }
        } else {
            self.reporter
                .info("Docker is not running; attempting to start it (non-interactive mode)");
        }

        self.reporter.start_step("Starting Docker");
        if let Err(message) = runtime::start(self.profile, self.executor.as_ref()).await {
            if self.opts.interactive {
                self.reporter.fail(&message);
                self.reporter.info(&instructions);
                return Err(PreflightError::RuntimeUnavailable(instructions));
            }
            let warning = format!("could not start Docker automatically: {}", message);
            self.reporter.warn(&warning);
            result.warnings.push(warning);
            return Ok(());
        }

        if runtime::wait_operational(self.executor.as_ref(), &self.cancel, self.runtime_deadline)
            .await
        {
            self.reporter.succeed("Docker started");
            Ok(())
        } else if self.opts.interactive {
            self.reporter.fail("Docker failed to start");
            self.reporter.info(&instructions);
            Err(PreflightError::RuntimeUnavailable(instructions))
        } else {
            let warning = "Docker failed to start; the cluster step will surface a clearer error"
                .to_string();
            self.reporter.warn(&warning);
            result.warnings.push(warning);
            Ok(())
        }
    }
}
