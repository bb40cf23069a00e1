//! External process execution.
//!
//! Arguments are always passed as a list; when a caller genuinely needs a
//! shell one-liner it says so explicitly through [`CommandSpec::shell`] and
//! names the shell binary. Non-zero exit codes are not errors; callers
//! inspect [`ExecResult::exit_code`]. Errors cover spawn failures, timeouts,
//! and pipe I/O only.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use report::Reporter;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};

use crate::paths;
use crate::platform::{find_executable, HostProfile, OsFamily};

/// Captured output in stream+capture mode is bounded; excess is elided.
pub const MAX_STREAM_CAPTURE: usize = 1024 * 1024;
const ELLIPSIS_MARKER: &[u8] = b"\n\xe2\x80\xa6\n";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// One argument of an external invocation. File-valued arguments are marked
/// so the executor can translate them for the Linux-under-Windows layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Literal(String),
    HostPath(PathBuf),
}

/// How child output is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Capture both streams, report nothing while running.
    Capture,
    /// Forward each line to the reporter, capture nothing.
    Stream,
    /// Forward each line and keep a bounded capture buffer.
    StreamCapture,
}

/// Specification of one external invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<Arg>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    pub stdin: Option<Vec<u8>>,
    pub timeout: Duration,
    pub mode: OutputMode,
    /// Identifier prefixed to streamed lines, defaults to the program name.
    pub tool: String,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        let program = program.into();
        let tool = program
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&program)
            .to_string();
        Self {
            program,
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            stdin: None,
            timeout: DEFAULT_TIMEOUT,
            mode: OutputMode::Capture,
            tool,
        }
    }

    /// Explicit shell invocation for inline scripts. The caller names the
    /// shell binary; nothing is ever concatenated implicitly.
    pub fn shell(shell: impl Into<String>, script: impl Into<String>) -> Self {
        Self::new(shell).arg("-c").arg(script)
    }

    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(Arg::Literal(value.into()));
        self
    }

    pub fn args<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for v in values {
            self.args.push(Arg::Literal(v.into()));
        }
        self
    }

    /// A file-valued argument subject to layer translation.
    pub fn host_path(mut self, value: impl Into<PathBuf>) -> Self {
        self.args.push(Arg::HostPath(value.into()));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn stdin_bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(bytes.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }

    /// Arguments as plain strings after layer translation.
    pub fn rendered_args(&self, family: OsFamily) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| match arg {
                Arg::Literal(s) => s.clone(),
                Arg::HostPath(p) => paths::for_child(family, p).to_string_lossy().into_owned(),
            })
            .collect()
    }

    /// Single-line rendering for logs and test assertions.
    pub fn display_line(&self, family: OsFamily) -> String {
        let mut line = self.program.clone();
        for arg in self.rendered_args(family) {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }
}

/// Result of a completed invocation.
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }

    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} did not finish within {timeout:?}")]
    Timeout { tool: String, timeout: Duration },
    #[error("i/o error while running {tool}: {source}")]
    Io {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

/// Runs external tools. Engines depend on this trait so tests can substitute
/// a scripted implementation.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, spec: CommandSpec) -> Result<ExecResult, ExecError>;
}

/// Production executor backed by `tokio::process`.
pub struct HostExecutor {
    profile: &'static HostProfile,
    reporter: Arc<dyn Reporter>,
}

impl HostExecutor {
    pub fn new(profile: &'static HostProfile, reporter: Arc<dyn Reporter>) -> Self {
        Self { profile, reporter }
    }
}

#[async_trait]
impl Executor for HostExecutor {
    async fn run(&self, spec: CommandSpec) -> Result<ExecResult, ExecError> {
        let family = self.profile.family;
        let program = find_executable(&spec.program)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| spec.program.clone());
        let args = spec.rendered_args(family);

        tracing::debug!(tool = %spec.tool, command = %spec.display_line(family), "running external tool");

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .stdin(if spec.stdin.is_some() {
                std::process::Stdio::piped()
            } else {
                std::process::Stdio::null()
            })
            .kill_on_drop(true);
        for (k, v) in &spec.env {
            cmd.env(k, v);
        }
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(paths::for_child(family, cwd));
        }

        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            tool: spec.tool.clone(),
            source,
        })?;

        if let Some(bytes) = spec.stdin.clone() {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(&bytes).await.map_err(|source| ExecError::Io {
                    tool: spec.tool.clone(),
                    source,
                })?;
            }
        }

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");
        let out_task = tokio::spawn(read_stream(
            stdout,
            spec.mode,
            spec.tool.clone(),
            self.reporter.clone(),
        ));
        let err_task = tokio::spawn(read_stream(
            stderr,
            spec.mode,
            spec.tool.clone(),
            self.reporter.clone(),
        ));

        let status = match tokio::time::timeout(spec.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(source)) => {
                return Err(ExecError::Io {
                    tool: spec.tool.clone(),
                    source,
                })
            }
            Err(_) => {
                terminate(&mut child).await;
                out_task.abort();
                err_task.abort();
                return Err(ExecError::Timeout {
                    tool: spec.tool.clone(),
                    timeout: spec.timeout,
                });
            }
        };

        let stdout = join_reader(out_task, &spec.tool).await?;
        let stderr = join_reader(err_task, &spec.tool).await?;

        Ok(ExecResult {
            exit_code: status.code().unwrap_or(-1),
            stdout,
            stderr,
        })
    }
}

async fn join_reader(
    task: tokio::task::JoinHandle<std::io::Result<Vec<u8>>>,
    tool: &str,
) -> Result<Vec<u8>, ExecError> {
    match task.await {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(source)) => Err(ExecError::Io {
            tool: tool.to_string(),
            source,
        }),
        Err(join) => Err(ExecError::Io {
            tool: tool.to_string(),
            source: std::io::Error::other(join),
        }),
    }
}

async fn read_stream<R>(
    reader: R,
    mode: OutputMode,
    tool: String,
    reporter: Arc<dyn Reporter>,
) -> std::io::Result<Vec<u8>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    match mode {
        OutputMode::Capture => {
            let mut reader = reader;
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf).await?;
            Ok(buf)
        }
        OutputMode::Stream | OutputMode::StreamCapture => {
            let capture = mode == OutputMode::StreamCapture;
            let mut lines = BufReader::new(reader).lines();
            let mut buf = Vec::new();
            let mut elided = false;
            while let Some(line) = lines.next_line().await? {
                reporter.info(&format!("{} | {}", tool, line));
                if capture {
                    if buf.len() + line.len() + 1 <= MAX_STREAM_CAPTURE {
                        buf.extend_from_slice(line.as_bytes());
                        buf.push(b'\n');
                    } else if !elided {
                        buf.extend_from_slice(ELLIPSIS_MARKER);
                        elided = true;
                    }
                }
            }
            Ok(buf)
        }
    }
}

#[cfg(unix)]
async fn terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
    if tokio::time::timeout(Duration::from_secs(2), child.wait())
        .await
        .is_err()
    {
        let _ = child.kill().await;
    }
}

#[cfg(not(unix))]
async fn terminate(child: &mut Child) {
    let _ = child.kill().await;
}

/// Lossy rendering of tool output truncated to `max` characters, for error
/// messages that attach raw tool output.
pub fn truncated_lossy(bytes: &[u8], max: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}…", cut)
    }
}
