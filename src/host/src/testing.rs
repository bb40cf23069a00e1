//! Scripted executor for tests.
//!
//! Engines take `Arc<dyn Executor>`, so tests drive them against canned tool
//! output instead of real binaries. Rules are matched in insertion order
//! against the rendered command line; the first live match wins. Unmatched
//! commands succeed with empty output, which keeps happy-path tests short.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::exec::{CommandSpec, ExecError, ExecResult, Executor};
use crate::platform::OsFamily;

/// Canned response for one matched invocation.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Exit {
        code: i32,
        stdout: String,
        stderr: String,
    },
    SpawnError,
    Timeout,
}

/// Constructors for [`ScriptedReply`].
pub mod reply {
    use super::ScriptedReply;

    pub fn ok(stdout: impl Into<String>) -> ScriptedReply {
        ScriptedReply::Exit {
            code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn exit(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> ScriptedReply {
        ScriptedReply::Exit {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn spawn_error() -> ScriptedReply {
        ScriptedReply::SpawnError
    }

    pub fn timeout() -> ScriptedReply {
        ScriptedReply::Timeout
    }
}

struct Rule {
    pattern: String,
    remaining: Option<usize>,
    reply: ScriptedReply,
}

/// Test double for [`Executor`].
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond with `reply` whenever the rendered command line contains
    /// `pattern`.
    pub fn stub(&self, pattern: impl Into<String>, reply: ScriptedReply) {
        self.rules.lock().expect("rules poisoned").push(Rule {
            pattern: pattern.into(),
            remaining: None,
            reply,
        });
    }

    /// Like [`stub`](Self::stub) but consumed after `times` matches; later
    /// rules with the same pattern then take over.
    pub fn stub_times(&self, pattern: impl Into<String>, times: usize, reply: ScriptedReply) {
        self.rules.lock().expect("rules poisoned").push(Rule {
            pattern: pattern.into(),
            remaining: Some(times),
            reply,
        });
    }

    /// Every rendered command line, in invocation order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls poisoned").clone()
    }

    pub fn call_count(&self, pattern: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(pattern)).count()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn run(&self, spec: CommandSpec) -> Result<ExecResult, ExecError> {
        let line = spec.display_line(OsFamily::Linux);
        self.calls.lock().expect("calls poisoned").push(line.clone());

        let reply = {
            let mut rules = self.rules.lock().expect("rules poisoned");
            let mut matched = None;
            for rule in rules.iter_mut() {
                if rule.remaining == Some(0) {
                    continue;
                }
                if line.contains(&rule.pattern) {
                    if let Some(n) = rule.remaining.as_mut() {
                        *n -= 1;
                    }
                    matched = Some(rule.reply.clone());
                    break;
                }
            }
            matched
        };

        match reply.unwrap_or_else(|| reply::ok("")) {
            ScriptedReply::Exit {
                code,
                stdout,
                stderr,
            } => Ok(ExecResult {
                exit_code: code,
                stdout: stdout.into_bytes(),
                stderr: stderr.into_bytes(),
            }),
            ScriptedReply::SpawnError => Err(ExecError::Spawn {
                tool: spec.tool.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            }),
            ScriptedReply::Timeout => Err(ExecError::Timeout {
                tool: spec.tool.clone(),
                timeout: Duration::from_secs(0),
            }),
        }
    }
}
