//! Reporter implementations.
//!
//! The console reporter is line-oriented on purpose: it works the same under
//! a TTY, a CI log collector, and `2>file`. Rich terminal widgets can be
//! layered on by providing another [`Reporter`] implementation; engines never
//! know the difference.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::ledger::RunLedger;
use crate::step::{InstallStep, StepOutcome};

/// Abstract progress reporter consumed by every engine.
///
/// Implementations own presentation. Payloads must not contain ANSI control
/// sequences. All methods are callable from any thread; implementations
/// serialize output internally.
pub trait Reporter: Send + Sync {
    /// Begin a new step with a human label.
    fn start_step(&self, label: &str);
    /// Finish the active step successfully.
    fn succeed(&self, payload: &str);
    /// Finish the active step with a warning.
    fn warn(&self, payload: &str);
    /// Finish the active step with a failure.
    fn fail(&self, payload: &str);
    /// Finish the active step as skipped.
    fn skip(&self, payload: &str);
    /// Emit a free-standing informational line.
    fn info(&self, line: &str);
    /// Render a table; the first row is the header.
    fn table(&self, rows: &[Vec<String>]);
    /// Report fractional progress in [0, 1] with a label.
    fn gauge(&self, fraction: f64, label: &str);
}

struct ConsoleState {
    active: Option<InstallStep>,
    last_gauge_pct: i64,
}

/// Line-oriented console reporter, optionally mirroring into a [`RunLedger`].
pub struct ConsoleReporter {
    state: Mutex<ConsoleState>,
    ledger: Option<Arc<RunLedger>>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ConsoleState {
                active: None,
                last_gauge_pct: -1,
            }),
            ledger: None,
        }
    }

    pub fn with_ledger(ledger: Arc<RunLedger>) -> Self {
        let mut r = Self::new();
        r.ledger = Some(ledger);
        r
    }

    fn finish(&self, marker: &str, payload: &str, outcome: StepOutcome) {
        let mut state = self.state.lock().expect("console state poisoned");
        let step = state
            .active
            .take()
            .unwrap_or_else(|| InstallStep::begin(""))
            .finish(outcome, serde_json::json!({ "payload": payload }));
        if step.label.is_empty() {
            eprintln!("{} {}", marker, payload);
        } else if payload.is_empty() {
            eprintln!("{} {}", marker, step.label);
        } else {
            eprintln!("{} {}: {}", marker, step.label, payload);
        }
        drop(state);
        if let Some(ledger) = &self.ledger {
            ledger.end_step(&step);
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ConsoleReporter {
    fn start_step(&self, label: &str) {
        let mut state = self.state.lock().expect("console state poisoned");
        state.active = Some(InstallStep::begin(label));
        eprintln!("▸ {}", label);
        drop(state);
        if let Some(ledger) = &self.ledger {
            ledger.begin(label);
        }
    }

    fn succeed(&self, payload: &str) {
        self.finish("✔", payload, StepOutcome::Ok);
    }

    fn warn(&self, payload: &str) {
        self.finish("⚠", payload, StepOutcome::Warn);
    }

    fn fail(&self, payload: &str) {
        self.finish("✘", payload, StepOutcome::Err);
    }

    fn skip(&self, payload: &str) {
        self.finish("↷", payload, StepOutcome::Skipped);
    }

    fn info(&self, line: &str) {
        eprintln!("  {}", line);
        if let Some(ledger) = &self.ledger {
            ledger.info(line);
        }
    }

    fn table(&self, rows: &[Vec<String>]) {
        if rows.is_empty() {
            return;
        }
        let columns = rows.iter().map(|r| r.len()).max().unwrap_or(0);
        let mut widths = vec![0usize; columns];
        for row in rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
        for (idx, row) in rows.iter().enumerate() {
            let mut line = String::from("  ");
            for (i, cell) in row.iter().enumerate() {
                line.push_str(cell);
                if i + 1 < row.len() {
                    let pad = widths[i].saturating_sub(cell.chars().count()) + 2;
                    line.extend(std::iter::repeat(' ').take(pad));
                }
            }
            eprintln!("{}", line.trim_end());
            if idx == 0 {
                let total: usize = widths.iter().sum::<usize>() + 2 * (columns.saturating_sub(1));
                eprintln!("  {}", "─".repeat(total));
            }
        }
    }

    fn gauge(&self, fraction: f64, label: &str) {
        let pct = (fraction.clamp(0.0, 1.0) * 100.0).round() as i64;
        let mut state = self.state.lock().expect("console state poisoned");
        // Only re-print when the rounded percentage moves; keeps CI logs quiet.
        if state.last_gauge_pct == pct {
            return;
        }
        state.last_gauge_pct = pct;
        eprintln!("  [{:>3}%] {}", pct, label);
    }
}

/// Event captured by [`CaptureReporter`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReporterEvent {
    Start(String),
    Succeed(String),
    Warn(String),
    Fail(String),
    Skip(String),
    Info(String),
    Table(Vec<Vec<String>>),
    Gauge(f64, String),
}

/// Reporter that records every event for assertions in tests.
#[derive(Default)]
pub struct CaptureReporter {
    events: Mutex<Vec<ReporterEvent>>,
    gauges: AtomicUsize,
}

impl CaptureReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReporterEvent> {
        self.events.lock().expect("capture poisoned").clone()
    }

    pub fn gauge_count(&self) -> usize {
        self.gauges.load(Ordering::Relaxed)
    }

    /// Labels of warn events, for quick assertions.
    pub fn warnings(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ReporterEvent::Warn(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: ReporterEvent) {
        self.events.lock().expect("capture poisoned").push(event);
    }
}

impl Reporter for CaptureReporter {
    fn start_step(&self, label: &str) {
        self.push(ReporterEvent::Start(label.to_string()));
    }

    fn succeed(&self, payload: &str) {
        self.push(ReporterEvent::Succeed(payload.to_string()));
    }

    fn warn(&self, payload: &str) {
        self.push(ReporterEvent::Warn(payload.to_string()));
    }

    fn fail(&self, payload: &str) {
        self.push(ReporterEvent::Fail(payload.to_string()));
    }

    fn skip(&self, payload: &str) {
        self.push(ReporterEvent::Skip(payload.to_string()));
    }

    fn info(&self, line: &str) {
        self.push(ReporterEvent::Info(line.to_string()));
    }

    fn table(&self, rows: &[Vec<String>]) {
        self.push(ReporterEvent::Table(rows.to_vec()));
    }

    fn gauge(&self, fraction: f64, label: &str) {
        self.gauges.fetch_add(1, Ordering::Relaxed);
        self.push(ReporterEvent::Gauge(fraction, label.to_string()));
    }
}
