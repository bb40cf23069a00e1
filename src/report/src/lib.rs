//! Progress reporting and run-ledger support.
//!
//! Every engine talks to the user through the [`Reporter`] trait and asks
//! questions through the [`Confirmer`] trait. Implementations own all
//! presentation; payloads passed in must never contain ANSI control
//! sequences. Step events are mirrored into the [`RunLedger`] so a finished
//! run leaves a machine-readable transcript behind.

pub mod confirm;
pub mod ledger;
pub mod reporter;
pub mod step;

pub use confirm::{AutoConfirmer, Confirmer, StdinConfirmer};
pub use ledger::{LedgerPhase, RunLedger};
pub use reporter::{CaptureReporter, ConsoleReporter, Reporter, ReporterEvent};
pub use step::{InstallStep, StepOutcome};
