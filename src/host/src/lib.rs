//! Host interaction layer.
//!
//! Everything the orchestrator knows about the machine it runs on comes
//! through this crate: which OS family it is (including the
//! Linux-under-Windows compatibility layer), where executables live, how to
//! translate paths across the layer boundary, and how to run external tools
//! with deadlines and streamed output.

pub mod backoff;
pub mod cancel;
pub mod exec;
pub mod paths;
pub mod platform;
pub mod testing;

pub use backoff::Backoff;
pub use cancel::{CancelSource, CancelToken};
pub use exec::{Arg, CommandSpec, ExecError, ExecResult, Executor, HostExecutor, OutputMode};
pub use platform::{host_profile, HostProfile, OsFamily, PackageManager};
