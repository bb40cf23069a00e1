//! Unified preflight.
//!
//! One pass over the host before any mutation: memory first, then a scan of
//! every required external tool, classification of what is missing, consented
//! installation, and finally a container-runtime start if the binary exists
//! but the daemon is dormant. The gate produces a go/no-go decision; the
//! orchestrator proceeds only on go.

pub mod gate;
pub mod install;
pub mod memory;
pub mod runtime;
pub mod tools;

pub use gate::{PreflightError, PreflightGate, PreflightOptions, PreflightResult};
pub use memory::{MemoryReading, RECOMMENDED_MEMORY_MB};
pub use tools::{catalog, ToolCategory, ToolDescriptor, ToolId};
