//! crashguard-core: Crash supervision core
//!
//! This crate intercepts unhandled faults and runs the crash protocol:
//! - Fault records and stack frame origin matching
//! - Recovery surface and restart target resolution
//! - Foreground/background liveness tracking
//! - Bounded handoff payloads for the recovery surface
//! - Supervisor installation and the crash state machine

pub mod bootstrap;
pub mod component;
pub mod config;
pub mod conflict;
pub mod fault;
pub mod host;
pub mod liveness;
pub mod payload;
pub mod reporter;
pub mod resolver;
pub mod supervisor;

pub use component::{ComponentId, ComponentRegistry};
pub use config::{InvalidConfig, SupervisorConfig};
pub use fault::{FaultLink, FaultRecord, StackFrame};
pub use host::{CrashJournal, HookSlot, HookState, Host, HostError, PanicHookSlot};
pub use liveness::{LifecycleEvent, LifecycleListener, LivenessTracker, SurfaceHandle};
pub use payload::{HandoffPayload, PayloadBuilder};
pub use reporter::{ReportError, Reporter};
pub use supervisor::{
    CrashOutcome, CrashPhase, CrashSupervisor, Disposition, InstallError, SkipReason,
    SupervisorHandle, SUPERVISED_CRASH_EXIT_CODE,
};
