//! # Job: descriptor, process supervision, and lifecycle orchestration.
//!
//! - [`descriptor`]: what to launch ([`JobDescriptor`]).
//! - [`state`]: the lifecycle state machine ([`JobState`]).
//! - [`process`]: launch and terminate the child ([`ProcessSupervisor`]).
//! - [`scheduled`]: the orchestrator tying schedule, timers, and kernel exit
//!   events together ([`ScheduledJob`]).

pub mod descriptor;
pub mod process;
pub mod scheduled;
pub mod state;

pub use descriptor::{JobDescriptor, Parameter, DEFAULT_CLOSE_TIMEOUT};
pub use process::{ProcessSupervisor, Terminated};
pub use scheduled::{JobOutcome, ScheduledJob};
pub use state::JobState;
