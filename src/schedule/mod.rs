//! Wall-clock scheduling: partial time specs and trigger computation.
//!
//! ## Contents
//! - [`TimeSpec`] — hour/minute/second, each independently optional
//! - [`TimeFieldPolicy`] — what to do with a malformed field
//! - [`ScheduleMode`], [`SchedulePlan`], [`Trigger`] — trigger planning
//!
//! The planner is pure wall-clock arithmetic over `chrono::NaiveDateTime`;
//! nothing here arms timers or touches processes.

mod planner;
mod timespec;

pub use planner::{next_in_lattice, ScheduleMode, SchedulePlan, Trigger};
pub use timespec::{TimeFieldPolicy, TimeSpec};
