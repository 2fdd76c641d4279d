//! Event subscribers for the launchvisor runtime.
//!
//! ## Architecture
//! ```text
//! ScheduledJob ── publish(Event) ──► Bus ──► launcher listener ──► SubscriberSet
//!                                                             ┌─────────┼─────────┐
//!                                                             ▼         ▼         ▼
//!                                                        [queue S1] [queue S2] [queue SN]
//!                                                             ▼         ▼         ▼
//!                                                        on_event()  on_event()  on_event()
//! ```
//!
//! - **Passive subscribers** observe and react (logging, metrics, alerts).
//! - **Stateful subscribers** maintain state from events — see
//!   [`MemoryWatch`](crate::MemoryWatch), which tracks the observed pid.

mod set;
mod subscribe;

#[cfg(feature = "logging")]
mod log;

pub use set::SubscriberSet;
pub use subscribe::Subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
