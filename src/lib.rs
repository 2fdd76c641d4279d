//! # launchvisor
//!
//! **Launchvisor** is a process launch scheduler with kernel-level exit
//! supervision for Linux.
//!
//! It launches an external command at configured wall-clock or relative
//! trigger instants, re-arms repeating schedules on a fixed lattice, and
//! detects process exits through the kernel proc connector instead of
//! polling. The crate is designed as a building block for plugin hosts and
//! system agents that need "run this binary on this schedule and tell me
//! how it ended".
//!
//! ## Architecture
//! ### Overview
//! ```text
//!       ┌───────────────┐          ┌────────────────────────────┐
//!       │   JobConfig   │ validate │ JobDescriptor + SchedulePlan│
//!       │ (JSON source) ├─────────►│  (what / when to launch)   │
//!       └───────────────┘          └─────────────┬──────────────┘
//!                                                ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  Launcher (control surface)                                      │
//! │  - Bus (broadcast events)                                        │
//! │  - SubscriberSet (fans out to user subscribers + MemoryWatch)    │
//! │  - TimerPool (delayed dispatch)                                  │
//! │  - ExitEventBus (shared kernel channel, injected)                │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 ▼
//!                        ┌─────────────────┐
//!                        │  ScheduledJob   │
//!                        │  (orchestrator) │
//!                        └──┬───────────┬──┘
//!             timer dispatch│           │exit records (pump)
//!                           ▼           ▲
//!              ┌──────────────────┐  ┌──┴───────────────────┐
//!              │ProcessSupervisor │  │ ExitEventBus reader  │
//!              │  (spawn, kill)   │  │ thread (netlink proc │
//!              └─────────┬────────┘  │ connector, decode)   │
//!                        │           └──────────▲───────────┘
//!                        ▼ fork/exec            │ exit events
//!                  ┌───────────┐                │
//!                  │  process  ├────────────────┘
//!                  └───────────┘     kernel
//! ```
//!
//! ### Lifecycle
//! ```text
//! JobConfig ──► Launcher::activate ──► ScheduledJob::activate
//!
//! activate:
//!   ├─► register on ExitEventBus (first listener opens the channel)
//!   ├─► first_trigger(now)  (relative offset / absolute slot / lattice)
//!   └─► arm TimerPool entry ─► publish JobScheduled{ delay }
//!
//! dispatch (timer fired):
//!   ├─ shutdown?            ─► publish DispatchSkipped, exit
//!   ├─ process still alive? ─► publish DispatchSkipped (launch only)
//!   ├─ else launch          ─► publish ProcessLaunched{ pid }
//!   └─ repeating?           ─► next_in_lattice(prev, step, now)
//!                              publish RescheduleQueued{ delay }
//!
//! exit record (kernel):
//!   ├─ pid stale?           ─► discard
//!   ├─ status & 0xFFFF != 0 ─► revoke pending, publish JobFailed, settle
//!   ├─ repeating            ─► back to Scheduled (timer already armed)
//!   └─ run-once             ─► publish JobCompleted, settle
//!
//! shutdown:
//!   ├─► suppress launches, revoke pending trigger
//!   ├─► unregister (last listener closes the channel)
//!   └─► SIGTERM, wait closetime, SIGKILL once ─► TerminationEscalated
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                    |
//! |-------------------|--------------------------------------------------------------|---------------------------------------|
//! | **Subscriber API**| Hook into job lifecycle events (logging, metrics, custom).   | [`Subscribe`]                         |
//! | **Scheduling**    | `HH:MM.SS` specs, relative/absolute/interval trigger modes.  | [`TimeSpec`], [`SchedulePlan`]        |
//! | **Supervision**   | Launch, liveness, graceful-then-forceful termination.        | [`ScheduledJob`], [`Launcher`]        |
//! | **Exit detection**| Kernel proc connector, multiplexed to many listeners.        | [`ExitEventBus`], [`ExitListener`]    |
//! | **Memory**        | On-demand footprint of the supervised process.               | [`MemoryWatch`]                       |
//! | **Errors**        | Typed errors per failure domain.                             | [`ConfigError`], [`SuperviseError`]   |
//! | **Configuration** | JSON job documents validated into runtime types.             | [`JobConfig`]                         |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use launchvisor::{JobConfig, Launcher};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Build subscribers (optional)
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn launchvisor::Subscribe>> = {
//!         use launchvisor::LogWriter;
//!         vec![Arc::new(LogWriter::default())]
//!     };
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn launchvisor::Subscribe>> = Vec::new();
//!
//!     let launcher = Launcher::builder().with_subscribers(subs).build();
//!
//!     // Launch a backup at 03:00:00, then hourly on the same lattice.
//!     let cfg: JobConfig = serde_json::from_str(
//!         r#"{
//!             "command": "/usr/bin/backup",
//!             "parameters": [{ "option": "--quiet" }],
//!             "closetime": 10,
//!             "schedule": { "mode": "interval", "time": "03:00.00", "interval": "01:00.00" }
//!         }"#,
//!     )?;
//!     launcher.activate(&cfg).await?;
//!
//!     if let Some(mut outcome) = launcher.outcome().await {
//!         outcome.changed().await?;
//!         println!("settled: {:?}", *outcome.borrow());
//!     }
//!     launcher.shutdown().await;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod events;
mod job;
mod launcher;
mod memory;
mod observer;
mod schedule;
mod subscribers;
mod timer;

// ---- Public re-exports ----

pub use config::{JobConfig, JobParameter, ScheduleConfig};
pub use error::{ActivateError, ConfigError, ObserverError, SuperviseError};
pub use events::{Bus, Event, EventKind};
pub use job::{JobDescriptor, JobOutcome, JobState, ScheduledJob};
pub use launcher::{Launcher, LauncherBuilder};
pub use memory::{MemoryUsage, MemoryWatch};
pub use observer::{
    ChannelFactory, EventChannel, ExitEventBus, ExitEventKind, ExitListener, ExitRecord,
    ProcConnector,
};
pub use schedule::{ScheduleMode, SchedulePlan, TimeFieldPolicy, TimeSpec, Trigger};
pub use subscribers::{Subscribe, SubscriberSet};
pub use timer::{TimerHandle, TimerPool};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
