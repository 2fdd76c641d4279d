//! # Runtime events emitted by the launcher and the scheduled job.
//!
//! [`EventKind`] classifies the job lifecycle: scheduling, process launch,
//! exit handling, rescheduling, and shutdown. [`Event`] carries the metadata
//! (timestamp, job name, pid, exit code, delays).
//!
//! ## Ordering
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically; use it to restore order when events are consumed from
//! independent subscriber queues.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A trigger instant was computed and a timer entry armed.
    ///
    /// Sets: `job`, `delay_ms` (time until the trigger; 0 for immediate).
    JobScheduled,

    /// A dispatch fired but did nothing (shutdown already begun, or the
    /// previous process incarnation is still running).
    ///
    /// Sets: `job`, `reason`.
    DispatchSkipped,

    /// The external process was launched.
    ///
    /// Sets: `job`, `pid`.
    ProcessLaunched,

    /// The observed process exited and the job continues (repeating mode).
    ///
    /// Sets: `job`, `pid`, `exit_code`.
    ProcessExited,

    /// The next trigger of a repeating job was queued.
    ///
    /// Sets: `job`, `delay_ms`.
    RescheduleQueued,

    /// Run-once job finished successfully; terminal for this activation.
    ///
    /// Sets: `job`, `pid`, `exit_code` (0).
    JobCompleted,

    /// The process exited nonzero or could not be launched; terminal.
    ///
    /// Sets: `job`, `exit_code` (when an exit was observed), `reason`.
    JobFailed,

    /// Deactivation started; pending timer entries are being revoked.
    ///
    /// Sets: `job`.
    ShutdownRequested,

    /// The graceful kill did not complete within the close timeout and a
    /// forceful kill was issued. Recovered locally, never an error.
    ///
    /// Sets: `job`, `pid`, `delay_ms` (the exceeded close timeout).
    TerminationEscalated,

    /// A subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `job` (subscriber name), `reason`.
    SubscriberOverflow,
}

/// Runtime event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Job (or subscriber) name, if applicable.
    pub job: Option<Arc<str>>,
    /// Process id, if a process is involved.
    pub pid: Option<u32>,
    /// Raw exit code as delivered by the kernel event.
    pub exit_code: Option<u32>,
    /// Delay in milliseconds (trigger distance, exceeded timeout).
    pub delay_ms: Option<u64>,
    /// Human-readable reason (errors, skip causes, overflow details).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// the next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            job: None,
            pid: None,
            exit_code: None,
            delay_ms: None,
            reason: None,
        }
    }

    /// Attaches a job name.
    #[inline]
    pub fn with_job(mut self, job: impl Into<Arc<str>>) -> Self {
        self.job = Some(job.into());
        self
    }

    /// Attaches a process id.
    #[inline]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Attaches a raw exit code.
    #[inline]
    pub fn with_exit_code(mut self, code: u32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(d.as_millis().min(u128::from(u64::MAX)) as u64);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::now(EventKind::SubscriberOverflow)
            .with_job(subscriber)
            .with_reason(reason)
    }
}
