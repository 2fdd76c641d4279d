//! # LogWriter — event-to-tracing bridge
//!
//! A minimal subscriber that forwards incoming [`Event`]s to `tracing`.
//! Use it for demos and tests, or as a reference for custom subscribers.

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Constructs a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let job = e.job.as_deref().unwrap_or("?");
        match e.kind {
            EventKind::JobScheduled => {
                tracing::info!(job, delay_ms = e.delay_ms, "job scheduled");
            }
            EventKind::DispatchSkipped => {
                tracing::info!(job, reason = e.reason.as_deref(), "dispatch skipped");
            }
            EventKind::ProcessLaunched => {
                tracing::info!(job, pid = e.pid, "process launched");
            }
            EventKind::ProcessExited => {
                tracing::info!(job, pid = e.pid, exit_code = e.exit_code, "process exited");
            }
            EventKind::RescheduleQueued => {
                tracing::info!(job, delay_ms = e.delay_ms, "reschedule queued");
            }
            EventKind::JobCompleted => {
                tracing::info!(job, "job completed");
            }
            EventKind::JobFailed => {
                tracing::warn!(
                    job,
                    exit_code = e.exit_code,
                    reason = e.reason.as_deref(),
                    "job failed"
                );
            }
            EventKind::ShutdownRequested => {
                tracing::info!(job, "shutdown requested");
            }
            EventKind::TerminationEscalated => {
                tracing::warn!(job, pid = e.pid, close_ms = e.delay_ms, "forceful kill issued");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(subscriber = job, reason = e.reason.as_deref(), "overflow");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
