//! Job lifecycle states.

/// Where a job currently is in its lifecycle.
///
/// Transitions are driven by three actors: the control surface
/// (activate/shutdown), timer dispatch, and exit events from the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Not activated, or fully torn down.
    Idle,
    /// Armed: a dispatch is queued or the job awaits its next trigger.
    Scheduled,
    /// The launched process is alive.
    Running,
    /// The process exited cleanly and no further trigger exists.
    Completed,
    /// The process exited with a non-zero status; recurrence is revoked.
    Failed,
    /// Shutdown requested; launches and reschedules are suppressed.
    ShuttingDown,
}

impl JobState {
    /// Stable lowercase label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            JobState::Idle => "idle",
            JobState::Scheduled => "scheduled",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::ShuttingDown => "shutting_down",
        }
    }

    /// True for states in which the job will take no further action.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}
