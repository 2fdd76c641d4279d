//! Error types used by the launchvisor runtime.
//!
//! Three enums, matching the three failure domains:
//!
//! - [`ConfigError`] — the configuration document cannot be turned into a
//!   valid job plan; activation aborts before anything is launched.
//! - [`ObserverError`] — registration with the shared exit-event bus failed
//!   (duplicate/absent listener, or the kernel channel could not be opened).
//! - [`SuperviseError`] — launching or supervising the external process failed.
//!
//! All types provide `as_label()` for logging/metrics. A graceful-termination
//! timeout is deliberately **not** an error: it is recovered locally by
//! escalating to a forceful kill and only shows up as an event.

use thiserror::Error;

/// # Errors produced while validating the job configuration.
///
/// Surfaced as a human-readable activation failure; no process is launched.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The `command` field is missing or empty.
    #[error("command is required and must not be empty")]
    MissingCommand,

    /// A time specification could not be parsed under the strict field policy.
    #[error("invalid time specification {value:?}: {detail}")]
    InvalidTime {
        /// The offending input string.
        value: String,
        /// What was wrong with it.
        detail: String,
    },

    /// An absolute schedule needs a seconds field to anchor the slot.
    #[error("schedule time {value:?} has no seconds field, required for absolute modes")]
    SecondsRequired {
        /// The offending input string.
        value: String,
    },

    /// Interval mode was selected but the interval is zero or invalid.
    #[error("interval mode requires an interval greater than zero")]
    IntervalRequired,
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::MissingCommand => "config_missing_command",
            ConfigError::InvalidTime { .. } => "config_invalid_time",
            ConfigError::SecondsRequired { .. } => "config_seconds_required",
            ConfigError::IntervalRequired => "config_interval_required",
        }
    }
}

/// # Errors produced by the exit-event bus registration path.
///
/// The registry checks these instead of asserting, so the caller can roll
/// back a partial activation.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ObserverError {
    /// The listener is already present in the registry.
    #[error("listener is already registered")]
    AlreadyRegistered,

    /// The listener is not present in the registry.
    #[error("listener is not registered")]
    NotRegistered,

    /// The kernel process-event channel could not be opened or controlled.
    /// Without it exit detection is unreliable, so this is fatal for the job.
    #[error("process event channel: {0}")]
    Channel(#[source] std::io::Error),
}

impl ObserverError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ObserverError::AlreadyRegistered => "observer_already_registered",
            ObserverError::NotRegistered => "observer_not_registered",
            ObserverError::Channel(_) => "observer_channel",
        }
    }
}

/// # Errors produced while launching or supervising the external process.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SuperviseError {
    /// Spawning the external process failed (no pid was obtained).
    #[error("failed to launch {command:?}: {source}")]
    Launch {
        /// The command that was being launched.
        command: String,
        /// The underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// Exit-bus registration failed; the job cannot reliably detect exits.
    #[error(transparent)]
    Observer(#[from] ObserverError),
}

impl SuperviseError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SuperviseError::Launch { .. } => "supervise_launch",
            SuperviseError::Observer(e) => e.as_label(),
        }
    }
}

/// # Activation failure: configuration or supervision, as one surface.
///
/// [`Launcher::activate`](crate::Launcher::activate) reports both taxonomies
/// through this type, mirroring the single failure-message surface of the
/// hosting framework.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ActivateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Supervise(#[from] SuperviseError),
}

impl ActivateError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ActivateError::Config(e) => e.as_label(),
            ActivateError::Supervise(e) => e.as_label(),
        }
    }
}
