//! # Partial wall-clock time specification.
//!
//! [`TimeSpec`] holds hour/minute/second fields that are each independently
//! optional. The textual form is `HH:MM.SS` with any prefix omittable:
//!
//! ```text
//! "08:15.30"  → hour=8, minute=15, second=30
//! "30.15"     → minute=30, second=15
//! "15"        → second=15
//! ```
//!
//! A spec with hour and second present but minute absent is malformed: the
//! gap in the middle makes the intent ambiguous, so the whole spec is left
//! unset. What happens to individually malformed fields (non-digit, out of
//! range) depends on [`TimeFieldPolicy`]: the lenient policy degrades them to
//! unset with a warning, the strict policy rejects the configuration.

use crate::error::ConfigError;

const HOURS_PER_DAY: u8 = 24;
const MINUTES_PER_HOUR: u8 = 60;
const SECONDS_PER_MINUTE: u8 = 60;

/// What to do with a malformed time field.
///
/// The observed behavior of the original logic differed across revisions, so
/// the choice is a configuration flag rather than a hardcoded guess.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TimeFieldPolicy {
    /// Degrade the malformed field to unset (looser, wildcard-like match)
    /// and log a warning. Default.
    #[default]
    Lenient,
    /// Reject the whole configuration with [`ConfigError::InvalidTime`].
    Strict,
}

/// Partial wall-clock time: hour/minute/second, each independently optional.
///
/// Immutable once constructed. Valid iff at least one field is set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimeSpec {
    hour: Option<u8>,
    minute: Option<u8>,
    second: Option<u8>,
}

impl TimeSpec {
    /// An all-unset (invalid) spec.
    pub const UNSET: TimeSpec = TimeSpec {
        hour: None,
        minute: None,
        second: None,
    };

    /// Builds a spec from already-validated components.
    ///
    /// Out-of-range values are treated as unset.
    pub fn new(hour: Option<u8>, minute: Option<u8>, second: Option<u8>) -> Self {
        Self {
            hour: hour.filter(|h| *h < HOURS_PER_DAY),
            minute: minute.filter(|m| *m < MINUTES_PER_HOUR),
            second: second.filter(|s| *s < SECONDS_PER_MINUTE),
        }
    }

    /// Parses the `HH:MM.SS` syntax under the given field policy.
    ///
    /// The first `:` splits off the hour field, the first `.` in the
    /// remainder splits off the minute field, and whatever is left is the
    /// second field.
    pub fn parse(input: &str, policy: TimeFieldPolicy) -> Result<Self, ConfigError> {
        let (hour_part, rest) = match input.split_once(':') {
            Some((h, rest)) => (Some(h), rest),
            None => (None, input),
        };
        let (minute_part, second_part) = match rest.split_once('.') {
            Some((m, s)) => (Some(m), s),
            None => (None, rest),
        };

        let hour = parse_field(input, hour_part, HOURS_PER_DAY, "hour", policy)?;
        let minute = parse_field(input, minute_part, MINUTES_PER_HOUR, "minute", policy)?;
        let second = parse_field(
            input,
            Some(second_part).filter(|s| !s.is_empty()),
            SECONDS_PER_MINUTE,
            "second",
            policy,
        )?;

        // A gap in the middle is ambiguous: hour + second without minute
        // invalidates the whole spec.
        if hour.is_some() && second.is_some() && minute.is_none() {
            return match policy {
                TimeFieldPolicy::Strict => Err(ConfigError::InvalidTime {
                    value: input.to_string(),
                    detail: "hour and second set without minute".to_string(),
                }),
                TimeFieldPolicy::Lenient => {
                    tracing::warn!(value = input, "invalid time format, spec left unset");
                    Ok(TimeSpec::UNSET)
                }
            };
        }

        Ok(TimeSpec {
            hour,
            minute,
            second,
        })
    }

    /// True iff at least one field is set.
    pub fn is_valid(&self) -> bool {
        self.hour.is_some() || self.minute.is_some() || self.second.is_some()
    }

    /// True iff the hour field is set.
    pub fn has_hours(&self) -> bool {
        self.hour.is_some()
    }

    /// True iff the minute field is set.
    pub fn has_minutes(&self) -> bool {
        self.minute.is_some()
    }

    /// True iff the second field is set.
    pub fn has_seconds(&self) -> bool {
        self.second.is_some()
    }

    /// Hour component, if set.
    pub fn hours(&self) -> Option<u8> {
        self.hour
    }

    /// Minute component, if set.
    pub fn minutes(&self) -> Option<u8> {
        self.minute
    }

    /// Second component, if set.
    pub fn seconds(&self) -> Option<u8> {
        self.second
    }

    /// The spec expressed in seconds, unset fields treated as 0.
    pub fn time_in_seconds(&self) -> u64 {
        let h = u64::from(self.hour.unwrap_or(0));
        let m = u64::from(self.minute.unwrap_or(0));
        let s = u64::from(self.second.unwrap_or(0));
        (h * 60 + m) * 60 + s
    }
}

/// Validates one all-digit field against its natural range.
fn parse_field(
    input: &str,
    part: Option<&str>,
    limit: u8,
    name: &'static str,
    policy: TimeFieldPolicy,
) -> Result<Option<u8>, ConfigError> {
    let Some(raw) = part else {
        return Ok(None);
    };
    if raw.is_empty() {
        return Ok(None);
    }

    let parsed = if raw.bytes().all(|b| b.is_ascii_digit()) {
        raw.parse::<u64>().ok().filter(|v| *v < u64::from(limit))
    } else {
        None
    };

    match parsed {
        Some(v) => Ok(Some(v as u8)),
        None => match policy {
            TimeFieldPolicy::Strict => Err(ConfigError::InvalidTime {
                value: input.to_string(),
                detail: format!("{name} field {raw:?} is not a value below {limit}"),
            }),
            TimeFieldPolicy::Lenient => {
                tracing::warn!(value = input, field = name, "invalid time field, left unset");
                Ok(None)
            }
        },
    }
}
