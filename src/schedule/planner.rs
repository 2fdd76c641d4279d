//! # Trigger planner: from schedule mode + TimeSpec to absolute instants.
//!
//! Computes the next absolute trigger instant for a job from its
//! [`SchedulePlan`]. The three modes:
//!
//! ```text
//! Relative             trigger = now + time (unset fields = 0)
//! Absolute             trigger = today's slot; if already passed, advance by
//!                      one unit of the coarsest set field (day/hour/minute)
//! AbsoluteWithInterval trigger = the smallest lattice point slot₀ + k·step
//!                      that is ≥ now (phase anchored at the configured slot)
//! ```
//!
//! `now` is computed once per planning call. A trigger exactly equal to `now`
//! is reported as [`Trigger::Immediate`] so the caller submits the dispatch
//! directly instead of arming a timer.
//!
//! ## Lattice stability
//! Recurring triggers always land on the fixed lattice `slot₀ + k·step`:
//! the initial alignment walks the slot backward/forward in whole steps, and
//! rescheduling uses [`next_in_lattice`] from the previous trigger rather
//! than `now + step`, so the phase never drifts with dispatch latency.

use chrono::{Duration, NaiveDateTime, Timelike};
use serde::Deserialize;

use super::timespec::TimeSpec;

/// How the schedule's [`TimeSpec`] is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum ScheduleMode {
    /// Offset from the moment of activation.
    #[serde(rename = "relative")]
    Relative,
    /// A wall-clock slot; fires at its next occurrence.
    #[serde(rename = "absolute")]
    Absolute,
    /// A wall-clock slot plus a repeating phase-anchored interval.
    #[serde(rename = "interval")]
    AbsoluteWithInterval,
}

/// Next trigger instant for a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// Dispatch right away (no timer entry).
    Immediate,
    /// Dispatch at the given local wall-clock instant.
    At(NaiveDateTime),
}

/// Validated schedule for one job: mode, slot time, and repeat interval.
///
/// An invalid interval means run-once; this applies to every mode, so a
/// relative or unscheduled job with a valid interval still repeats, with the
/// lattice anchored at its first trigger.
#[derive(Clone, Copy, Debug)]
pub struct SchedulePlan {
    /// Interpretation of `time`; `None` means "launch immediately".
    pub mode: Option<ScheduleMode>,
    /// Slot or offset time.
    pub time: TimeSpec,
    /// Repeat interval; invalid ⇒ run-once.
    pub interval: TimeSpec,
}

impl SchedulePlan {
    /// A plan without any schedule: launch immediately, run once.
    pub fn run_once() -> Self {
        Self {
            mode: None,
            time: TimeSpec::UNSET,
            interval: TimeSpec::UNSET,
        }
    }

    /// The repeat step, when the interval is valid and non-zero.
    pub fn step(&self) -> Option<Duration> {
        if !self.interval.is_valid() {
            return None;
        }
        let secs = self.interval.time_in_seconds();
        (secs > 0).then(|| Duration::seconds(secs as i64))
    }

    /// True when the job re-arms itself after each run.
    pub fn is_repeating(&self) -> bool {
        self.step().is_some()
    }

    /// Computes the first trigger from the current instant.
    ///
    /// Assumes the plan passed configuration validation (interval mode has a
    /// positive step, absolute modes have a seconds field).
    pub fn first_trigger(&self, now: NaiveDateTime) -> Trigger {
        match self.mode {
            None => Trigger::Immediate,
            Some(ScheduleMode::Relative) => {
                let secs = self.time.time_in_seconds();
                if secs == 0 {
                    Trigger::Immediate
                } else {
                    Trigger::At(now + Duration::seconds(secs as i64))
                }
            }
            Some(ScheduleMode::Absolute) => {
                let mut slot = build_slot(&self.time, now);
                if slot <= now {
                    slot = advance_coarsest(slot, &self.time);
                }
                Trigger::At(slot)
            }
            Some(ScheduleMode::AbsoluteWithInterval) => {
                let step = match self.step() {
                    Some(step) => step,
                    // Rejected at validation time; degrade to the plain slot.
                    None => return Trigger::At(build_slot(&self.time, now)),
                };
                let aligned = align_to_lattice(build_slot(&self.time, now), step, now);
                if aligned == now {
                    Trigger::Immediate
                } else {
                    Trigger::At(aligned)
                }
            }
        }
    }
}

/// Builds today's slot: configured fields win, the rest comes from `now`.
///
/// The seconds field is required by validation for the absolute modes, so the
/// fallback to 0 here is never observable through a validated plan.
fn build_slot(time: &TimeSpec, now: NaiveDateTime) -> NaiveDateTime {
    let hour = time.hours().map(u32::from).unwrap_or_else(|| now.hour());
    let minute = time.minutes().map(u32::from).unwrap_or_else(|| now.minute());
    let second = time.seconds().map(u32::from).unwrap_or(0);
    now.date()
        .and_hms_opt(hour, minute, second)
        .expect("time fields validated against their ranges")
}

/// Advances a passed slot by one unit of the coarsest set field.
fn advance_coarsest(slot: NaiveDateTime, time: &TimeSpec) -> NaiveDateTime {
    if time.has_hours() {
        slot + Duration::days(1)
    } else if time.has_minutes() {
        slot + Duration::hours(1)
    } else {
        slot + Duration::minutes(1)
    }
}

/// Aligns `slot` to the smallest lattice point `slot + k·step` (k ∈ ℤ) that
/// is not earlier than `now`.
fn align_to_lattice(mut slot: NaiveDateTime, step: Duration, now: NaiveDateTime) -> NaiveDateTime {
    if slot >= now {
        while slot - step >= now {
            slot = slot - step;
        }
    } else {
        while slot < now {
            slot = slot + step;
        }
    }
    slot
}

/// The strictly-next lattice point after `now`, walking forward from the
/// previous trigger. Used for rescheduling so a slow dispatch catches up to
/// the lattice instead of shifting it.
pub fn next_in_lattice(prev: NaiveDateTime, step: Duration, now: NaiveDateTime) -> NaiveDateTime {
    let mut next = prev + step;
    while next <= now {
        next = next + step;
    }
    next
}
