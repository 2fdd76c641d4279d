//! # Job configuration.
//!
//! Deserialized from JSON, then validated into the runtime types: a
//! [`JobDescriptor`] (what to launch) and a [`SchedulePlan`] (when). All
//! structural checks happen here so the orchestrator can assume a
//! well-formed plan.

use serde::Deserialize;

use crate::error::ConfigError;
use crate::job::JobDescriptor;
use crate::schedule::{ScheduleMode, SchedulePlan, TimeFieldPolicy, TimeSpec};

/// One command-line parameter: an option flag and its optional value.
#[derive(Debug, Clone, Deserialize)]
pub struct JobParameter {
    pub option: String,
    #[serde(default)]
    pub value: Option<String>,
}

/// When to launch: interpretation mode, slot time, repeat interval.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    pub mode: ScheduleMode,
    /// `HH:MM.SS` slot or offset; any field may be omitted.
    #[serde(default)]
    pub time: String,
    /// `HH:MM.SS` repeat interval; empty means run-once.
    #[serde(default)]
    pub interval: String,
}

/// Configuration of one supervised job.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Path of the binary to launch. Required.
    #[serde(default)]
    pub command: String,
    /// Command-line parameters, in order.
    #[serde(default)]
    pub parameters: Vec<JobParameter>,
    /// Seconds granted on shutdown before the kill escalates.
    #[serde(default = "default_closetime")]
    pub closetime: u16,
    /// Scheduling; absent means launch immediately, run once.
    #[serde(default)]
    pub schedule: Option<ScheduleConfig>,
}

fn default_closetime() -> u16 {
    3
}

impl JobConfig {
    /// Validates the document into runtime types.
    ///
    /// Checks, in order: the command is present; time fields parse under
    /// `policy`; absolute modes carry a seconds field (the slot would be
    /// ambiguous without one); interval mode carries a positive interval.
    pub fn validate(
        &self,
        policy: TimeFieldPolicy,
    ) -> Result<(JobDescriptor, SchedulePlan), ConfigError> {
        if self.command.is_empty() {
            return Err(ConfigError::MissingCommand);
        }

        let mut descriptor = JobDescriptor::new(&self.command)
            .with_close_timeout(std::time::Duration::from_secs(u64::from(self.closetime)));
        for p in &self.parameters {
            descriptor = descriptor.with_parameter(&p.option, p.value.clone());
        }

        let plan = match &self.schedule {
            None => SchedulePlan::run_once(),
            Some(schedule) => {
                let time = TimeSpec::parse(&schedule.time, policy)?;
                let interval = TimeSpec::parse(&schedule.interval, policy)?;

                match schedule.mode {
                    ScheduleMode::Absolute | ScheduleMode::AbsoluteWithInterval
                        if !time.has_seconds() =>
                    {
                        return Err(ConfigError::SecondsRequired {
                            value: schedule.time.clone(),
                        });
                    }
                    _ => {}
                }
                if schedule.mode == ScheduleMode::AbsoluteWithInterval
                    && (!interval.is_valid() || interval.time_in_seconds() == 0)
                {
                    return Err(ConfigError::IntervalRequired);
                }

                SchedulePlan {
                    mode: Some(schedule.mode),
                    time,
                    interval,
                }
            }
        };

        Ok((descriptor, plan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> JobConfig {
        serde_json::from_str(json).expect("config parses")
    }

    #[test]
    fn test_minimal_config_runs_once() {
        let cfg = parse(r#"{ "command": "/bin/true" }"#);
        let (descriptor, plan) = cfg.validate(TimeFieldPolicy::default()).unwrap();
        assert_eq!(descriptor.command(), "/bin/true");
        assert_eq!(descriptor.close_timeout().as_secs(), 3);
        assert!(plan.mode.is_none());
        assert!(!plan.is_repeating());
    }

    #[test]
    fn test_full_config() {
        let cfg = parse(
            r#"{
                "command": "/usr/bin/backup",
                "parameters": [
                    { "option": "-c", "value": "/etc/backup.json" },
                    { "option": "--quiet" }
                ],
                "closetime": 10,
                "schedule": { "mode": "interval", "time": "03:00.00", "interval": "01:00.00" }
            }"#,
        );
        let (descriptor, plan) = cfg.validate(TimeFieldPolicy::default()).unwrap();
        assert_eq!(
            descriptor.argv(),
            vec!["-c", "/etc/backup.json", "--quiet"]
        );
        assert_eq!(descriptor.close_timeout().as_secs(), 10);
        assert_eq!(plan.mode, Some(ScheduleMode::AbsoluteWithInterval));
        assert_eq!(plan.step().map(|s| s.num_seconds()), Some(3600));
    }

    #[test]
    fn test_missing_command_rejected() {
        let cfg = parse(r#"{ "parameters": [] }"#);
        let err = cfg.validate(TimeFieldPolicy::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCommand));
    }

    #[test]
    fn test_absolute_without_seconds_rejected() {
        let cfg = parse(
            r#"{ "command": "/bin/true", "schedule": { "mode": "absolute", "time": "12:30" } }"#,
        );
        let err = cfg.validate(TimeFieldPolicy::default()).unwrap_err();
        assert!(matches!(err, ConfigError::SecondsRequired { .. }));
    }

    #[test]
    fn test_interval_mode_without_interval_rejected() {
        let cfg = parse(
            r#"{ "command": "/bin/true", "schedule": { "mode": "interval", "time": "12:30.00" } }"#,
        );
        let err = cfg.validate(TimeFieldPolicy::default()).unwrap_err();
        assert!(matches!(err, ConfigError::IntervalRequired));
    }

    #[test]
    fn test_relative_mode_needs_no_seconds() {
        let cfg = parse(
            r#"{ "command": "/bin/true", "schedule": { "mode": "relative", "time": "10" } }"#,
        );
        let (_, plan) = cfg.validate(TimeFieldPolicy::default()).unwrap();
        assert_eq!(plan.mode, Some(ScheduleMode::Relative));
        assert_eq!(plan.time.time_in_seconds(), 10);
    }

    #[test]
    fn test_malformed_time_policy_split() {
        let json = r#"{
            "command": "/bin/true",
            "schedule": { "mode": "relative", "time": "xx:10.05" }
        }"#;
        // Lenient: the malformed hour degrades to unset.
        let (_, plan) = parse(json).validate(TimeFieldPolicy::Lenient).unwrap();
        assert_eq!(plan.time.time_in_seconds(), 605);
        // Strict: the whole configuration is rejected.
        let err = parse(json).validate(TimeFieldPolicy::Strict).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTime { .. }));
    }
}
