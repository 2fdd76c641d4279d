//! What to launch: command, arguments, and the close timeout.

use std::time::Duration;

/// Grace period granted to a process on shutdown before escalation.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

/// A command-line parameter: an option flag with an optional value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub option: String,
    pub value: Option<String>,
}

/// Validated description of the process a job launches.
#[derive(Debug, Clone)]
pub struct JobDescriptor {
    command: String,
    parameters: Vec<Parameter>,
    close_timeout: Duration,
}

impl JobDescriptor {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            parameters: Vec::new(),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    /// Appends an option, optionally followed by its value.
    pub fn with_parameter(mut self, option: impl Into<String>, value: Option<String>) -> Self {
        self.parameters.push(Parameter {
            option: option.into(),
            value,
        });
        self
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn close_timeout(&self) -> Duration {
        self.close_timeout
    }

    /// Flattened argument list, options interleaved with their values.
    pub fn argv(&self) -> Vec<&str> {
        let mut args = Vec::with_capacity(self.parameters.len() * 2);
        for p in &self.parameters {
            args.push(p.option.as_str());
            if let Some(value) = &p.value {
                args.push(value.as_str());
            }
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argv_interleaves_options_and_values() {
        let d = JobDescriptor::new("/bin/tool")
            .with_parameter("-c", Some("cfg.json".into()))
            .with_parameter("--verbose", None)
            .with_parameter("-n", Some("3".into()));
        assert_eq!(d.argv(), vec!["-c", "cfg.json", "--verbose", "-n", "3"]);
    }

    #[test]
    fn test_default_close_timeout() {
        let d = JobDescriptor::new("/bin/true");
        assert_eq!(d.close_timeout(), Duration::from_secs(3));
        assert!(d.argv().is_empty());
    }
}
