use std::time::Duration;

/// One shell command in a toolchain's pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub command: Vec<String>,
    /// Label shown in progress lines, e.g. "Building".
    pub status: String,
    /// A failing fatal step ends the pipeline.
    pub fatal: bool,
    /// `None` lets the step run to completion.
    pub timeout: Option<Duration>,
}

impl Step {
    pub fn new(command: Vec<String>, status: impl Into<String>) -> Self {
        Self {
            command,
            status: status.into(),
            fatal: true,
            timeout: None,
        }
    }

    pub fn non_fatal(mut self) -> Self {
        self.fatal = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Command line handed to the shell.
    pub fn shell_command(&self) -> String {
        self.command
            .iter()
            .map(|arg| quote(arg))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub type Pipeline = Vec<Step>;

/// Config files use negative seconds to mean "no deadline".
pub fn timeout_from_secs(secs: i64) -> Option<Duration> {
    u64::try_from(secs).ok().map(Duration::from_secs)
}

/// Wraps arguments containing spaces in double quotes. Existing surrounding
/// quotes are not doubled.
pub fn quote(arg: &str) -> String {
    if arg.contains(' ') {
        format!("\"{}\"", arg.trim_matches('"'))
    } else {
        arg.to_string()
    }
}
