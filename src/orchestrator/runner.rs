use super::watchdog::{self, POLL_INTERVAL, StepOutcome, Watchdog};
use crate::env::EnvSnapshot;
use crate::interrupt::CancelToken;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::debug;

/// Runs a toolchain's shell commands with its working directory, environment
/// and log file. Stdout and stderr of every command are appended to the log.
#[derive(Debug, Clone)]
pub struct StepRunner {
    working_dir: PathBuf,
    env: EnvSnapshot,
    log_path: PathBuf,
    poll_interval: Duration,
}

impl StepRunner {
    pub fn new(working_dir: PathBuf, env: EnvSnapshot, log_path: PathBuf) -> Self {
        Self {
            working_dir,
            env,
            log_path,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Truncates the log so a run never shows output from the previous one.
    pub fn reset_log(&self) -> io::Result<()> {
        if let Some(parent) = self.log_path.parent() {
            fs::create_dir_all(parent)?;
        }
        File::create(&self.log_path).map(|_| ())
    }

    pub fn append_log(&self, line: &str) -> io::Result<()> {
        let mut log = self.open_log()?;
        writeln!(log, "{line}")
    }

    pub fn read_log(&self) -> io::Result<String> {
        fs::read(&self.log_path).map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Runs `shell_command` and returns how it ended.
    ///
    /// With a timeout the process is handed to a [`Watchdog`]; without one it
    /// is waited on here, still honouring `cancel`.
    pub fn run(
        &self,
        shell_command: &str,
        timeout: Option<Duration>,
        cancel: &CancelToken,
    ) -> io::Result<StepOutcome> {
        let log = self.open_log()?;
        let mut cmd = shell(shell_command);
        cmd.current_dir(&self.working_dir)
            .env_clear()
            .envs(self.env.iter())
            .stdin(Stdio::null())
            .stdout(log.try_clone()?)
            .stderr(log);

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn()?;
        debug!(pid = child.id(), command = shell_command, ?timeout, "step started");

        let outcome = match timeout {
            Some(deadline) => {
                Watchdog::spawn(child, deadline, cancel.clone(), self.poll_interval)?.join()?
            }
            None => watchdog::supervise(&mut child, None, cancel, self.poll_interval)?,
        };
        debug!(?outcome, command = shell_command, "step finished");
        Ok(outcome)
    }

    fn open_log(&self) -> io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
    }
}

/// `cmd /C` on Windows, `sh -c` elsewhere.
///
/// Step commands carry their own quoting (`-G "NMake Makefiles"`, quoted
/// script paths), so on Windows the line is passed raw. Std's argument
/// escaping would turn those quotes into `\"`, which `cmd.exe` does not
/// understand.
#[cfg(windows)]
fn shell(command: &str) -> Command {
    use std::os::windows::process::CommandExt;

    let mut cmd = Command::new("cmd");
    cmd.raw_arg(format!("/C {command}"));
    cmd
}

#[cfg(not(windows))]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", command]);
    cmd
}
