//! Deadline enforcement for a running step.
//!
//! The watchdog owns the step's [`Child`] on its own thread and polls it. If
//! the deadline passes first the whole process group is killed, so a hung
//! test binary (and anything it forked) cannot outlive its step.

use crate::interrupt::CancelToken;
use std::io;
use std::process::{Child, ExitStatus};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Interval between two polls of a watched process.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// First sleep of an untimed wait. It doubles up to the poll interval, so
/// short steps are reaped quickly and long ones are still polled rarely.
const UNTIMED_FIRST_NAP: Duration = Duration::from_millis(10);

/// Exit code reported when a process ended without one.
pub const UNKNOWN_EXIT_CODE: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The process exited on its own.
    Exited(i32),
    /// The deadline passed and the process was killed.
    TimedOut { code: i32 },
    /// The step was torn down by fail-fast or an interrupt.
    Cancelled,
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Exited(0))
    }

    pub fn code(&self) -> i32 {
        match self {
            StepOutcome::Exited(code) | StepOutcome::TimedOut { code } => *code,
            StepOutcome::Cancelled => UNKNOWN_EXIT_CODE,
        }
    }
}

pub struct Watchdog {
    handle: JoinHandle<io::Result<StepOutcome>>,
}

impl Watchdog {
    /// Starts watching `child` on a dedicated thread. The watchdog cannot be
    /// stopped from outside except through `cancel`; it always ends once the
    /// process exits or the deadline is reached.
    pub fn spawn(
        mut child: Child,
        deadline: Duration,
        cancel: CancelToken,
        poll_interval: Duration,
    ) -> io::Result<Self> {
        let pid = child.id();
        let handle = thread::Builder::new()
            .name(format!("watchdog-{pid}"))
            .spawn(move || supervise(&mut child, Some(deadline), &cancel, poll_interval))?;
        Ok(Self { handle })
    }

    /// Blocks until the watched process is gone.
    pub fn join(self) -> io::Result<StepOutcome> {
        self.handle
            .join()
            .map_err(|_| io::Error::other("watchdog thread panicked"))?
    }
}

/// Polls `child` until it exits, `deadline` elapses or `cancel` trips.
///
/// The last sleep before the deadline is shortened so the kill never lands
/// early and never much later than the deadline.
pub fn supervise(
    child: &mut Child,
    deadline: Option<Duration>,
    cancel: &CancelToken,
    poll_interval: Duration,
) -> io::Result<StepOutcome> {
    let started = Instant::now();
    let mut untimed_nap = UNTIMED_FIRST_NAP.min(poll_interval);
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(StepOutcome::Exited(exit_code(status)));
        }

        if cancel.is_cancelled() {
            debug!(pid = child.id(), "cancelled, killing step");
            kill_tree(child)?;
            return Ok(StepOutcome::Cancelled);
        }

        let elapsed = started.elapsed();
        let nap = match deadline {
            Some(deadline) if elapsed >= deadline => {
                warn!(pid = child.id(), ?deadline, "deadline exceeded, killing step");
                let status = kill_tree(child)?;
                let code = match exit_code(status) {
                    0 => UNKNOWN_EXIT_CODE,
                    code => code,
                };
                return Ok(StepOutcome::TimedOut { code });
            }
            Some(deadline) => poll_interval.min(deadline - elapsed),
            None => {
                let nap = untimed_nap;
                untimed_nap = (untimed_nap * 2).min(poll_interval);
                nap
            }
        };
        thread::sleep(nap);
    }
}

/// Hard-kills the child and its process group, then reaps it.
pub fn kill_tree(child: &mut Child) -> io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Err(e) = killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL) {
            debug!(pid = child.id(), error = %e, "killpg failed, falling back to kill");
        }
    }
    // Already-exited children make this a no-op.
    let _ = child.kill();
    child.wait()
}

/// Signal deaths map to `128 + signal` like a shell reports them.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    UNKNOWN_EXIT_CODE
}
