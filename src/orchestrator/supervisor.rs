//! Fan-out of workers and the event drain loop.
//!
//! The supervisor is the only writer to the console. It spawns one worker
//! thread per toolchain, renders their progress as it arrives, and replays
//! the logs of failing toolchains once every worker is done.

use super::events::{Event, ProgressEvent, ResultEvent, WorkerStatus};
use super::watchdog::POLL_INTERVAL;
use super::worker::{Worker, WorkerSpec};
use crate::interrupt::{self, CancelToken};
use crate::ui::{self, LogRules, Severity};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// How long the drain loop blocks before checking for dead workers.
const DRAIN_TICK: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Replay every log, not just failing ones.
    pub verbose: bool,
    /// Cancel all other workers on the first failure.
    pub fail_fast: bool,
    pub rules: LogRules,
    /// Poll interval handed down to each worker's step waits.
    pub poll_interval: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            fail_fast: false,
            rules: LogRules::standard(),
            poll_interval: POLL_INTERVAL,
        }
    }
}

/// A unit of work run on its own thread. It must send one
/// [`Event::Result`] tagged with `id`; a job that dies without doing so gets
/// a failure synthesized for it.
pub struct Job {
    pub id: String,
    /// Read back for the synthesized failure if the job dies.
    pub log_path: Option<PathBuf>,
    pub run: Box<dyn FnOnce(Sender<Event>, CancelToken) + Send>,
}

#[derive(Debug, Clone)]
pub struct ToolchainResult {
    pub id: String,
    pub status: WorkerStatus,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectReport {
    pub project: String,
    pub results: Vec<ToolchainResult>,
    /// Fail-fast stopped the run before every toolchain reported.
    pub cancelled_early: bool,
    pub interrupted: bool,
    /// Set when the project could not be resolved into workers.
    pub error: Option<String>,
}

impl ProjectReport {
    pub fn new(project: &str) -> Self {
        Self {
            project: project.to_string(),
            ..Default::default()
        }
    }

    pub fn config_error(project: &str, message: String) -> Self {
        Self {
            error: Some(message),
            ..Self::new(project)
        }
    }

    pub fn success(&self) -> bool {
        self.error.is_none()
            && !self.interrupted
            && !self.cancelled_early
            && self.results.iter().all(|r| r.status == WorkerStatus::Passed)
    }
}

pub struct Supervisor {
    options: SupervisorOptions,
}

struct Slot {
    id: String,
    log_path: Option<PathBuf>,
    handle: Option<JoinHandle<()>>,
    cancel: CancelToken,
    started: Instant,
    reported: bool,
}

struct Drain<'a> {
    options: &'a SupervisorOptions,
    out: &'a mut dyn Write,
    slots: Vec<Slot>,
    finished: usize,
    report: ProjectReport,
    replay: Vec<(String, String)>,
}

impl Supervisor {
    pub fn new(options: SupervisorOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    /// Runs one worker per spec concurrently and waits for all of them.
    pub fn run_project(
        &self,
        out: &mut dyn Write,
        project: &str,
        specs: Vec<WorkerSpec>,
    ) -> io::Result<ProjectReport> {
        let poll_interval = self.options.poll_interval;
        let jobs = specs
            .into_iter()
            .map(|spec| Job {
                id: spec.id.clone(),
                log_path: Some(spec.log_path.clone()),
                run: Box::new(move |events, cancel| {
                    Worker::new(spec, events, cancel)
                        .with_poll_interval(poll_interval)
                        .run();
                }),
            })
            .collect();
        self.run_jobs(out, project, jobs)
    }

    pub fn run_jobs(
        &self,
        out: &mut dyn Write,
        project: &str,
        jobs: Vec<Job>,
    ) -> io::Result<ProjectReport> {
        let (tx, rx) = mpsc::channel();
        let slots = jobs.into_iter().map(|job| spawn(job, &tx)).collect();
        drop(tx);

        let mut drain = Drain {
            options: &self.options,
            out,
            slots,
            finished: 0,
            report: ProjectReport::new(project),
            replay: Vec::new(),
        };
        drain.run(&rx)?;
        drain.finish()
    }
}

fn spawn(job: Job, events: &Sender<Event>) -> Slot {
    let cancel = CancelToken::new();
    let thread_events = events.clone();
    let thread_cancel = cancel.clone();
    let run = job.run;

    let handle = thread::Builder::new()
        .name(format!("worker-{}", job.id))
        .spawn(move || run(thread_events, thread_cancel));
    let handle = match handle {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!(worker = %job.id, error = %e, "failed to spawn worker thread");
            None
        }
    };

    Slot {
        id: job.id,
        log_path: job.log_path,
        handle,
        cancel,
        started: Instant::now(),
        reported: false,
    }
}

impl Drain<'_> {
    fn run(&mut self, rx: &Receiver<Event>) -> io::Result<()> {
        while self.finished < self.slots.len() {
            match rx.recv_timeout(DRAIN_TICK) {
                Ok(event) => {
                    if self.dispatch(event)? {
                        return self.stop_all(rx);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.reap_dead(rx)? {
                        return self.stop_all(rx);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    if self.reap_dead(rx)? {
                        return self.stop_all(rx);
                    }
                    // A worker may have dropped its sender a moment before
                    // its thread is marked finished.
                    thread::sleep(DRAIN_TICK);
                }
            }
        }
        Ok(())
    }

    /// Returns true when fail-fast should stop the run.
    fn dispatch(&mut self, event: Event) -> io::Result<bool> {
        let Some(idx) = self.slots.iter().position(|s| s.id == event.worker_id()) else {
            warn!(worker = event.worker_id(), "event from unknown worker");
            return Ok(false);
        };
        if self.slots[idx].reported {
            debug!(worker = event.worker_id(), "event after result ignored");
            return Ok(false);
        }

        match event {
            Event::Progress(progress) => {
                self.render_progress(&progress)?;
                Ok(false)
            }
            Event::Result(result) => {
                self.slots[idx].reported = true;
                self.finished += 1;
                self.record(result)
            }
        }
    }

    fn render_progress(&mut self, p: &ProgressEvent) -> io::Result<()> {
        let line = format!(
            "[{}] [{}/{}] {}",
            p.worker_id,
            p.step_index + 1,
            p.step_count,
            p.status
        );
        ui::print_line(self.out, &line, Severity::Default)
    }

    fn record(&mut self, result: ResultEvent) -> io::Result<bool> {
        let severity = match result.status {
            WorkerStatus::Passed => Severity::Success,
            WorkerStatus::Failed => Severity::Error,
            WorkerStatus::Cancelled => Severity::Warning,
        };
        let line = format!("[{}] {}", result.worker_id, result.status.label());
        ui::print_line(self.out, &line, severity)?;

        self.report.results.push(ToolchainResult {
            id: result.worker_id.clone(),
            status: result.status,
            elapsed: result.elapsed,
        });

        let failed = result.status == WorkerStatus::Failed;
        if failed || self.options.verbose {
            self.replay.push((result.worker_id, result.log));
        }
        Ok(failed && self.options.fail_fast)
    }

    /// Synthesizes failures for workers whose thread ended without a result.
    fn reap_dead(&mut self, rx: &Receiver<Event>) -> io::Result<bool> {
        // Snapshot finished threads first: anything they sent is queued by
        // now, so draining afterwards cannot miss a real result.
        let dead: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.reported && s.handle.as_ref().is_none_or(|h| h.is_finished()))
            .map(|(i, _)| i)
            .collect();
        if dead.is_empty() {
            return Ok(false);
        }

        while let Ok(event) = rx.try_recv() {
            if self.dispatch(event)? {
                return Ok(true);
            }
        }

        for idx in dead {
            if self.slots[idx].reported {
                continue;
            }
            let reason = match self.slots[idx].handle.take().map(JoinHandle::join) {
                Some(Err(_)) => "worker panicked",
                Some(Ok(())) => "worker exited without reporting a result",
                None => "worker could not be started",
            };
            let result = self.synthesize_failure(idx, reason);
            self.slots[idx].reported = true;
            self.finished += 1;
            if self.record(result)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn synthesize_failure(&self, idx: usize, reason: &str) -> ResultEvent {
        let slot = &self.slots[idx];
        error!(worker = %slot.id, reason, "synthesizing failure");

        let mut log = slot
            .log_path
            .as_ref()
            .and_then(|path| fs::read(path).ok())
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default();
        if !log.is_empty() && !log.ends_with('\n') {
            log.push('\n');
        }
        log.push_str(&format!("[{}] FAILED: {reason}\n", slot.id));

        ResultEvent {
            worker_id: slot.id.clone(),
            status: WorkerStatus::Failed,
            log,
            elapsed: slot.started.elapsed(),
        }
    }

    /// Fail-fast: hard-kill every remaining worker and wait for them.
    fn stop_all(&mut self, rx: &Receiver<Event>) -> io::Result<()> {
        self.report.cancelled_early = true;
        for slot in self.slots.iter().filter(|s| !s.reported) {
            debug!(worker = %slot.id, "fail-fast cancel");
            slot.cancel.cancel();
        }
        for slot in &mut self.slots {
            if let Some(handle) = slot.handle.take() {
                let _ = handle.join();
            }
        }

        // Record the CANCELLED results the stopped workers sent on their way out.
        while let Ok(event) = rx.try_recv() {
            if matches!(event, Event::Result(_)) {
                self.dispatch(event)?;
            }
        }
        Ok(())
    }

    fn finish(mut self) -> io::Result<ProjectReport> {
        for slot in &mut self.slots {
            if let Some(handle) = slot.handle.take() {
                let _ = handle.join();
            }
        }

        for (id, log) in &self.replay {
            ui::print_line(self.out, &format!("[{id}] OUTPUT START"), Severity::Banner)?;
            for line in log.lines() {
                ui::print_line(self.out, line, self.options.rules.classify(line))?;
            }
            ui::print_line(self.out, &format!("[{id}] OUTPUT END"), Severity::Banner)?;
        }

        self.report.interrupted = interrupt::interrupted();
        Ok(self.report)
    }
}
