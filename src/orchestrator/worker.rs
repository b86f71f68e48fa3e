use super::events::{Event, ProgressEvent, ResultEvent, WorkerStatus};
use super::runner::StepRunner;
use super::shim::EnvShim;
use super::step::{Pipeline, Step};
use super::watchdog::StepOutcome;
use crate::env::EnvSnapshot;
use crate::interrupt::CancelToken;
use std::io;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Everything needed to run one toolchain against one project.
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    /// Toolchain name; tags every event and names the log file.
    pub id: String,
    pub pipeline: Pipeline,
    pub working_dir: PathBuf,
    pub env: EnvSnapshot,
    pub log_path: PathBuf,
    /// Setup scripts to source before each step, if the toolchain needs them.
    pub setenv: Option<Vec<String>>,
}

/// Runs a pipeline step by step and reports over the event channel.
///
/// Steps run strictly in order. A failing fatal step ends the pipeline; a
/// failing non-fatal step is only recorded in the log.
pub struct Worker {
    id: String,
    pipeline: Pipeline,
    runner: StepRunner,
    shim: Option<EnvShim>,
    events: Sender<Event>,
    cancel: CancelToken,
}

impl Worker {
    pub fn new(spec: WorkerSpec, events: Sender<Event>, cancel: CancelToken) -> Self {
        let shim = spec
            .setenv
            .map(|scripts| EnvShim::new(scripts, &spec.working_dir));
        Self {
            id: spec.id,
            pipeline: spec.pipeline,
            runner: StepRunner::new(spec.working_dir, spec.env, spec.log_path),
            shim,
            events,
            cancel,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.runner = self.runner.with_poll_interval(poll_interval);
        self
    }

    /// Runs the whole pipeline, then sends the single result event.
    pub fn run(self) -> WorkerStatus {
        let started = Instant::now();
        info!(worker = %self.id, steps = self.pipeline.len(), "worker started");

        let status = self.run_pipeline();
        let log = self.runner.read_log().unwrap_or_else(|e| {
            format!(
                "[{}] could not read log {}: {e}",
                self.id,
                self.runner.log_path().display()
            )
        });

        info!(worker = %self.id, ?status, "worker finished");
        let _ = self.events.send(Event::Result(ResultEvent {
            worker_id: self.id.clone(),
            status,
            log,
            elapsed: started.elapsed(),
        }));
        status
    }

    fn run_pipeline(&self) -> WorkerStatus {
        if let Err(e) = self.runner.reset_log() {
            warn!(worker = %self.id, error = %e, "cannot create log file");
            return WorkerStatus::Failed;
        }

        let step_count = self.pipeline.len();
        for (step_index, step) in self.pipeline.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return WorkerStatus::Cancelled;
            }

            // The receiver outlives every worker of its project.
            let _ = self.events.send(Event::Progress(ProgressEvent {
                worker_id: self.id.clone(),
                step_index,
                step_count,
                status: step.status.clone(),
            }));

            let failed = match self.run_step(step) {
                Ok(StepOutcome::Cancelled) => {
                    self.note(&format!("[{}] Cancelled during '{}'", self.id, step.status));
                    return WorkerStatus::Cancelled;
                }
                Ok(outcome @ StepOutcome::TimedOut { .. }) => {
                    let deadline = step.timeout.unwrap_or_default();
                    self.note(&format!("[{}] Killed by watchdog after {deadline:?}", self.id));
                    !outcome.is_success()
                }
                Ok(outcome) => {
                    debug!(worker = %self.id, step = %step.status, code = outcome.code(), "step exited");
                    !outcome.is_success()
                }
                Err(e) => {
                    self.note(&format!("[{}] Could not run '{}': {e}", self.id, step.status));
                    true
                }
            };

            if failed && step.fatal {
                return WorkerStatus::Failed;
            }
        }
        WorkerStatus::Passed
    }

    fn run_step(&self, step: &Step) -> io::Result<StepOutcome> {
        let mut command = step.shell_command();
        if let Some(shim) = &self.shim {
            command = shim.wrap(&command)?;
        }
        self.runner.run(&command, step.timeout, &self.cancel)
    }

    fn note(&self, line: &str) {
        warn!(worker = %self.id, "{line}");
        if let Err(e) = self.runner.append_log(line) {
            warn!(worker = %self.id, error = %e, "cannot append to log");
        }
    }
}
