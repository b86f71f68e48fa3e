use std::time::Duration;

/// Messages sent by workers to the supervisor over the shared channel.
#[derive(Debug, Clone)]
pub enum Event {
    Progress(ProgressEvent),
    Result(ResultEvent),
}

impl Event {
    pub fn worker_id(&self) -> &str {
        match self {
            Event::Progress(p) => &p.worker_id,
            Event::Result(r) => &r.worker_id,
        }
    }
}

/// Sent right before a step starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub worker_id: String,
    /// Zero-based.
    pub step_index: usize,
    pub step_count: usize,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Passed,
    Failed,
    Cancelled,
}

impl WorkerStatus {
    pub fn label(&self) -> &'static str {
        match self {
            WorkerStatus::Passed => "PASSED",
            WorkerStatus::Failed => "FAILED",
            WorkerStatus::Cancelled => "CANCELLED",
        }
    }
}

/// Sent exactly once per worker, after its last progress event.
#[derive(Debug, Clone)]
pub struct ResultEvent {
    pub worker_id: String,
    pub status: WorkerStatus,
    /// Full content of the toolchain's log file.
    pub log: String,
    pub elapsed: Duration,
}

impl ResultEvent {
    pub fn success(&self) -> bool {
        self.status == WorkerStatus::Passed
    }
}
