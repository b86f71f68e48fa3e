//! Parallel build/test orchestration.
//!
//! A [`Supervisor`] spawns one [`Worker`] per toolchain. Each worker runs its
//! [`Pipeline`] through a [`StepRunner`], with a [`Watchdog`] enforcing the
//! deadline of time-boxed steps, and reports over a shared event channel.

pub mod events;
pub mod runner;
pub mod shim;
pub mod step;
pub mod supervisor;
pub mod watchdog;
pub mod worker;

pub use events::{Event, ProgressEvent, ResultEvent, WorkerStatus};
pub use runner::StepRunner;
pub use shim::EnvShim;
pub use step::{Pipeline, Step};
pub use supervisor::{Job, ProjectReport, Supervisor, SupervisorOptions, ToolchainResult};
pub use watchdog::{StepOutcome, Watchdog};
pub use worker::{Worker, WorkerSpec};
