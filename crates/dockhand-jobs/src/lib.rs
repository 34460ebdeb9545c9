//! Job lifecycle tracking for dockhand
//!
//! Submission hands a [`JobDescriptor`](dockhand_core::JobDescriptor) to
//! [`JobQueue::enqueue`] and gets a [`JobId`] back straight away. A worker
//! pool picks the job up, runs it through a [`JobRunner`], and records the
//! outcome in a [`JobStore`], where [`JobQueue::query`] finds it.

pub mod error;
pub mod queue;
pub mod record;
pub mod runner;
pub mod status;
pub mod store;

pub use error::{JobError, Result};
pub use queue::{JobQueue, QueueOptions, WorkerPool, start};
pub use record::{JobId, JobPhase, JobRecord, JobState};
pub use runner::{JobRunner, ShutdownSignal};
pub use status::JobStatusView;
pub use store::{JobStore, MemoryJobStore};
