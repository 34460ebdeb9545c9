use crate::record::JobId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    /// Never issued, or already expired from the result backend.
    #[error("unknown job: {0}")]
    UnknownJob(String),

    #[error("job queue is full ({capacity} jobs waiting)")]
    QueueFull { capacity: usize },

    #[error("job queue is shut down")]
    Closed,

    #[error("job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: JobId,
        from: &'static str,
        to: &'static str,
    },

    #[error("job store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, JobError>;
