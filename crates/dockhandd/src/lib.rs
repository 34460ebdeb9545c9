//! dockhand HTTP daemon
//!
//! `POST /build` validates a multipart upload and queues it as a job,
//! `GET /status/{task_id}` reports how the job is doing.

pub mod error;
pub mod multipart;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
