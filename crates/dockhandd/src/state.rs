use dockhand_jobs::JobQueue;

/// Shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub queue: JobQueue,
}

impl AppState {
    pub fn new(queue: JobQueue) -> Self {
        Self { queue }
    }
}
