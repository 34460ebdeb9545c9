use async_trait::async_trait;
use dockhand_core::{ExecutionOutcome, JobDescriptor};
use tokio::sync::watch;

/// Executes one job to completion.
///
/// Implementations report failures through the returned outcome; the worker
/// records whatever comes back as the job's terminal state.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, descriptor: JobDescriptor, shutdown: ShutdownSignal) -> ExecutionOutcome;
}

/// Receiving half of the worker pool's shutdown flag.
#[derive(Debug, Clone)]
pub struct ShutdownSignal(watch::Receiver<bool>);

impl ShutdownSignal {
    pub fn channel() -> (watch::Sender<bool>, ShutdownSignal) {
        let (tx, rx) = watch::channel(false);
        (tx, ShutdownSignal(rx))
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, signal) = Self::channel();
        signal
    }

    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once shutdown has been requested. Pends forever if the pool
    /// went away without requesting it.
    pub async fn recv(&mut self) {
        let fired = self.0.wait_for(|stop| *stop).await.is_ok();
        if !fired {
            std::future::pending::<()>().await;
        }
    }
}
