//! Build and publish one job.

use crate::context::BuildContext;
use crate::engine::{BuiltImage, ContainerEngine, RegistryLogin};
use crate::error::{BuildError, BuildResult, EngineError};
use crate::registry::RegistryUrlFormat;
use async_trait::async_trait;
use dockhand_core::{ExecutionOutcome, FailedStep, JobDescriptor};
use dockhand_jobs::{JobRunner, ShutdownSignal};
use futures_util::StreamExt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Deadline applied separately to the build and the push phase.
    pub phase_timeout: Duration,
    /// Parent directory for build contexts; the system temp dir when unset.
    pub context_root: Option<PathBuf>,
    pub registry_url: RegistryUrlFormat,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            phase_timeout: Duration::from_secs(30 * 60),
            context_root: None,
            registry_url: RegistryUrlFormat::default(),
        }
    }
}

/// Runs the build phase and then the publish phase of a job against a
/// [`ContainerEngine`].
pub struct BuildExecutor {
    engine: Arc<dyn ContainerEngine>,
    options: ExecutorOptions,
}

impl BuildExecutor {
    pub fn new(engine: Arc<dyn ContainerEngine>, options: ExecutorOptions) -> Self {
        Self { engine, options }
    }

    /// Execute a job to its outcome. Never fails; a phase error becomes
    /// `ExecutionOutcome::Failed` for that phase.
    pub async fn execute(
        &self,
        descriptor: &JobDescriptor,
        mut shutdown: ShutdownSignal,
    ) -> ExecutionOutcome {
        let reference = descriptor.image_reference();

        tracing::info!("Building image {}", reference);
        let built = self
            .guard(FailedStep::Build, &mut shutdown, self.build(descriptor, &reference))
            .await;
        match built {
            Ok(image) => {
                tracing::info!("Built {} (id: {}, tags: {:?})", reference, image.id, image.tags);
            }
            Err(e) => {
                tracing::error!("Build of {} failed: {}", reference, e);
                return ExecutionOutcome::failed(FailedStep::Build, e.to_string());
            }
        }

        tracing::info!("Pushing image {}", reference);
        let pushed = self
            .guard(FailedStep::Push, &mut shutdown, self.publish(descriptor, &reference))
            .await;
        if let Err(e) = pushed {
            tracing::error!("Push of {} failed: {}", reference, e);
            return ExecutionOutcome::failed(FailedStep::Push, e.to_string());
        }

        let registry_url = self
            .options
            .registry_url
            .format(descriptor.owner(), descriptor.repository());
        tracing::info!("Published {} at {}", reference, registry_url);
        ExecutionOutcome::succeeded(reference, registry_url)
    }

    /// The context lives only for the duration of this future, so it is
    /// removed however the build ends, including on timeout or cancellation.
    async fn build(&self, descriptor: &JobDescriptor, reference: &str) -> BuildResult<BuiltImage> {
        let context =
            BuildContext::materialize(descriptor, self.options.context_root.as_deref())?;
        let image = self
            .engine
            .build_image(context.path(), context.dockerfile(), reference)
            .await?;
        Ok(image)
    }

    async fn publish(&self, descriptor: &JobDescriptor, reference: &str) -> BuildResult<()> {
        let login = descriptor
            .registry_credential()
            .map(|credential| RegistryLogin::new(descriptor.owner(), credential.password()));

        if let Some(login) = &login {
            self.engine.authenticate(login).await?;
        }

        let mut first_error = None;
        let mut progress = self.engine.push(reference, login.as_ref());
        while let Some(record) = progress.next().await {
            let record = record?;
            tracing::debug!("[push] {}", record);
            if let Some(error) = record.error
                && first_error.is_none()
            {
                first_error = Some(error);
            }
        }

        match first_error {
            Some(message) => Err(EngineError::PushFailed { message }.into()),
            None => Ok(()),
        }
    }

    /// Run one phase under the phase deadline, abandoning it on shutdown.
    async fn guard<T>(
        &self,
        phase: FailedStep,
        shutdown: &mut ShutdownSignal,
        work: impl Future<Output = BuildResult<T>>,
    ) -> BuildResult<T> {
        let after = self.options.phase_timeout;
        tokio::select! {
            biased;
            _ = shutdown.recv() => Err(BuildError::Cancelled { phase }),
            result = tokio::time::timeout(after, work) => match result {
                Ok(result) => result,
                Err(_) => Err(BuildError::TimedOut { phase, after }),
            },
        }
    }
}

#[async_trait]
impl JobRunner for BuildExecutor {
    async fn run(&self, descriptor: JobDescriptor, shutdown: ShutdownSignal) -> ExecutionOutcome {
        self.execute(&descriptor, shutdown).await
    }
}
