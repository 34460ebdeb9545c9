//! Result backend for job records.

use crate::error::{JobError, Result};
use crate::record::{JobId, JobPhase, JobRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dockhand_core::ExecutionOutcome;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Storage for job records.
///
/// Every transition must be atomic per job id: a concurrent `get` sees either
/// the record before the transition or after it, never a mix.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Store a freshly queued record.
    async fn insert(&self, record: JobRecord) -> Result<()>;

    /// Drop a record that was never handed to a worker.
    async fn remove(&self, id: &JobId) -> Result<()>;

    /// Queued -> Running. Returns `false` if the job is not queued, in which
    /// case it must not be executed.
    async fn mark_running(&self, id: &JobId) -> Result<bool>;

    /// Running -> Succeeded/Failed.
    async fn finish(&self, id: &JobId, outcome: ExecutionOutcome) -> Result<()>;

    async fn get(&self, id: &JobId) -> Result<Option<JobRecord>>;

    /// Forget terminal records that finished before `cutoff`.
    async fn purge_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// In-process job table.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    records: RwLock<HashMap<JobId, JobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

fn phase_name(phase: &JobPhase) -> &'static str {
    match phase {
        JobPhase::Queued => "queued",
        JobPhase::Running => "running",
        JobPhase::Finished { .. } => "finished",
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, record: JobRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(JobError::Store(format!("duplicate job id {}", record.id)));
        }
        records.insert(record.id, record);
        Ok(())
    }

    async fn remove(&self, id: &JobId) -> Result<()> {
        self.records.write().await.remove(id);
        Ok(())
    }

    async fn mark_running(&self, id: &JobId) -> Result<bool> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| JobError::UnknownJob(id.to_string()))?;

        if record.phase != JobPhase::Queued {
            return Ok(false);
        }

        record.phase = JobPhase::Running;
        record.started_at = Some(Utc::now());
        Ok(true)
    }

    async fn finish(&self, id: &JobId, outcome: ExecutionOutcome) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| JobError::UnknownJob(id.to_string()))?;

        if record.phase != JobPhase::Running {
            return Err(JobError::InvalidTransition {
                id: *id,
                from: phase_name(&record.phase),
                to: "finished",
            });
        }

        record.phase = JobPhase::Finished { outcome };
        record.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn get(&self, id: &JobId) -> Result<Option<JobRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn purge_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| match record.finished_at {
            Some(finished_at) => finished_at >= cutoff,
            None => true,
        });
        Ok(before - records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::JobState;
    use dockhand_core::FailedStep;

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let store = MemoryJobStore::new();
        let id = JobId::new();
        store
            .insert(JobRecord::queued(id, "alice/demo:latest"))
            .await
            .unwrap();

        assert!(store.mark_running(&id).await.unwrap());
        // a second worker must not pick the job up again
        assert!(!store.mark_running(&id).await.unwrap());

        store
            .finish(&id, ExecutionOutcome::succeeded("alice/demo:latest", "url"))
            .await
            .unwrap();

        let record = store.get(&id).await.unwrap().unwrap();
        assert_eq!(record.state(), JobState::Succeeded);
        assert!(record.started_at.is_some());
        assert!(record.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_terminal_state_is_final() {
        let store = MemoryJobStore::new();
        let id = JobId::new();
        store.insert(JobRecord::queued(id, "a/b:c")).await.unwrap();
        store.mark_running(&id).await.unwrap();
        store
            .finish(&id, ExecutionOutcome::failed(FailedStep::Build, "boom"))
            .await
            .unwrap();

        let again = store
            .finish(&id, ExecutionOutcome::succeeded("a/b:c", "url"))
            .await;
        assert!(matches!(again, Err(JobError::InvalidTransition { .. })));
        assert!(!store.mark_running(&id).await.unwrap());
        assert_eq!(
            store.get(&id).await.unwrap().unwrap().state(),
            JobState::Failed
        );
    }

    #[tokio::test]
    async fn test_finish_requires_running() {
        let store = MemoryJobStore::new();
        let id = JobId::new();
        store.insert(JobRecord::queued(id, "a/b:c")).await.unwrap();

        let result = store
            .finish(&id, ExecutionOutcome::succeeded("a/b:c", "url"))
            .await;
        assert!(matches!(result, Err(JobError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_unknown_ids() {
        let store = MemoryJobStore::new();
        let id = JobId::new();
        assert!(store.get(&id).await.unwrap().is_none());
        assert!(matches!(
            store.mark_running(&id).await,
            Err(JobError::UnknownJob(_))
        ));
    }

    #[tokio::test]
    async fn test_purge_only_drops_old_terminal_records() {
        let store = MemoryJobStore::new();
        let finished = JobId::new();
        let pending = JobId::new();
        store.insert(JobRecord::queued(finished, "a/b:c")).await.unwrap();
        store.insert(JobRecord::queued(pending, "a/b:d")).await.unwrap();
        store.mark_running(&finished).await.unwrap();
        store
            .finish(&finished, ExecutionOutcome::succeeded("a/b:c", "url"))
            .await
            .unwrap();

        let purged = store
            .purge_finished_before(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();

        assert_eq!(purged, 1);
        assert!(store.get(&finished).await.unwrap().is_none());
        assert!(store.get(&pending).await.unwrap().is_some());
    }
}
