//! Client-facing view of a job's status.

use crate::record::{JobPhase, JobRecord};
use dockhand_core::{ExecutionOutcome, FailedStep};
use serde::{Deserialize, Serialize};

/// Body returned to a polling client.
///
/// Queued and running jobs both read as `processing`; terminal jobs carry the
/// outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatusView {
    Processing,
    Succeeded {
        image_reference: String,
        registry_url: String,
    },
    Failed {
        step: FailedStep,
        error: String,
    },
}

impl From<&ExecutionOutcome> for JobStatusView {
    fn from(outcome: &ExecutionOutcome) -> Self {
        match outcome {
            ExecutionOutcome::Succeeded {
                image_reference,
                registry_url,
            } => JobStatusView::Succeeded {
                image_reference: image_reference.clone(),
                registry_url: registry_url.clone(),
            },
            ExecutionOutcome::Failed { step, message } => JobStatusView::Failed {
                step: *step,
                error: message.clone(),
            },
        }
    }
}

impl From<&JobRecord> for JobStatusView {
    fn from(record: &JobRecord) -> Self {
        match &record.phase {
            JobPhase::Queued | JobPhase::Running => JobStatusView::Processing,
            JobPhase::Finished { outcome } => outcome.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::JobId;
    use serde_json::json;

    #[test]
    fn test_in_flight_jobs_read_as_processing() {
        let mut record = JobRecord::queued(JobId::new(), "alice/demo:latest");
        assert_eq!(
            serde_json::to_value(JobStatusView::from(&record)).unwrap(),
            json!({ "status": "processing" })
        );

        record.phase = JobPhase::Running;
        assert_eq!(JobStatusView::from(&record), JobStatusView::Processing);
    }

    #[test]
    fn test_success_shape() {
        let outcome = ExecutionOutcome::succeeded(
            "alice/demo:latest",
            "https://hub.docker.com/r/alice/demo",
        );
        assert_eq!(
            serde_json::to_value(JobStatusView::from(&outcome)).unwrap(),
            json!({
                "status": "succeeded",
                "image_reference": "alice/demo:latest",
                "registry_url": "https://hub.docker.com/r/alice/demo"
            })
        );
    }

    #[test]
    fn test_failure_shape() {
        let outcome = ExecutionOutcome::failed(FailedStep::Build, "no such image: nope");
        assert_eq!(
            serde_json::to_value(JobStatusView::from(&outcome)).unwrap(),
            json!({
                "status": "failed",
                "step": "build",
                "error": "no such image: nope"
            })
        );
    }
}
