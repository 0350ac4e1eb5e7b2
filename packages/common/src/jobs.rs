use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::mq::Message;

/// What a dispatch job should resolve and build tasks for.
///
/// Project and assignment targets fan out to every enrolled student's
/// latest submission; a submission target grades exactly that submission.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchTarget {
    Submission { submission_id: i32 },
    Project { project_id: i32 },
    Assignment { assignment_id: i32 },
}

/// A dispatch job message sent to the dispatch queue.
///
/// Carried work: resolve producer submissions, expand the combination
/// product, and persist one pending Result (plus provenance edges) per
/// evaluation task before any evaluation job becomes visible.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DispatchJob {
    /// Job identifier (UUID)
    pub job_id: String,
    pub target: DispatchTarget,
}

impl DispatchJob {
    /// Create a new dispatch job with a generated UUID.
    pub fn new(target: DispatchTarget) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            target,
        }
    }
}

impl Message for DispatchJob {
    fn message_type() -> &'static str {
        "dispatch_job"
    }

    fn message_id(&self) -> &str {
        &self.job_id
    }
}

/// An evaluation job message sent to the evaluation queue.
///
/// References an already-persisted pending Result row; the worker stages
/// the sandbox, runs the grading script, and finalizes that row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvaluationJob {
    /// Job identifier (UUID)
    pub job_id: String,
    /// ID of the pending Result to evaluate.
    pub result_id: i32,
    /// Wall-clock timeout override in seconds. Falls back to the
    /// project's configured timeout when absent.
    pub timeout_secs: Option<u64>,
}

impl EvaluationJob {
    /// Create a new evaluation job with a generated UUID.
    pub fn new(result_id: i32, timeout_secs: Option<u64>) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            result_id,
            timeout_secs,
        }
    }
}

impl Message for EvaluationJob {
    fn message_type() -> &'static str {
        "evaluation_job"
    }

    fn message_id(&self) -> &str {
        &self.job_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_target_wire_format_is_tagged() {
        let job = DispatchJob::new(DispatchTarget::Submission { submission_id: 42 });
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["target"]["kind"], "submission");
        assert_eq!(json["target"]["submission_id"], 42);

        let back: DispatchJob = serde_json::from_value(json).unwrap();
        assert_eq!(back.target, job.target);
        assert_eq!(back.job_id, job.job_id);
    }

    #[test]
    fn evaluation_job_keeps_timeout_override() {
        let job = EvaluationJob::new(7, Some(30));
        let json = serde_json::to_string(&job).unwrap();
        let back: EvaluationJob = serde_json::from_str(&json).unwrap();
        assert_eq!(back.result_id, 7);
        assert_eq!(back.timeout_secs, Some(30));
    }

    #[test]
    fn job_ids_are_unique() {
        let a = DispatchJob::new(DispatchTarget::Project { project_id: 1 });
        let b = DispatchJob::new(DispatchTarget::Project { project_id: 1 });
        assert_ne!(a.job_id, b.job_id);
    }
}
