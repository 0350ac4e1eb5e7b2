use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use common::entity::{result, result_dependency};

/// Acknowledgement that a dispatch or evaluation job was queued.
#[derive(Serialize, ToSchema)]
pub struct JobQueuedResponse {
    /// Queue message id, for log correlation.
    #[schema(example = "8b55c0ac-7f1e-4f52-9b0d-6d1d62a1c9e1")]
    pub job_id: String,
}

#[derive(Deserialize, ToSchema, Default)]
pub struct EvaluateRequest {
    /// Wall-clock timeout override in seconds. Falls back to the project's
    /// configured timeout when absent.
    #[schema(example = 30)]
    pub timeout_secs: Option<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct DispatchPendingResponse {
    /// Number of pending Results that were re-enqueued.
    pub enqueued: u64,
}

#[derive(Serialize, ToSchema)]
pub struct QueueStatusResponse {
    /// Results awaiting evaluation (null return code).
    pub pending_results: u64,
}

/// Provenance edge: which producer submission a Result was run against,
/// under which script keyword.
#[derive(Serialize, ToSchema)]
pub struct ResultDependencyResponse {
    pub project_dependency_id: i32,
    /// Parameter name the grading script knows this input set by. Null if
    /// the dependency edge was deleted after the run.
    pub keyword: Option<String>,
    pub producer_submission_id: i32,
}

#[derive(Serialize, ToSchema)]
pub struct ResultResponse {
    pub id: i32,
    pub submission_id: i32,
    pub stdout: String,
    pub stderr: String,
    /// Null while the evaluation is still pending.
    pub return_code: Option<i32>,
    pub pending: bool,
    pub created_at: DateTime<Utc>,
    pub dependencies: Vec<ResultDependencyResponse>,
}

impl ResultResponse {
    pub fn from_model(
        model: result::Model,
        deps: Vec<(
            result_dependency::Model,
            Option<common::entity::project_dependency::Model>,
        )>,
    ) -> Self {
        Self {
            id: model.id,
            submission_id: model.submission_id,
            stdout: model.stdout,
            stderr: model.stderr,
            pending: model.return_code.is_none(),
            return_code: model.return_code,
            created_at: model.created_at,
            dependencies: deps
                .into_iter()
                .map(|(dep, pd)| ResultDependencyResponse {
                    project_dependency_id: dep.project_dependency_id,
                    keyword: pd.map(|p| p.keyword),
                    producer_submission_id: dep.producer_submission_id,
                })
                .collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ResultSummary {
    pub id: i32,
    pub return_code: Option<i32>,
    pub pending: bool,
    pub created_at: DateTime<Utc>,
}

/// All Results of one submission plus a pass/fail/pending tally.
#[derive(Serialize, ToSchema)]
pub struct SubmissionResultsResponse {
    pub submission_id: i32,
    pub num_passed: u64,
    pub num_failed: u64,
    pub num_pending: u64,
    pub results: Vec<ResultSummary>,
}
