use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use tracing::instrument;

use common::entity::{project_dependency, result, result_dependency, submission};

use crate::error::{AppError, ErrorBody};
use crate::models::grading::{
    DispatchPendingResponse, EvaluateRequest, JobQueuedResponse, QueueStatusResponse,
    ResultResponse, ResultSummary, SubmissionResultsResponse,
};
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/submissions/{id}/dispatch",
    tag = "Grading",
    operation_id = "dispatchSubmission",
    summary = "Queue grading of one submission",
    description = "Resolves dependencies and rebuilds the submission's evaluation tasks. Safe to repeat: a regrade replaces prior Results.",
    params(
        ("id" = i32, Path, description = "Submission ID")
    ),
    responses(
        (status = 202, description = "Dispatch job queued", body = JobQueuedResponse),
        (status = 404, description = "Submission not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state), fields(submission_id = %id))]
pub async fn dispatch_submission(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<(StatusCode, Json<JobQueuedResponse>), AppError> {
    let job = state.scheduler.enqueue_submission_dispatch(id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(JobQueuedResponse { job_id: job.job_id }),
    ))
}

#[utoipa::path(
    post,
    path = "/projects/{id}/dispatch",
    tag = "Grading",
    operation_id = "dispatchProject",
    summary = "Queue a regrade of a whole project",
    description = "Regrades every enrolled student's latest submission to the project. Students without a submission are skipped.",
    params(
        ("id" = i32, Path, description = "Project ID")
    ),
    responses(
        (status = 202, description = "Dispatch job queued", body = JobQueuedResponse),
        (status = 404, description = "Project not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state), fields(project_id = %id))]
pub async fn dispatch_project(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<(StatusCode, Json<JobQueuedResponse>), AppError> {
    let job = state.scheduler.enqueue_project_dispatch(id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(JobQueuedResponse { job_id: job.job_id }),
    ))
}

#[utoipa::path(
    post,
    path = "/assignments/{id}/dispatch",
    tag = "Grading",
    operation_id = "dispatchAssignment",
    summary = "Queue a regrade of every project in an assignment",
    params(
        ("id" = i32, Path, description = "Assignment ID")
    ),
    responses(
        (status = 202, description = "Dispatch job queued", body = JobQueuedResponse),
        (status = 404, description = "Assignment not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state), fields(assignment_id = %id))]
pub async fn dispatch_assignment(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<(StatusCode, Json<JobQueuedResponse>), AppError> {
    let job = state.scheduler.enqueue_assignment_dispatch(id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(JobQueuedResponse { job_id: job.job_id }),
    ))
}

#[utoipa::path(
    post,
    path = "/results/{id}/evaluate",
    tag = "Grading",
    operation_id = "evaluateResult",
    summary = "Queue a re-evaluation of one Result",
    description = "Re-runs the evaluation for an existing Result, reusing its recorded provenance. Optionally overrides the project timeout.",
    params(
        ("id" = i32, Path, description = "Result ID")
    ),
    request_body = EvaluateRequest,
    responses(
        (status = 202, description = "Evaluation job queued", body = JobQueuedResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "Result not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, req), fields(result_id = %id))]
pub async fn evaluate_result(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(req): Json<EvaluateRequest>,
) -> Result<(StatusCode, Json<JobQueuedResponse>), AppError> {
    if let Some(timeout) = req.timeout_secs {
        if timeout == 0 || timeout > 3600 {
            return Err(AppError::Validation(
                "Timeout must be between 1 and 3600 seconds".into(),
            ));
        }
    }

    let job = state
        .scheduler
        .enqueue_result_evaluation(id, req.timeout_secs)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(JobQueuedResponse { job_id: job.job_id }),
    ))
}

#[utoipa::path(
    post,
    path = "/dispatch-pending",
    tag = "Grading",
    operation_id = "dispatchPending",
    summary = "Re-enqueue every pending Result",
    description = "Recovery sweep: queues an evaluation job for every Result with a null return code. Used after worker crashes or exhausted retries.",
    responses(
        (status = 200, description = "Pending results re-enqueued", body = DispatchPendingResponse),
    ),
)]
#[instrument(skip(state))]
pub async fn dispatch_pending(
    State(state): State<AppState>,
) -> Result<Json<DispatchPendingResponse>, AppError> {
    let enqueued = state.scheduler.dispatch_pending().await?;
    Ok(Json(DispatchPendingResponse { enqueued }))
}

#[utoipa::path(
    get,
    path = "/queue",
    tag = "Grading",
    operation_id = "queueStatus",
    summary = "Evaluation backlog size",
    responses(
        (status = 200, description = "Queue status", body = QueueStatusResponse),
    ),
)]
#[instrument(skip(state))]
pub async fn queue_status(
    State(state): State<AppState>,
) -> Result<Json<QueueStatusResponse>, AppError> {
    let pending_results = state.scheduler.pending_result_count().await?;
    Ok(Json(QueueStatusResponse { pending_results }))
}

#[utoipa::path(
    get,
    path = "/results/{id}",
    tag = "Grading",
    operation_id = "getResult",
    summary = "Get one Result with its provenance",
    params(
        ("id" = i32, Path, description = "Result ID")
    ),
    responses(
        (status = 200, description = "Result details", body = ResultResponse),
        (status = 404, description = "Result not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state), fields(result_id = %id))]
pub async fn get_result(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ResultResponse>, AppError> {
    let model = result::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Result {id} not found")))?;

    let deps = result_dependency::Entity::find()
        .filter(result_dependency::Column::ResultId.eq(id))
        .find_also_related(project_dependency::Entity)
        .order_by_asc(result_dependency::Column::Id)
        .all(&state.db)
        .await?;

    Ok(Json(ResultResponse::from_model(model, deps)))
}

#[utoipa::path(
    get,
    path = "/submissions/{id}/results",
    tag = "Grading",
    operation_id = "listSubmissionResults",
    summary = "List a submission's Results with a pass/fail tally",
    description = "Return code 0 counts as passed, any other finalized code as failed, null as pending.",
    params(
        ("id" = i32, Path, description = "Submission ID")
    ),
    responses(
        (status = 200, description = "Results of the submission", body = SubmissionResultsResponse),
        (status = 404, description = "Submission not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state), fields(submission_id = %id))]
pub async fn list_submission_results(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<SubmissionResultsResponse>, AppError> {
    submission::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Submission {id} not found")))?;

    let rows = result::Entity::find()
        .filter(result::Column::SubmissionId.eq(id))
        .order_by_asc(result::Column::Id)
        .all(&state.db)
        .await?;

    let mut num_passed = 0u64;
    let mut num_failed = 0u64;
    let mut num_pending = 0u64;
    let results: Vec<ResultSummary> = rows
        .into_iter()
        .map(|r| {
            match r.return_code {
                None => num_pending += 1,
                Some(0) => num_passed += 1,
                Some(_) => num_failed += 1,
            }
            ResultSummary {
                id: r.id,
                pending: r.return_code.is_none(),
                return_code: r.return_code,
                created_at: r.created_at,
            }
        })
        .collect();

    Ok(Json(SubmissionResultsResponse {
        submission_id: id,
        num_passed,
        num_failed,
        num_pending,
        results,
    }))
}
