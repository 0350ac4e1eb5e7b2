pub mod builder;
pub mod resolver;

use std::sync::Arc;

use common::entity::{assignment, project, result, submission};
use common::jobs::{DispatchJob, DispatchTarget, EvaluationJob};
use common::{DependencyStructure, SubmissionPolicy};
use mq::SchedulerQueues;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QuerySelect,
};
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Database error: {0}")]
    Db(#[from] DbErr),

    #[error("Queue error: {0}")]
    Mq(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i32 },

    /// A dependency edge names a producer project that no longer exists.
    /// This is a data integrity problem, not a transient failure.
    #[error("Dependency {dependency_id} of project {project_id} references a missing producer")]
    MissingProducer { project_id: i32, dependency_id: i32 },

    #[error("Submission policy '{policy}' on project {project_id} is not implemented")]
    UnimplementedPolicy {
        project_id: i32,
        policy: SubmissionPolicy,
    },

    #[error("Dependency structure '{structure}' on dependency {dependency_id} is not implemented")]
    UnimplementedStructure {
        dependency_id: i32,
        structure: DependencyStructure,
    },
}

impl SchedulerError {
    /// Whether retrying the same job could succeed. Data integrity and
    /// unimplemented-configuration errors never benefit from a retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, SchedulerError::Db(_) | SchedulerError::Mq(_))
    }
}

impl From<mq::MqError> for SchedulerError {
    fn from(e: mq::MqError) -> Self {
        SchedulerError::Mq(e.to_string())
    }
}

/// Entry points for putting grading work on the queues.
///
/// Dispatch targets are validated for existence here, then handed to the
/// dispatch consumer as a queue message; the heavy lifting (resolution,
/// task building) happens in the consumer, not in request handlers.
pub struct Scheduler {
    db: DatabaseConnection,
    queues: Arc<SchedulerQueues>,
}

impl Scheduler {
    pub fn new(db: DatabaseConnection, queues: Arc<SchedulerQueues>) -> Self {
        Self { db, queues }
    }

    /// Queue a dispatch job for one submission.
    #[instrument(skip(self))]
    pub async fn enqueue_submission_dispatch(
        &self,
        submission_id: i32,
    ) -> Result<DispatchJob, SchedulerError> {
        submission::Entity::find_by_id(submission_id)
            .one(&self.db)
            .await?
            .ok_or(SchedulerError::NotFound {
                entity: "Submission",
                id: submission_id,
            })?;

        let job = DispatchJob::new(DispatchTarget::Submission { submission_id });
        self.queues.enqueue_dispatch(&job).await?;
        Ok(job)
    }

    /// Queue a regrade of every enrolled student's latest submission to a
    /// project.
    #[instrument(skip(self))]
    pub async fn enqueue_project_dispatch(
        &self,
        project_id: i32,
    ) -> Result<DispatchJob, SchedulerError> {
        project::Entity::find_by_id(project_id)
            .one(&self.db)
            .await?
            .ok_or(SchedulerError::NotFound {
                entity: "Project",
                id: project_id,
            })?;

        let job = DispatchJob::new(DispatchTarget::Project { project_id });
        self.queues.enqueue_dispatch(&job).await?;
        Ok(job)
    }

    /// Queue a regrade of every project in an assignment.
    #[instrument(skip(self))]
    pub async fn enqueue_assignment_dispatch(
        &self,
        assignment_id: i32,
    ) -> Result<DispatchJob, SchedulerError> {
        assignment::Entity::find_by_id(assignment_id)
            .one(&self.db)
            .await?
            .ok_or(SchedulerError::NotFound {
                entity: "Assignment",
                id: assignment_id,
            })?;

        let job = DispatchJob::new(DispatchTarget::Assignment { assignment_id });
        self.queues.enqueue_dispatch(&job).await?;
        Ok(job)
    }

    /// Queue a re-evaluation of one existing Result, optionally overriding
    /// the project's timeout. The provenance edges are reused as-is; a
    /// finalized Result is reopened (return code cleared) first, since the
    /// executor skips finalized rows.
    #[instrument(skip(self))]
    pub async fn enqueue_result_evaluation(
        &self,
        result_id: i32,
        timeout_secs: Option<u64>,
    ) -> Result<EvaluationJob, SchedulerError> {
        result::Entity::find_by_id(result_id)
            .one(&self.db)
            .await?
            .ok_or(SchedulerError::NotFound {
                entity: "Result",
                id: result_id,
            })?;

        let reopened = builder::reopen_result(&self.db, result_id).await?;
        if reopened > 0 {
            info!(result_id, "Reopened finalized result for re-evaluation");
        }

        let job = EvaluationJob::new(result_id, timeout_secs);
        self.queues.enqueue_evaluation(&job).await?;
        Ok(job)
    }

    /// Re-enqueue every pending Result (null return code). This is the
    /// recovery path after worker crashes or exhausted evaluation retries.
    #[instrument(skip(self))]
    pub async fn dispatch_pending(&self) -> Result<u64, SchedulerError> {
        let pending: Vec<i32> = result::Entity::find()
            .filter(result::Column::ReturnCode.is_null())
            .select_only()
            .column(result::Column::Id)
            .into_tuple()
            .all(&self.db)
            .await?;

        for result_id in &pending {
            let job = EvaluationJob::new(*result_id, None);
            self.queues.enqueue_evaluation(&job).await?;
        }

        let enqueued = pending.len() as u64;
        info!(enqueued, "Re-enqueued pending results");
        Ok(enqueued)
    }

    /// Number of Results still awaiting evaluation. Serves as the queue
    /// depth proxy for the status endpoint.
    pub async fn pending_result_count(&self) -> Result<u64, SchedulerError> {
        let count = result::Entity::find()
            .filter(result::Column::ReturnCode.is_null())
            .count(&self.db)
            .await?;
        Ok(count)
    }
}
