//! Dispatch stage: consume dispatch jobs, resolve dependencies, build
//! evaluation tasks, and enqueue them.

use std::sync::Arc;

use common::entity::{assignment, enrollment, project, submission};
use common::jobs::{DispatchJob, DispatchTarget, EvaluationJob};
use mq::{BroccoliError, BrokerMessage, SchedulerQueues};
use sea_orm::sea_query::LockType;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    TransactionTrait,
};
use tracing::{debug, error, info};

use crate::scheduler::builder::{self, MAX_TASKS_PER_DISPATCH};
use crate::scheduler::{SchedulerError, resolver};

/// Consume dispatch jobs from the dispatch queue.
///
/// Transient failures bounce the message back to the broker for redelivery;
/// configuration errors (unimplemented policy or structure, dangling
/// references) are logged and dropped, since redelivery cannot fix them.
pub async fn consume_dispatch_jobs(
    db: DatabaseConnection,
    queues: Arc<SchedulerQueues>,
    concurrency: usize,
) {
    let queue_name = queues.dispatch_queue().to_string();
    info!(queue = %queue_name, "Starting dispatch consumer");

    // Hold our own broker handle; `queues` moves into the handler closure.
    let mq = Arc::clone(queues.mq());

    let result = mq
        .process_messages(
            &queue_name,
            Some(concurrency),
            None,
            move |message: BrokerMessage<DispatchJob>| {
                let db = db.clone();
                let queues = Arc::clone(&queues);
                async move {
                    let job = message.payload;
                    let job_id = job.job_id.clone();

                    match process_dispatch_job(&db, &queues, &job).await {
                        Ok(()) => Ok(()),
                        Err(e) if e.is_transient() => {
                            error!(
                                job_id = %job_id,
                                error = %e,
                                "Dispatch failed, returning job for redelivery"
                            );
                            Err(BroccoliError::Job(e.to_string()))
                        }
                        Err(e) => {
                            error!(
                                job_id = %job_id,
                                target = ?job.target,
                                error = %e,
                                "Dispatch failed on bad configuration, dropping job"
                            );
                            Ok(())
                        }
                    }
                }
            },
        )
        .await;

    if let Err(e) = result {
        error!(error = %e, "Dispatch consumer stopped unexpectedly");
    }
}

/// Expand a dispatch target into per-submission dispatches.
async fn process_dispatch_job(
    db: &DatabaseConnection,
    queues: &Arc<SchedulerQueues>,
    job: &DispatchJob,
) -> Result<(), SchedulerError> {
    match job.target {
        DispatchTarget::Submission { submission_id } => {
            let sub = submission::Entity::find_by_id(submission_id)
                .one(db)
                .await?
                .ok_or(SchedulerError::NotFound {
                    entity: "Submission",
                    id: submission_id,
                })?;
            let proj = project::Entity::find_by_id(sub.project_id)
                .one(db)
                .await?
                .ok_or(SchedulerError::NotFound {
                    entity: "Project",
                    id: sub.project_id,
                })?;
            dispatch_submission(db, queues, &proj, &sub).await
        }
        DispatchTarget::Project { project_id } => {
            let proj = project::Entity::find_by_id(project_id)
                .one(db)
                .await?
                .ok_or(SchedulerError::NotFound {
                    entity: "Project",
                    id: project_id,
                })?;
            dispatch_project(db, queues, &proj).await
        }
        DispatchTarget::Assignment { assignment_id } => {
            let projects = project::Entity::find()
                .filter(project::Column::AssignmentId.eq(assignment_id))
                .order_by_asc(project::Column::Id)
                .all(db)
                .await?;

            for proj in &projects {
                dispatch_project(db, queues, proj).await?;
            }
            Ok(())
        }
    }
}

/// Regrade a whole project: every enrolled student's latest submission.
/// Students without a submission are skipped.
async fn dispatch_project(
    db: &DatabaseConnection,
    queues: &Arc<SchedulerQueues>,
    proj: &project::Model,
) -> Result<(), SchedulerError> {
    let assignment = assignment::Entity::find_by_id(proj.assignment_id)
        .one(db)
        .await?
        .ok_or(SchedulerError::NotFound {
            entity: "Assignment",
            id: proj.assignment_id,
        })?;

    let enrolled = enrollment::Entity::find()
        .filter(enrollment::Column::CourseId.eq(assignment.course_id))
        .order_by_asc(enrollment::Column::StudentId)
        .all(db)
        .await?;

    for enr in &enrolled {
        let latest = submission::Entity::find()
            .filter(submission::Column::ProjectId.eq(proj.id))
            .filter(submission::Column::StudentId.eq(enr.student_id))
            .order_by_desc(submission::Column::CreatedAt)
            .order_by_desc(submission::Column::Id)
            .one(db)
            .await?;

        if let Some(sub) = latest {
            dispatch_submission(db, queues, proj, &sub).await?;
        }
    }

    Ok(())
}

/// Dispatch one submission: resolve, rebuild its Results in a single
/// transaction, then enqueue an evaluation job per Result.
async fn dispatch_submission(
    db: &DatabaseConnection,
    queues: &Arc<SchedulerQueues>,
    proj: &project::Model,
    sub: &submission::Model,
) -> Result<(), SchedulerError> {
    if proj.script_path.is_none() {
        debug!(
            project_id = proj.id,
            submission_id = sub.id,
            "Project has no grading script, skipping"
        );
        return Ok(());
    }

    let txn = db.begin().await.map_err(SchedulerError::Db)?;

    // Serialize concurrent regrades of the same submission: without the
    // row lock, two dispatches can clear the same rows and both insert,
    // doubling the task set.
    submission::Entity::find_by_id(sub.id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(SchedulerError::NotFound {
            entity: "Submission",
            id: sub.id,
        })?;

    let edges = resolver::resolve(&txn, proj, sub.student_id).await?;
    let cleared = builder::clear_results(&txn, sub.id).await?;
    let result_ids = builder::build_tasks(&txn, sub, &edges, MAX_TASKS_PER_DISPATCH).await?;
    txn.commit().await.map_err(SchedulerError::Db)?;

    // Only enqueue once the rows are visible to workers.
    for result_id in &result_ids {
        let job = EvaluationJob::new(*result_id, None);
        queues.enqueue_evaluation(&job).await?;
    }

    info!(
        submission_id = sub.id,
        project_id = proj.id,
        cleared,
        tasks = result_ids.len(),
        "Submission dispatched"
    );

    Ok(())
}
