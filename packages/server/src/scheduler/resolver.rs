//! Dependency resolution: turn a project's dependency edges into concrete
//! sets of producer submissions for one consuming student.

use common::entity::{assignment, course, enrollment, project, project_dependency, submission};
use common::{DependencyStructure, SubmissionPolicy};
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
};
use tracing::debug;

use super::SchedulerError;

/// One dependency edge with its producer submissions resolved.
///
/// Edges come back sorted by keyword (then id), and submissions within an
/// edge newest first, so the combination builder enumerates tasks in a
/// stable order across runs.
#[derive(Debug, Clone)]
pub struct ResolvedEdge {
    pub dependency: project_dependency::Model,
    pub submissions: Vec<submission::Model>,
}

/// Select which of one person's submissions count under a policy.
///
/// `submissions` must already be sorted newest first. Generic so the
/// selection rule can be exercised without database models.
pub fn apply_policy<T>(
    policy: SubmissionPolicy,
    producer_id: i32,
    mut submissions: Vec<T>,
) -> Result<Vec<T>, SchedulerError> {
    match policy {
        SubmissionPolicy::Latest => {
            submissions.truncate(1);
            Ok(submissions)
        }
        SubmissionPolicy::All => Ok(submissions),
        SubmissionPolicy::Multiple => Err(SchedulerError::UnimplementedPolicy {
            project_id: producer_id,
            policy,
        }),
    }
}

/// Resolve every dependency edge of `project` for one consuming student.
///
/// An edge whose producer has no qualifying submissions resolves to an
/// empty set; the builder then produces zero tasks, which is the intended
/// "inputs not ready yet" outcome. A dangling producer reference is fatal.
pub async fn resolve<C: ConnectionTrait>(
    db: &C,
    project: &project::Model,
    student_id: i32,
) -> Result<Vec<ResolvedEdge>, SchedulerError> {
    let edges = project_dependency::Entity::find()
        .filter(project_dependency::Column::ProjectId.eq(project.id))
        .order_by_asc(project_dependency::Column::Keyword)
        .order_by_asc(project_dependency::Column::Id)
        .all(db)
        .await?;

    let mut resolved = Vec::with_capacity(edges.len());

    for edge in edges {
        let producer = project::Entity::find_by_id(edge.producer_id)
            .one(db)
            .await?
            .ok_or(SchedulerError::MissingProducer {
                project_id: project.id,
                dependency_id: edge.id,
            })?;

        let persons = producer_persons(db, &edge, &producer, student_id).await?;

        let mut submissions = Vec::new();
        for person_id in persons {
            let subs = submissions_of(db, producer.id, person_id).await?;
            submissions.extend(apply_policy(
                producer.submission_policy,
                producer.id,
                subs,
            )?);
        }

        debug!(
            project_id = project.id,
            dependency_id = edge.id,
            keyword = %edge.keyword,
            count = submissions.len(),
            "Resolved dependency edge"
        );

        resolved.push(ResolvedEdge {
            dependency: edge,
            submissions,
        });
    }

    Ok(resolved)
}

/// Whose submissions an edge draws from, in a deterministic order.
async fn producer_persons<C: ConnectionTrait>(
    db: &C,
    edge: &project_dependency::Model,
    producer: &project::Model,
    student_id: i32,
) -> Result<Vec<i32>, SchedulerError> {
    match edge.structure {
        DependencyStructure::Own => Ok(vec![student_id]),
        DependencyStructure::Instructor => {
            let course = course_of(db, producer).await?;
            Ok(vec![course.instructor_id])
        }
        DependencyStructure::Clique => {
            let course = course_of(db, producer).await?;
            let mut persons = vec![course.instructor_id];

            let students: Vec<i32> = enrollment::Entity::find()
                .filter(enrollment::Column::CourseId.eq(course.id))
                .order_by_asc(enrollment::Column::StudentId)
                .all(db)
                .await?
                .into_iter()
                .map(|e| e.student_id)
                .collect();

            for id in students {
                if id != course.instructor_id {
                    persons.push(id);
                }
            }
            Ok(persons)
        }
        DependencyStructure::Custom => Err(SchedulerError::UnimplementedStructure {
            dependency_id: edge.id,
            structure: edge.structure,
        }),
    }
}

async fn course_of<C: ConnectionTrait>(
    db: &C,
    project: &project::Model,
) -> Result<course::Model, SchedulerError> {
    let assignment = assignment::Entity::find_by_id(project.assignment_id)
        .one(db)
        .await?
        .ok_or(SchedulerError::NotFound {
            entity: "Assignment",
            id: project.assignment_id,
        })?;

    course::Entity::find_by_id(assignment.course_id)
        .one(db)
        .await?
        .ok_or(SchedulerError::NotFound {
            entity: "Course",
            id: assignment.course_id,
        })
}

/// One person's submissions to one project, newest first. Id breaks
/// created_at ties so Latest is unambiguous.
async fn submissions_of<C: ConnectionTrait>(
    db: &C,
    project_id: i32,
    person_id: i32,
) -> Result<Vec<submission::Model>, SchedulerError> {
    let subs = submission::Entity::find()
        .filter(submission::Column::ProjectId.eq(project_id))
        .filter(submission::Column::StudentId.eq(person_id))
        .order_by_desc(submission::Column::CreatedAt)
        .order_by_desc(submission::Column::Id)
        .all(db)
        .await?;
    Ok(subs)
}
