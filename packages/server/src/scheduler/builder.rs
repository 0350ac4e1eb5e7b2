//! Task building: expand resolved dependency edges into evaluation tasks
//! and persist one pending Result (plus provenance edges) per task.

use chrono::Utc;
use common::entity::{result, result_dependency, submission};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
};
use tracing::warn;

use super::SchedulerError;
use super::resolver::ResolvedEdge;

/// Hard ceiling on evaluation tasks built for one submission dispatch.
/// A submission over the cap gets the first `MAX_TASKS_PER_DISPATCH`
/// combinations in enumeration order, never a failure.
pub const MAX_TASKS_PER_DISPATCH: usize = 200;

/// Enumerate the cartesian product of per-edge choice indices, capped.
///
/// Output is lexicographic with the last edge varying fastest, so two runs
/// over the same inputs build the same tasks in the same order. An empty
/// `counts` yields the single empty combination (a project with no
/// dependencies still gets exactly one task); any zero count yields
/// nothing.
pub fn enumerate_combinations(counts: &[usize], cap: usize) -> Vec<Vec<usize>> {
    if counts.iter().any(|&n| n == 0) {
        return Vec::new();
    }

    let mut combos = Vec::new();
    let mut odometer = vec![0usize; counts.len()];

    loop {
        combos.push(odometer.clone());
        if combos.len() >= cap {
            return combos;
        }

        // Advance the odometer, last position fastest.
        let mut pos = counts.len();
        loop {
            if pos == 0 {
                return combos;
            }
            pos -= 1;
            odometer[pos] += 1;
            if odometer[pos] < counts[pos] {
                break;
            }
            odometer[pos] = 0;
        }
    }
}

/// Size of the full product, saturating instead of overflowing; the value
/// only feeds the truncation warning.
fn total_combinations(counts: &[usize]) -> usize {
    counts.iter().fold(1usize, |acc, &n| acc.saturating_mul(n))
}

/// Persist one pending Result per combination, each with one provenance
/// edge per dependency, and return the new Result ids.
///
/// Runs inside the caller's transaction: either every Result and every
/// edge lands, or none do. Evaluation jobs must only be enqueued after
/// that transaction commits.
pub async fn build_tasks<C: ConnectionTrait>(
    txn: &C,
    submission: &submission::Model,
    edges: &[ResolvedEdge],
    cap: usize,
) -> Result<Vec<i32>, SchedulerError> {
    let counts: Vec<usize> = edges.iter().map(|e| e.submissions.len()).collect();
    let total = total_combinations(&counts);
    let combos = enumerate_combinations(&counts, cap);

    if total > combos.len() {
        warn!(
            submission_id = submission.id,
            project_id = submission.project_id,
            total,
            built = combos.len(),
            "Combination product over cap, truncating"
        );
    }

    let now = Utc::now();
    let mut result_ids = Vec::with_capacity(combos.len());

    for combo in combos {
        let row = result::ActiveModel {
            submission_id: Set(submission.id),
            stdout: Set(String::new()),
            stderr: Set(String::new()),
            return_code: Set(None),
            created_at: Set(now),
            ..Default::default()
        };
        let inserted = row.insert(txn).await.map_err(SchedulerError::Db)?;

        for (edge, pick) in edges.iter().zip(combo) {
            let dep_row = result_dependency::ActiveModel {
                result_id: Set(inserted.id),
                project_dependency_id: Set(edge.dependency.id),
                producer_submission_id: Set(edge.submissions[pick].id),
                created_at: Set(now),
                ..Default::default()
            };
            dep_row.insert(txn).await.map_err(SchedulerError::Db)?;
        }

        result_ids.push(inserted.id);
    }

    Ok(result_ids)
}

/// Put a finalized Result back into the pending state so it can be run
/// again, clearing the captured streams. Pending rows are left untouched.
/// Returns the number of rows reopened (0 or 1).
pub async fn reopen_result<C: ConnectionTrait>(
    db: &C,
    result_id: i32,
) -> Result<u64, SchedulerError> {
    let updated = result::Entity::update_many()
        .set(result::ActiveModel {
            stdout: Set(String::new()),
            stderr: Set(String::new()),
            return_code: Set(None),
            ..Default::default()
        })
        .filter(result::Column::Id.eq(result_id))
        .filter(result::Column::ReturnCode.is_not_null())
        .exec(db)
        .await?;

    Ok(updated.rows_affected)
}

/// Delete a submission's Results and their provenance edges. Regrades run
/// this before rebuilding so stale tasks never linger.
pub async fn clear_results<C: ConnectionTrait>(
    txn: &C,
    submission_id: i32,
) -> Result<u64, SchedulerError> {
    let old: Vec<result::Model> = result::Entity::find()
        .filter(result::Column::SubmissionId.eq(submission_id))
        .all(txn)
        .await?;

    if old.is_empty() {
        return Ok(0);
    }

    let old_ids: Vec<i32> = old.iter().map(|r| r.id).collect();

    result_dependency::Entity::delete_many()
        .filter(result_dependency::Column::ResultId.is_in(old_ids.clone()))
        .exec(txn)
        .await?;

    let deleted = result::Entity::delete_many()
        .filter(result::Column::Id.is_in(old_ids))
        .exec(txn)
        .await?;

    Ok(deleted.rows_affected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_dependencies_yields_one_empty_combination() {
        let combos = enumerate_combinations(&[], MAX_TASKS_PER_DISPATCH);
        assert_eq!(combos, vec![Vec::<usize>::new()]);
    }

    #[test]
    fn any_empty_edge_yields_nothing() {
        assert!(enumerate_combinations(&[3, 0, 2], MAX_TASKS_PER_DISPATCH).is_empty());
        assert!(enumerate_combinations(&[0], MAX_TASKS_PER_DISPATCH).is_empty());
    }

    #[test]
    fn product_under_cap_is_exhaustive() {
        let combos = enumerate_combinations(&[2, 3], MAX_TASKS_PER_DISPATCH);
        assert_eq!(combos.len(), 6);
        // Last edge varies fastest.
        assert_eq!(combos[0], vec![0, 0]);
        assert_eq!(combos[1], vec![0, 1]);
        assert_eq!(combos[2], vec![0, 2]);
        assert_eq!(combos[3], vec![1, 0]);
        assert_eq!(combos[5], vec![1, 2]);
    }

    #[test]
    fn product_over_cap_is_truncated() {
        // 21 * 21 = 441 possible, capped at 200.
        let combos = enumerate_combinations(&[21, 21], MAX_TASKS_PER_DISPATCH);
        assert_eq!(combos.len(), MAX_TASKS_PER_DISPATCH);
        assert_eq!(combos[0], vec![0, 0]);
        // 199 = 9 * 21 + 10 in lexicographic order.
        assert_eq!(combos[199], vec![9, 10]);
    }

    #[test]
    fn enumeration_is_deterministic() {
        let a = enumerate_combinations(&[4, 2, 3], 10);
        let b = enumerate_combinations(&[4, 2, 3], 10);
        assert_eq!(a, b);
        assert_eq!(a.len(), 10);
    }

    #[test]
    fn single_edge_walks_in_order() {
        let combos = enumerate_combinations(&[3], MAX_TASKS_PER_DISPATCH);
        assert_eq!(combos, vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn total_combinations_saturates_instead_of_overflowing() {
        assert_eq!(total_combinations(&[3, 7]), 21);
        assert_eq!(total_combinations(&[]), 1);
        assert_eq!(total_combinations(&[usize::MAX, 2]), usize::MAX);
        assert_eq!(total_combinations(&[usize::MAX, 0]), 0);
    }

    use common::entity::{assignment, course, person, project, project_dependency};
    use common::{DependencyStructure, SubmissionPolicy};
    use sea_orm::{Database, DatabaseConnection, TransactionTrait};

    async fn test_db() -> DatabaseConnection {
        // A pool of one keeps every query on the same in-memory database.
        let mut opt = sea_orm::ConnectOptions::new("sqlite::memory:".to_owned());
        opt.max_connections(1).sqlx_logging(false);
        let db = Database::connect(opt).await.unwrap();
        db.get_schema_registry("common::entity::*")
            .sync(&db)
            .await
            .unwrap();
        db
    }

    async fn make_person(db: &DatabaseConnection, username: &str) -> person::Model {
        person::ActiveModel {
            username: Set(username.to_owned()),
            display_name: Set(username.to_owned()),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
    }

    async fn make_project(
        db: &DatabaseConnection,
        assignment_id: i32,
        name: &str,
        script_path: Option<&str>,
    ) -> project::Model {
        project::ActiveModel {
            assignment_id: Set(assignment_id),
            name: Set(name.to_owned()),
            script_path: Set(script_path.map(str::to_owned)),
            timeout_secs: Set(30),
            submission_policy: Set(SubmissionPolicy::All),
            required_files: Set(serde_json::json!(["main.py"])),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
    }

    async fn make_submission(
        db: &DatabaseConnection,
        project_id: i32,
        student_id: i32,
    ) -> submission::Model {
        submission::ActiveModel {
            project_id: Set(project_id),
            student_id: Set(student_id),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
    }

    async fn make_edge(
        db: &DatabaseConnection,
        consumer_id: i32,
        producer_id: i32,
        keyword: &str,
    ) -> project_dependency::Model {
        project_dependency::ActiveModel {
            project_id: Set(consumer_id),
            producer_id: Set(producer_id),
            structure: Set(DependencyStructure::Own),
            keyword: Set(keyword.to_owned()),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
    }

    /// A grader project with two edges: "solution" (two student uploads)
    /// and "tests" (one instructor upload). Product is 2 x 1 = 2 tasks.
    async fn seed_grader(db: &DatabaseConnection) -> (submission::Model, Vec<ResolvedEdge>) {
        let alice = make_person(db, "alice").await;
        let staff = make_person(db, "staff").await;

        let course = course::ActiveModel {
            title: Set("Algorithms".to_owned()),
            instructor_id: Set(staff.id),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap();

        let assignment = assignment::ActiveModel {
            course_id: Set(course.id),
            name: Set("hw1".to_owned()),
            deadline: Set(Utc::now()),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap();

        let solution = make_project(db, assignment.id, "solution", None).await;
        let tests = make_project(db, assignment.id, "tests", None).await;
        let grader =
            make_project(db, assignment.id, "grader", Some("/srv/scripts/grade.sh")).await;

        let edge_solution = make_edge(db, grader.id, solution.id, "solution").await;
        let edge_tests = make_edge(db, grader.id, tests.id, "tests").await;

        let sol_a = make_submission(db, solution.id, alice.id).await;
        let sol_b = make_submission(db, solution.id, alice.id).await;
        let tests_sub = make_submission(db, tests.id, staff.id).await;

        let root = make_submission(db, grader.id, alice.id).await;

        let edges = vec![
            ResolvedEdge {
                dependency: edge_solution,
                submissions: vec![sol_b, sol_a],
            },
            ResolvedEdge {
                dependency: edge_tests,
                submissions: vec![tests_sub],
            },
        ];

        (root, edges)
    }

    /// Per-task provenance as sorted (dependency id, producer submission id)
    /// pairs, with the tasks themselves sorted, so two builds of the same
    /// inputs compare equal regardless of row ids.
    async fn provenance_sets(
        db: &DatabaseConnection,
        submission_id: i32,
    ) -> Vec<Vec<(i32, i32)>> {
        let rows = result::Entity::find()
            .filter(result::Column::SubmissionId.eq(submission_id))
            .all(db)
            .await
            .unwrap();

        let mut sets = Vec::with_capacity(rows.len());
        for row in rows {
            let mut pairs: Vec<(i32, i32)> = result_dependency::Entity::find()
                .filter(result_dependency::Column::ResultId.eq(row.id))
                .all(db)
                .await
                .unwrap()
                .into_iter()
                .map(|d| (d.project_dependency_id, d.producer_submission_id))
                .collect();
            pairs.sort_unstable();
            sets.push(pairs);
        }
        sets.sort_unstable();
        sets
    }

    #[tokio::test]
    async fn build_tasks_records_one_provenance_edge_per_dependency() {
        let db = test_db().await;
        let (root, edges) = seed_grader(&db).await;

        let txn = db.begin().await.unwrap();
        let ids = build_tasks(&txn, &root, &edges, MAX_TASKS_PER_DISPATCH)
            .await
            .unwrap();
        txn.commit().await.unwrap();

        assert_eq!(ids.len(), 2);

        for id in &ids {
            let row = result::Entity::find_by_id(*id)
                .one(&db)
                .await
                .unwrap()
                .unwrap();
            assert!(row.return_code.is_none());
            assert!(row.stdout.is_empty());
        }

        let sets = provenance_sets(&db, root.id).await;
        assert_eq!(sets.len(), 2);
        // Every task carries exactly one pick per edge.
        for set in &sets {
            assert_eq!(set.len(), edges.len());
        }
        // Both solution uploads appear, each paired with the tests upload.
        let sol_edge = edges[0].dependency.id;
        let tests_pair = (
            edges[1].dependency.id,
            edges[1].submissions[0].id,
        );
        let mut solution_picks: Vec<i32> = sets
            .iter()
            .flat_map(|set| set.iter())
            .filter(|(dep, _)| *dep == sol_edge)
            .map(|&(_, sub)| sub)
            .collect();
        solution_picks.sort_unstable();
        let mut expected: Vec<i32> = edges[0].submissions.iter().map(|s| s.id).collect();
        expected.sort_unstable();
        assert_eq!(solution_picks, expected);
        assert!(sets.iter().all(|set| set.contains(&tests_pair)));
    }

    #[tokio::test]
    async fn regrade_rebuilds_an_identical_combination_set() {
        let db = test_db().await;
        let (root, edges) = seed_grader(&db).await;

        let txn = db.begin().await.unwrap();
        build_tasks(&txn, &root, &edges, MAX_TASKS_PER_DISPATCH)
            .await
            .unwrap();
        txn.commit().await.unwrap();
        let first = provenance_sets(&db, root.id).await;

        let txn = db.begin().await.unwrap();
        let cleared = clear_results(&txn, root.id).await.unwrap();
        assert_eq!(cleared, 2);
        build_tasks(&txn, &root, &edges, MAX_TASKS_PER_DISPATCH)
            .await
            .unwrap();
        txn.commit().await.unwrap();

        let second = provenance_sets(&db, root.id).await;
        assert_eq!(first, second);

        // Nothing from the first build lingers.
        let all_edges = result_dependency::Entity::find().all(&db).await.unwrap();
        assert_eq!(all_edges.len(), 4);
        let all_results = result::Entity::find().all(&db).await.unwrap();
        assert_eq!(all_results.len(), 2);
    }

    #[tokio::test]
    async fn reopen_result_resets_only_finalized_rows() {
        let db = test_db().await;
        let (root, _) = seed_grader(&db).await;

        let txn = db.begin().await.unwrap();
        let ids = build_tasks(&txn, &root, &[], MAX_TASKS_PER_DISPATCH)
            .await
            .unwrap();
        txn.commit().await.unwrap();
        let id = ids[0];

        // Pending rows stay untouched.
        assert_eq!(reopen_result(&db, id).await.unwrap(), 0);

        result::ActiveModel {
            id: Set(id),
            stdout: Set("passed 10/10".to_owned()),
            stderr: Set("warning: deprecated".to_owned()),
            return_code: Set(Some(0)),
            ..Default::default()
        }
        .update(&db)
        .await
        .unwrap();

        assert_eq!(reopen_result(&db, id).await.unwrap(), 1);

        let row = result::Entity::find_by_id(id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert!(row.return_code.is_none());
        assert!(row.stdout.is_empty());
        assert!(row.stderr.is_empty());
    }
}
