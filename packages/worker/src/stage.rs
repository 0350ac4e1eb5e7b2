//! Sandbox staging: walk a Result's provenance edges, collect every
//! required input file, and lay them out in a throwaway directory.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use common::entity::{result, result_dependency, submission, upload};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use tracing::debug;

use crate::error::WorkerError;

/// One file to place in the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    /// Name the grading script sees in its working directory.
    pub filename: String,
    /// Where the bytes live on shared storage.
    pub source: PathBuf,
}

/// Collect every input file for one evaluation task: the root submission's
/// uploads, the uploads of each producer submission recorded on the
/// Result, and transitively the uploads those producers' own evaluations
/// were built from.
///
/// Breadth-first over provenance edges with a visited set; an edge that
/// leads back to the root submission is a configuration error, not a
/// traversal to survive.
pub async fn collect_inputs<C: ConnectionTrait>(
    db: &C,
    root: &result::Model,
) -> Result<Vec<(String, String)>, WorkerError> {
    let root_submission_id = root.submission_id;

    let mut files = uploads_of(db, root_submission_id).await?;
    let mut visited: HashSet<i32> = HashSet::from([root_submission_id]);
    let mut queue: VecDeque<i32> = VecDeque::new();

    // The root level uses this Result's own edges: they pin the exact
    // producer combination this task was built for.
    let direct = result_dependency::Entity::find()
        .filter(result_dependency::Column::ResultId.eq(root.id))
        .order_by_asc(result_dependency::Column::Id)
        .all(db)
        .await?;

    for edge in &direct {
        if edge.producer_submission_id == root_submission_id {
            return Err(WorkerError::ProvenanceCycle { result_id: root.id });
        }
        queue.push_back(edge.producer_submission_id);
    }

    while let Some(submission_id) = queue.pop_front() {
        if !visited.insert(submission_id) {
            continue;
        }

        submission::Entity::find_by_id(submission_id)
            .one(db)
            .await?
            .ok_or(WorkerError::NotFound {
                entity: "Submission",
                id: submission_id,
            })?;

        files.extend(uploads_of(db, submission_id).await?);

        // Producers this submission's own evaluations were built from.
        let result_ids: Vec<i32> = result::Entity::find()
            .filter(result::Column::SubmissionId.eq(submission_id))
            .all(db)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();

        if result_ids.is_empty() {
            continue;
        }

        let edges = result_dependency::Entity::find()
            .filter(result_dependency::Column::ResultId.is_in(result_ids))
            .order_by_asc(result_dependency::Column::Id)
            .all(db)
            .await?;

        for edge in &edges {
            if edge.producer_submission_id == root_submission_id {
                return Err(WorkerError::ProvenanceCycle { result_id: root.id });
            }
            if !visited.contains(&edge.producer_submission_id) {
                queue.push_back(edge.producer_submission_id);
            }
        }
    }

    debug!(
        result_id = root.id,
        submission_id = root_submission_id,
        files = files.len(),
        "Collected sandbox inputs"
    );

    Ok(files)
}

async fn uploads_of<C: ConnectionTrait>(
    db: &C,
    submission_id: i32,
) -> Result<Vec<(String, String)>, WorkerError> {
    let uploads = upload::Entity::find()
        .filter(upload::Column::SubmissionId.eq(submission_id))
        .order_by_asc(upload::Column::Id)
        .all(db)
        .await?;

    Ok(uploads
        .into_iter()
        .map(|u| (u.filename, u.path))
        .collect())
}

/// Turn collected inputs into a staging plan, rejecting duplicate logical
/// filenames. Nothing is ever overwritten silently.
pub fn build_staging_plan(inputs: &[(String, String)]) -> Result<Vec<StagedFile>, WorkerError> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(inputs.len());
    let mut plan = Vec::with_capacity(inputs.len());

    for (filename, source) in inputs {
        if !seen.insert(filename.as_str()) {
            return Err(WorkerError::StagingConflict {
                filename: filename.clone(),
            });
        }
        plan.push(StagedFile {
            filename: filename.clone(),
            source: PathBuf::from(source),
        });
    }

    Ok(plan)
}

/// Copy every planned file into the sandbox root and make the tree
/// world-accessible; grading scripts run as a low-privilege account
/// distinct from the worker.
pub async fn materialize(plan: &[StagedFile], root: &Path) -> Result<(), WorkerError> {
    for file in plan {
        let dest = root.join(&file.filename);
        tokio::fs::copy(&file.source, &dest).await?;
    }

    #[cfg(unix)]
    {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;

        tokio::fs::set_permissions(root, Permissions::from_mode(0o777)).await?;
        for file in plan {
            let dest = root.join(&file.filename);
            tokio::fs::set_permissions(&dest, Permissions::from_mode(0o666)).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str, source: &str) -> (String, String) {
        (name.to_string(), source.to_string())
    }

    #[test]
    fn plan_preserves_input_order() {
        let inputs = vec![
            input("grade.py", "/store/1"),
            input("solution.py", "/store/2"),
            input("tests.py", "/store/3"),
        ];
        let plan = build_staging_plan(&inputs).unwrap();
        let names: Vec<&str> = plan.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["grade.py", "solution.py", "tests.py"]);
    }

    #[test]
    fn duplicate_filename_is_rejected_by_name() {
        let inputs = vec![
            input("solution.py", "/store/1"),
            input("helper.py", "/store/2"),
            input("solution.py", "/store/3"),
        ];
        match build_staging_plan(&inputs).unwrap_err() {
            WorkerError::StagingConflict { filename } => assert_eq!(filename, "solution.py"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn conflict_is_not_transient() {
        let err = WorkerError::StagingConflict {
            filename: "a.py".into(),
        };
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn materialize_copies_and_opens_permissions() {
        let store = tempfile::tempdir().unwrap();
        let sandbox = tempfile::tempdir().unwrap();

        let src = store.path().join("blob-1");
        std::fs::write(&src, "print('hi')").unwrap();

        let plan = vec![StagedFile {
            filename: "solution.py".into(),
            source: src,
        }];
        materialize(&plan, sandbox.path()).await.unwrap();

        let staged = sandbox.path().join("solution.py");
        assert_eq!(std::fs::read_to_string(&staged).unwrap(), "print('hi')");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&staged).unwrap().permissions().mode();
            assert_eq!(mode & 0o666, 0o666);
        }
    }
}
