//! Evaluation stage: run one grading script against its staged sandbox
//! and finalize the Result row exactly once.

use std::time::Duration;

use common::entity::{project, result, submission};
use common::jobs::EvaluationJob;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use tracing::{info, instrument};

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::launcher::{LaunchOutcome, LaunchSpec, ProcessLauncher};
use crate::stage;

/// Execute one evaluation job.
///
/// Idempotent by construction: a Result that is already finalized is
/// skipped up front, and the finalizing update is guarded on the null
/// return code, so a redelivered job can never overwrite an outcome.
#[instrument(skip(db, launcher, config), fields(result_id = job.result_id, job_id = %job.job_id))]
pub async fn handle_evaluation_job(
    db: &DatabaseConnection,
    launcher: &dyn ProcessLauncher,
    config: &WorkerConfig,
    job: &EvaluationJob,
) -> Result<(), WorkerError> {
    let task = result::Entity::find_by_id(job.result_id)
        .one(db)
        .await?
        .ok_or(WorkerError::NotFound {
            entity: "Result",
            id: job.result_id,
        })?;

    if task.return_code.is_some() {
        info!("Result already finalized, skipping");
        return Ok(());
    }

    let sub = submission::Entity::find_by_id(task.submission_id)
        .one(db)
        .await?
        .ok_or(WorkerError::NotFound {
            entity: "Submission",
            id: task.submission_id,
        })?;

    let proj = project::Entity::find_by_id(sub.project_id)
        .one(db)
        .await?
        .ok_or(WorkerError::NotFound {
            entity: "Project",
            id: sub.project_id,
        })?;

    let script = proj
        .script_path
        .as_deref()
        .ok_or(WorkerError::MissingScript {
            project_id: proj.id,
        })?;

    let timeout_secs = job.timeout_secs.unwrap_or(proj.timeout_secs.max(1) as u64);

    let inputs = stage::collect_inputs(db, &task).await?;
    let plan = stage::build_staging_plan(&inputs)?;

    // Exclusively owned by this task, removed on drop, never reused.
    let sandbox = tempfile::tempdir()?;
    stage::materialize(&plan, sandbox.path()).await?;

    let outcome = launcher
        .launch(&LaunchSpec {
            program: script.into(),
            workdir: sandbox.path().into(),
            timeout: Duration::from_secs(timeout_secs),
            uid: config.run_uid,
            gid: config.run_gid,
        })
        .await?;

    let (stdout, stderr, return_code) = finalize_streams(outcome, timeout_secs);

    let updated = result::Entity::update_many()
        .set(result::ActiveModel {
            stdout: Set(stdout),
            stderr: Set(stderr),
            return_code: Set(Some(return_code)),
            ..Default::default()
        })
        .filter(result::Column::Id.eq(task.id))
        .filter(result::Column::ReturnCode.is_null())
        .exec(db)
        .await?;

    if updated.rows_affected == 0 {
        info!("Result was finalized concurrently, discarding this run");
    } else {
        info!(return_code, "Result finalized");
    }

    Ok(())
}

/// Turn a launch outcome into the stored streams and return code.
///
/// A timeout finalizes with return code 1 and the timeout line appended to
/// both streams; a signal death with no exit code also maps to 1.
fn finalize_streams(outcome: LaunchOutcome, timeout_secs: u64) -> (String, String, i32) {
    let mut stdout = outcome.stdout;
    let mut stderr = outcome.stderr;

    if outcome.stdout_truncated {
        stdout.push_str("\n[output truncated]");
    }
    if outcome.stderr_truncated {
        stderr.push_str("\n[output truncated]");
    }

    if outcome.timed_out {
        let line = format!("evaluation timed out after {timeout_secs} seconds");
        push_line(&mut stdout, &line);
        push_line(&mut stderr, &line);
        return (stdout, stderr, 1);
    }

    (stdout, stderr, outcome.exit_code.unwrap_or(1))
}

/// Append a line, separating it from any partial output already captured.
fn push_line(stream: &mut String, line: &str) {
    if !stream.is_empty() && !stream.ends_with('\n') {
        stream.push('\n');
    }
    stream.push_str(line);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(stdout: &str, stderr: &str, exit_code: Option<i32>) -> LaunchOutcome {
        LaunchOutcome {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            stdout_truncated: false,
            stderr_truncated: false,
            timed_out: false,
        }
    }

    #[test]
    fn normal_exit_passes_through() {
        let (stdout, stderr, rc) = finalize_streams(outcome("ok\n", "", Some(0)), 5);
        assert_eq!((stdout.as_str(), stderr.as_str(), rc), ("ok\n", "", 0));

        let (_, _, rc) = finalize_streams(outcome("", "boom\n", Some(2)), 5);
        assert_eq!(rc, 2);
    }

    #[test]
    fn timeout_sets_code_one_and_stamps_both_streams() {
        let mut o = outcome("partial", "", None);
        o.timed_out = true;
        let (stdout, stderr, rc) = finalize_streams(o, 30);

        assert_eq!(rc, 1);
        // Partial output gets its own line before the timeout stamp.
        assert_eq!(stdout, "partial\nevaluation timed out after 30 seconds");
        assert_eq!(stderr, "evaluation timed out after 30 seconds");
    }

    #[test]
    fn timeout_stamp_does_not_double_newlines() {
        let mut o = outcome("partial\n", "", None);
        o.timed_out = true;
        let (stdout, _, _) = finalize_streams(o, 5);
        assert_eq!(stdout, "partial\nevaluation timed out after 5 seconds");
    }

    #[test]
    fn signal_death_maps_to_code_one() {
        let (_, _, rc) = finalize_streams(outcome("", "", None), 5);
        assert_eq!(rc, 1);
    }

    #[test]
    fn truncation_is_marked() {
        let mut o = outcome("aaaa", "", Some(0));
        o.stdout_truncated = true;
        let (stdout, stderr, _) = finalize_streams(o, 5);
        assert!(stdout.ends_with("[output truncated]"));
        assert!(!stderr.contains("truncated"));
    }
}
