//! Subprocess execution with wall-clock timeout and bounded capture.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::warn;

use crate::error::WorkerError;

/// Per-stream capture ceiling. Output beyond this is read and discarded so
/// the child never blocks on a full pipe, but only this much is kept.
pub const MAX_CAPTURE_BYTES: usize = 64 * 1024;

/// How to run one grading script.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Script to execute, with no arguments.
    pub program: PathBuf,
    /// Working directory; the staged sandbox root.
    pub workdir: PathBuf,
    /// Wall-clock budget. The process is killed when it runs out.
    pub timeout: Duration,
    /// Drop to this uid before exec, when set.
    pub uid: Option<u32>,
    /// Drop to this gid before exec, when set.
    pub gid: Option<u32>,
}

/// What happened when a script ran.
#[derive(Debug, Clone)]
pub struct LaunchOutcome {
    /// Exit code. None when the process was killed by a signal
    /// (including our own timeout kill).
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub timed_out: bool,
}

/// Capability seam for running grading scripts, so evaluation handling can
/// be exercised without spawning real processes.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec) -> Result<LaunchOutcome, WorkerError>;
}

/// Launcher backed by real OS processes.
pub struct NativeLauncher;

#[async_trait]
impl ProcessLauncher for NativeLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<LaunchOutcome, WorkerError> {
        let mut command = Command::new(&spec.program);
        command
            .current_dir(&spec.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        {
            if let Some(uid) = spec.uid {
                command.uid(uid);
            }
            if let Some(gid) = spec.gid {
                command.gid(gid);
            }
        }

        let mut child = command.spawn()?;

        // Readers run concurrently with the wait so the child can't
        // deadlock on a full pipe.
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let stdout_task = tokio::spawn(read_capped(stdout_pipe));
        let stderr_task = tokio::spawn(read_capped(stderr_pipe));

        let (status, timed_out) = match timeout(spec.timeout, child.wait()).await {
            Ok(status) => (Some(status?), false),
            Err(_) => {
                warn!(
                    program = %spec.program.display(),
                    timeout_secs = spec.timeout.as_secs(),
                    "Evaluation timed out, killing process"
                );
                child.start_kill()?;
                // Reap so the readers see EOF.
                let _ = child.wait().await;
                (None, true)
            }
        };

        let (stdout, stdout_truncated) = stdout_task
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))??;
        let (stderr, stderr_truncated) = stderr_task
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))??;

        Ok(LaunchOutcome {
            exit_code: status.and_then(|s| s.code()),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            stdout_truncated,
            stderr_truncated,
            timed_out,
        })
    }
}

/// Read a pipe to EOF, keeping at most `MAX_CAPTURE_BYTES`.
async fn read_capped<R: AsyncRead + Unpin>(
    reader: Option<R>,
) -> std::io::Result<(Vec<u8>, bool)> {
    let Some(mut reader) = reader else {
        return Ok((Vec::new(), false));
    };

    let mut kept = Vec::with_capacity(8192);
    let mut truncated = false;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok((kept, truncated));
        }
        if kept.len() < MAX_CAPTURE_BYTES {
            let take = n.min(MAX_CAPTURE_BYTES - kept.len());
            kept.extend_from_slice(&chunk[..take]);
            if take < n {
                truncated = true;
            }
        } else {
            truncated = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn write_script(dir: &std::path::Path, body: &str) -> PathBuf {
        let path = dir.join("grade.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn spec(program: PathBuf, workdir: PathBuf, timeout: Duration) -> LaunchSpec {
        LaunchSpec {
            program,
            workdir,
            timeout,
            uid: None,
            gid: None,
        }
    }

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "echo hello\necho oops >&2\nexit 3");

        let outcome = NativeLauncher
            .launch(&spec(script, dir.path().into(), Duration::from_secs(10)))
            .await
            .unwrap();

        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.stdout, "hello\n");
        assert_eq!(outcome.stderr, "oops\n");
        assert!(!outcome.timed_out);
        assert!(!outcome.stdout_truncated);
    }

    #[tokio::test]
    async fn runs_in_the_given_workdir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("input.txt"), "42").unwrap();
        let script = write_script(dir.path(), "cat input.txt");

        let outcome = NativeLauncher
            .launch(&spec(script, dir.path().into(), Duration::from_secs(10)))
            .await
            .unwrap();

        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.stdout, "42");
    }

    #[tokio::test]
    async fn timeout_kills_the_process() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "echo started\nsleep 30\necho never");

        let outcome = NativeLauncher
            .launch(&spec(script, dir.path().into(), Duration::from_secs(1)))
            .await
            .unwrap();

        assert!(outcome.timed_out);
        assert_eq!(outcome.exit_code, None);
        assert_eq!(outcome.stdout, "started\n");
    }

    #[tokio::test]
    async fn capture_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        // 200000 bytes of 'a', well over the 64 KiB cap.
        let script = write_script(dir.path(), "head -c 200000 /dev/zero | tr '\\0' 'a'");

        let outcome = NativeLauncher
            .launch(&spec(script, dir.path().into(), Duration::from_secs(10)))
            .await
            .unwrap();

        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.stdout.len(), MAX_CAPTURE_BYTES);
        assert!(outcome.stdout_truncated);
        assert!(!outcome.stderr_truncated);
    }
}
