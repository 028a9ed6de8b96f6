//! Local subprocess implementation of the sandboxed-exec primitive.
//!
//! Runs commands through `sh -c` with piped output, a hard timeout and
//! cancellation. Container-backed implementations plug in behind the
//! same trait.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use adjutant_protocols::{ExecOutcome, ExecRequest, SandboxError, SandboxExec, MAX_STREAM_CHARS};

/// Local `sh -c` sandbox.
pub struct LocalExec;

#[async_trait]
impl SandboxExec for LocalExec {
    async fn exec(
        &self,
        request: ExecRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecOutcome, SandboxError> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&request.command)
            .current_dir(&request.workdir)
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(command = %request.command, "exec");
        let child = cmd
            .spawn()
            .map_err(|e| SandboxError::SpawnFailed(e.to_string()))?;

        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(SandboxError::Aborted),
            outcome = tokio::time::timeout(request.timeout, child.wait_with_output()) => {
                match outcome {
                    Ok(result) => result?,
                    Err(_) => {
                        return Ok(ExecOutcome {
                            stdout: String::new(),
                            stderr: String::new(),
                            exit_code: -1,
                            timed_out: true,
                        });
                    }
                }
            }
        };

        Ok(ExecOutcome {
            stdout: cap_stream(&String::from_utf8_lossy(&output.stdout)),
            stderr: cap_stream(&String::from_utf8_lossy(&output.stderr)),
            exit_code: output.status.code().unwrap_or(-1),
            timed_out: false,
        })
    }
}

fn cap_stream(s: &str) -> String {
    if s.len() <= MAX_STREAM_CHARS {
        return s.to_string();
    }
    let mut end = MAX_STREAM_CHARS;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request(command: &str) -> ExecRequest {
        ExecRequest::new(command, std::env::temp_dir()).with_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let outcome = LocalExec
            .exec(request("echo hello; exit 3"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.stdout.trim(), "hello");
        assert_eq!(outcome.exit_code, 3);
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn captures_stderr() {
        let outcome = LocalExec
            .exec(request("echo oops >&2"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let req = request("sleep 10").with_timeout(Duration::from_millis(50));
        let outcome = LocalExec.exec(req, &CancellationToken::new()).await.unwrap();
        assert!(outcome.timed_out);
    }

    #[tokio::test]
    async fn cancellation_aborts() {
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            cancel_clone.cancel();
        });

        let result = LocalExec.exec(request("sleep 10"), &cancel).await;
        assert!(matches!(result, Err(SandboxError::Aborted)));
    }
}
