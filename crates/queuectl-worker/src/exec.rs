//! Shell command execution with a per-job wall-clock timeout and whole
//! process-tree teardown on timeout (design doc §4.4 step 4).

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;

/// The result of running a job's `command`.
pub struct ExecOutcome {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub execution_time_ms: i64,
}

/// Run `command` under `/bin/sh -c`, capturing stdout/stderr, bounded by
/// `timeout`. On timeout, kills the whole process group and reports
/// failure with "command timed out after N seconds" (§4.4 step 4).
pub async fn run_command(command: &str, timeout: Duration) -> ExecOutcome {
    let mut cmd = Command::new("/bin/sh");
    cmd.arg("-c").arg(command);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Its own process group, so a timeout can signal the whole tree
        // the shell spawned, not just the shell itself.
        cmd.process_group(0);
    }

    let start = Instant::now();
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return ExecOutcome {
                success: false,
                output: String::new(),
                error: Some(format!("failed to execute command: {e}")),
                execution_time_ms: start.elapsed().as_millis() as i64,
            }
        }
    };
    let pid = child.id();

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let execution_time_ms = start.elapsed().as_millis() as i64;
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if output.status.success() {
                ExecOutcome {
                    success: true,
                    output: stdout,
                    error: None,
                    execution_time_ms,
                }
            } else {
                let error = if !stderr.is_empty() {
                    stderr
                } else {
                    format!("command exited with status {}", output.status)
                };
                ExecOutcome {
                    success: false,
                    output: stdout,
                    error: Some(error),
                    execution_time_ms,
                }
            }
        }
        Ok(Err(e)) => ExecOutcome {
            success: false,
            output: String::new(),
            error: Some(format!("failed to execute command: {e}")),
            execution_time_ms: start.elapsed().as_millis() as i64,
        },
        Err(_elapsed) => {
            kill_process_group(pid);
            ExecOutcome {
                success: false,
                output: String::new(),
                error: Some(format!(
                    "command timed out after {} seconds",
                    timeout.as_secs()
                )),
                execution_time_ms: start.elapsed().as_millis() as i64,
            }
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        unsafe {
            libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_command_reports_stdout() {
        let outcome = run_command("echo hello", Duration::from_secs(5)).await;
        assert!(outcome.success);
        assert_eq!(outcome.output, "hello");
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn failing_command_captures_stderr() {
        let outcome = run_command("echo boom 1>&2; exit 1", Duration::from_secs(5)).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn timeout_is_reported_and_bounded() {
        let outcome = run_command("sleep 60", Duration::from_secs(1)).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("timed out after 1 seconds"));
        assert!(outcome.execution_time_ms < 3_000);
    }
}
