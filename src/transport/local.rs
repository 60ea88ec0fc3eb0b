//! Local transport (§2.4): spawns `command` with `arguments` as a direct
//! argv, never through a shell (§6: "the engine never constructs shell
//! strings; it passes argv") — substituted arguments can carry prior task
//! output verbatim without being re-split or re-interpreted. Generalizes
//! the teacher's `LocalBackend`, adding process-group isolation so a
//! timeout or cancellation can reach grandchildren (§9 "Subprocess tree
//! termination") and concurrent stdout/stderr draining so output produced
//! before a kill is still captured.

use super::{TransportDriver, TransportOutcome};
use crate::error::EngineError;
use crate::model::TaskId;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::Mutex;

pub struct LocalDriver;

impl LocalDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LocalDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportDriver for LocalDriver {
    async fn run(
        &self,
        task_id: TaskId,
        _hostname: Option<&str>,
        command: &str,
        arguments: &[String],
        timeout: Duration,
    ) -> Result<TransportOutcome, EngineError> {
        let mut cmd = Command::new(command);
        cmd.args(arguments);

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        #[cfg(unix)]
        unsafe {
            use std::os::unix::process::CommandExt;
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(|e| EngineError::TransportError {
            task_id,
            message: format!("failed to spawn: {e}"),
        })?;

        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let stdout_buf = Arc::new(Mutex::new(Vec::new()));
        let stderr_buf = Arc::new(Mutex::new(Vec::new()));

        let stdout_task = stdout.map(|s| tokio::spawn(drain(s, stdout_buf.clone())));
        let stderr_task = stderr.map(|s| tokio::spawn(drain(s, stderr_buf.clone())));

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                if let Some(t) = stdout_task {
                    let _ = t.await;
                }
                if let Some(t) = stderr_task {
                    let _ = t.await;
                }
                Ok(TransportOutcome {
                    exit_code: status.code().unwrap_or(-1),
                    stdout: stdout_buf.lock().await.clone(),
                    stderr: stderr_buf.lock().await.clone(),
                    timed_out: false,
                })
            }
            Ok(Err(e)) => Err(EngineError::TransportError {
                task_id,
                message: format!("wait failed: {e}"),
            }),
            Err(_elapsed) => {
                kill_process_group(pid);
                let _ = child.kill().await;
                if let Some(t) = stdout_task {
                    let _ = t.await;
                }
                if let Some(t) = stderr_task {
                    let _ = t.await;
                }
                Ok(TransportOutcome {
                    exit_code: -1,
                    stdout: stdout_buf.lock().await.clone(),
                    stderr: stderr_buf.lock().await.clone(),
                    timed_out: true,
                })
            }
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

async fn drain<R: tokio::io::AsyncRead + Unpin>(mut reader: R, buf: Arc<Mutex<Vec<u8>>>) {
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                buf.lock().await.extend_from_slice(&chunk[..n]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_true() {
        let driver = LocalDriver::new();
        let out = driver
            .run(1, None, "/bin/true", &[], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.exit_code, 0);
        assert!(!out.timed_out);
    }

    #[tokio::test]
    async fn runs_false() {
        let driver = LocalDriver::new();
        let out = driver
            .run(1, None, "/bin/false", &[], Duration::from_secs(5))
            .await
            .unwrap();
        assert_ne!(out.exit_code, 0);
    }

    #[tokio::test]
    async fn captures_stdout() {
        let driver = LocalDriver::new();
        let out = driver
            .run(1, None, "echo", &["hello".to_string()], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hello");
    }

    #[tokio::test]
    async fn timeout_kills_and_reports() {
        let driver = LocalDriver::new();
        let out = driver
            .run(1, None, "sleep", &["5".to_string()], Duration::from_millis(50))
            .await
            .unwrap();
        assert!(out.timed_out);
    }
}
