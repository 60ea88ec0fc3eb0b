//! Illustrative remote-shell transports (§2.4, out of scope in detail per
//! the spec — only the contract is specified). `command` and `arguments`
//! are passed to the wrapper binary as discrete argv elements, never
//! joined into a string ourselves (§6), and otherwise reuse the same
//! process-group / timeout / drain machinery as the local driver.

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

pub struct RemoteDriver {
    wrapper_bin: String,
}

impl RemoteDriver {
    pub fn new(wrapper_bin: impl Into<String>) -> Self {
        Self {
            wrapper_bin: wrapper_bin.into(),
        }
    }
}

#[async_trait]
impl TransportDriver for RemoteDriver {
    async fn run(
        &self,
        task_id: TaskId,
        hostname: Option<&str>,
        command: &str,
        arguments: &[String],
        timeout: Duration,
    ) -> Result<TransportOutcome, EngineError> {
        let hostname = hostname.ok_or_else(|| EngineError::TransportError {
            task_id,
            message: format!("'{}' transport requires a hostname", self.wrapper_bin),
        })?;

        let mut cmd = Command::new(&self.wrapper_bin);
        cmd.arg(hostname).arg("--").arg(command).args(arguments);
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
            message: format!("failed to spawn '{}': {e}", self.wrapper_bin),
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
                #[cfg(unix)]
                if let Some(pid) = pid {
                    unsafe {
                        libc::kill(-(pid as i32), libc::SIGKILL);
                    }
                }
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
