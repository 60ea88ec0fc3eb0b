//! Loop Executor (§4.5): repeat the embedded task list up to `iterations`
//! times, exiting early on `break_on_success` / `break_on_failure` as
//! judged by the last embedded task's outcome. Reports iterations executed
//! and the final embedded outcome.

use super::{dispatch_task, ExecDeps};
use crate::error::EngineError;
use crate::model::{OutputCapture, Task, TaskResult};
use chrono::Utc;

pub async fn execute(deps: &ExecDeps, task: &Task) -> Result<TaskResult, EngineError> {
    let l = match &task.kind {
        crate::model::TaskKind::Loop(l) => l,
        _ => unreachable!("execute_task only dispatches Loop here"),
    };

    let started_at = Utc::now();
    let mut last_result: Option<TaskResult> = None;
    let mut iterations_run = 0u32;

    for _ in 0..l.iterations {
        iterations_run += 1;
        let mut iteration_result = None;
        for &member_id in &l.tasks {
            let result = dispatch_task(deps, member_id).await?;
            iteration_result = Some(result);
        }
        last_result = iteration_result;

        if let Some(r) = &last_result {
            if l.break_on_success && r.success {
                break;
            }
            if l.break_on_failure && !r.success {
                break;
            }
        }
    }

    let (exit_code, success, stdout_text) = match &last_result {
        Some(r) => (r.exit_code, r.success, r.stdout_string()),
        None => (0, true, String::new()),
    };

    let stdout_capture = crate::streaming::capture(stdout_text.as_bytes()).map_err(|e| {
        EngineError::TransportError {
            task_id: task.id,
            message: format!("failed to capture loop body stdout: {e}"),
        }
    })?;

    Ok(TaskResult {
        task_id: task.id,
        exit_code,
        stdout: stdout_capture,
        stderr: OutputCapture::default(),
        success,
        started_at,
        finished_at: Utc::now(),
        attempts: iterations_run,
        skipped: l.iterations == 0,
        error_kind: None,
    })
}
