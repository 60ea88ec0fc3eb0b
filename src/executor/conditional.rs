//! Conditional Executor (§4.4): evaluate the predicate, then run the
//! matching branch's tasks sequentially (never in parallel). The
//! composite result's success is the logical AND of the branch's task
//! successes; its exit code is the last branch task's exit code.

use super::{execute_task, ExecDeps};
use crate::error::EngineError;
use crate::model::{OutputCapture, Task, TaskId, TaskResult};
use chrono::Utc;

pub async fn execute(deps: &ExecDeps, task: &Task) -> Result<TaskResult, EngineError> {
    let c = match &task.kind {
        crate::model::TaskKind::Conditional(c) => c,
        _ => unreachable!("execute_task only dispatches Conditional here"),
    };

    let started_at = Utc::now();
    let predicate = c
        .condition
        .evaluate(None, task.id, &deps.store, &deps.globals)?;

    let branch: &[TaskId] = if predicate {
        &c.if_true_tasks
    } else {
        &c.if_false_tasks
    };

    let mut success = true;
    let mut last_exit_code = 0;
    let mut stdout = String::new();

    for &member_id in branch {
        let result = execute_task(deps, member_id).await?;
        success &= result.success;
        last_exit_code = result.exit_code;
        stdout.push_str(&result.stdout_string());
        stdout.push('\n');
    }

    let stdout_capture = crate::streaming::capture(stdout.as_bytes()).map_err(|e| {
        EngineError::TransportError {
            task_id: task.id,
            message: format!("failed to capture conditional branch stdout: {e}"),
        }
    })?;

    Ok(TaskResult {
        task_id: task.id,
        exit_code: last_exit_code,
        stdout: stdout_capture,
        stderr: OutputCapture::default(),
        success,
        started_at,
        finished_at: Utc::now(),
        attempts: 1,
        skipped: branch.is_empty(),
        error_kind: None,
    })
}
