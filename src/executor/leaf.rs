//! Leaf Task Executor (§4.2): drives one atomic task through
//! `Pending → Substituting → Running → Evaluating → RetryCheck → Succeeded
//! | Failed`. Generalizes the teacher's flatter `spawn_task_future` retry
//! loop into the full state table, including timeout-as-failure and
//! post-success sleep.
//!
//! `UnresolvedReference` is the one non-retryable failure (§4.2, §7): it
//! bypasses `RetryCheck` entirely. `Timeout`, `ConditionFailed`, and
//! `TransportError` are all retry-eligible (§7) — each failed attempt
//! becomes the final result only once the retry budget is exhausted.

use super::ExecDeps;
use crate::error::{EngineError, ErrorKind};
use crate::model::{LeafTask, OutputCapture, Task, TaskId, TaskResult};
use crate::streaming;
use crate::substitution;
use chrono::Utc;
use std::time::Duration;

enum StepOutcome {
    Succeeded(TaskResult),
    Recoverable(TaskResult),
    Terminal(TaskResult),
}

pub async fn execute(deps: &ExecDeps, task: &Task) -> Result<TaskResult, EngineError> {
    let leaf = match &task.kind {
        crate::model::TaskKind::Leaf(l) => l,
        _ => unreachable!("execute_task only dispatches Leaf here"),
    };

    let max_attempts = leaf.retry_count + 1;
    let mut attempts_used = 0u32;

    loop {
        attempts_used += 1;
        if deps.cancel.is_cancelled() {
            return Ok(canceled_result(task.id, attempts_used));
        }

        match run_once(deps, task.id, leaf, attempts_used).await {
            StepOutcome::Succeeded(mut result) => {
                if leaf.sleep_secs > 0 {
                    tokio::time::sleep(Duration::from_secs(leaf.sleep_secs)).await;
                }
                result.finished_at = Utc::now();
                return Ok(result);
            }
            StepOutcome::Terminal(result) => return Ok(result),
            StepOutcome::Recoverable(result) => {
                if attempts_used < max_attempts {
                    if leaf.retry_delay_secs > 0 {
                        tokio::time::sleep(Duration::from_secs(leaf.retry_delay_secs)).await;
                    }
                    continue;
                }
                return Ok(result);
            }
        }
    }
}

async fn run_once(deps: &ExecDeps, task_id: TaskId, leaf: &LeafTask, attempt: u32) -> StepOutcome {
    let started_at = Utc::now();

    // Substituting
    let command = match substitution::substitute(&leaf.command, task_id, &deps.store, &deps.globals) {
        Ok(c) => c,
        Err(e) => return outcome_for_error(task_id, started_at, attempt, e),
    };

    let mut arguments = Vec::with_capacity(leaf.arguments.len());
    for raw in &leaf.arguments {
        match substitution::substitute(raw, task_id, &deps.store, &deps.globals) {
            Ok(a) => arguments.push(a),
            Err(e) => return outcome_for_error(task_id, started_at, attempt, e),
        }
    }

    let hostname = match &leaf.hostname {
        Some(h) => match substitution::substitute(h, task_id, &deps.store, &deps.globals) {
            Ok(h) => Some(h),
            Err(e) => return outcome_for_error(task_id, started_at, attempt, e),
        },
        None => None,
    };

    // Running
    let Some(driver) = deps.transports.get(&leaf.exec_type) else {
        let e = EngineError::TransportError {
            task_id,
            message: format!("no transport registered for exec_type '{}'", leaf.exec_type),
        };
        return outcome_for_error(task_id, started_at, attempt, e);
    };

    let outcome = match driver
        .run(
            task_id,
            hostname.as_deref(),
            &command,
            &arguments,
            Duration::from_secs(leaf.timeout_secs),
        )
        .await
    {
        Ok(o) => o,
        Err(e) => return outcome_for_error(task_id, started_at, attempt, e),
    };

    let stdout = match streaming::capture(&outcome.stdout) {
        Ok(s) => s,
        Err(e) => {
            let e = EngineError::TransportError {
                task_id,
                message: format!("failed to capture stdout: {e}"),
            };
            return outcome_for_error(task_id, started_at, attempt, e);
        }
    };
    let stderr = match streaming::capture(&outcome.stderr) {
        Ok(s) => s,
        Err(e) => {
            let e = EngineError::TransportError {
                task_id,
                message: format!("failed to capture stderr: {e}"),
            };
            return outcome_for_error(task_id, started_at, attempt, e);
        }
    };

    if outcome.timed_out {
        let e = EngineError::Timeout {
            task_id,
            timeout_secs: leaf.timeout_secs,
        };
        return outcome_for_captured_error(task_id, started_at, attempt, outcome.exit_code, stdout, stderr, e);
    }

    // Evaluating
    let success = match evaluate_success(leaf, outcome.exit_code, task_id, deps) {
        Ok(s) => s,
        Err(e) => return outcome_for_error(task_id, started_at, attempt, e),
    };

    if success {
        let result = TaskResult {
            task_id,
            exit_code: outcome.exit_code,
            stdout,
            stderr,
            success: true,
            started_at,
            finished_at: Utc::now(),
            attempts: attempt,
            skipped: false,
            error_kind: None,
        };
        return StepOutcome::Succeeded(result);
    }

    let e = EngineError::ConditionFailed { task_id };
    outcome_for_captured_error(task_id, started_at, attempt, outcome.exit_code, stdout, stderr, e)
}

fn evaluate_success(
    leaf: &LeafTask,
    exit_code: i32,
    task_id: TaskId,
    deps: &ExecDeps,
) -> Result<bool, EngineError> {
    if let Some(expr) = &leaf.success_expr {
        expr.evaluate(Some(exit_code), task_id, &deps.store, &deps.globals)
    } else if let Some(expr) = &leaf.failure_expr {
        Ok(!expr.evaluate(Some(exit_code), task_id, &deps.store, &deps.globals)?)
    } else {
        Ok(exit_code == 0)
    }
}

/// Builds the terminal/recoverable `TaskResult` for an error that occurred
/// before any output was produced (substitution, driver dispatch, output
/// capture), routing through `EngineError::retryable()` instead of a
/// hand-picked variant at each call site (§7).
fn outcome_for_error(
    task_id: TaskId,
    started_at: chrono::DateTime<Utc>,
    attempt: u32,
    e: EngineError,
) -> StepOutcome {
    let retryable = e.retryable();
    let result = TaskResult {
        task_id,
        exit_code: -1,
        stdout: OutputCapture::default(),
        stderr: OutputCapture::default(),
        success: false,
        started_at,
        finished_at: Utc::now(),
        attempts: attempt,
        skipped: false,
        error_kind: (&e).into(),
    };
    if retryable {
        StepOutcome::Recoverable(result)
    } else {
        StepOutcome::Terminal(result)
    }
}

/// Same as `outcome_for_error`, but for a failure that still carries real
/// captured output (timeout, condition-failed) rather than a synthetic
/// exit code.
fn outcome_for_captured_error(
    task_id: TaskId,
    started_at: chrono::DateTime<Utc>,
    attempt: u32,
    exit_code: i32,
    stdout: OutputCapture,
    stderr: OutputCapture,
    e: EngineError,
) -> StepOutcome {
    let retryable = e.retryable();
    let result = TaskResult {
        task_id,
        exit_code,
        stdout,
        stderr,
        success: false,
        started_at,
        finished_at: Utc::now(),
        attempts: attempt,
        skipped: false,
        error_kind: (&e).into(),
    };
    if retryable {
        StepOutcome::Recoverable(result)
    } else {
        StepOutcome::Terminal(result)
    }
}

fn canceled_result(task_id: TaskId, attempts: u32) -> TaskResult {
    let now = Utc::now();
    let e = EngineError::Canceled { task_id };
    TaskResult {
        task_id,
        exit_code: -1,
        stdout: OutputCapture::default(),
        stderr: OutputCapture::default(),
        success: false,
        started_at: now,
        finished_at: now,
        attempts,
        skipped: false,
        error_kind: (&e).into(),
    }
}
