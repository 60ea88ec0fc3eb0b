//! Executors (§4.2–§4.5). Each executor kind receives a single narrow
//! dependency bundle — result store, globals, transport registry, the flat
//! task table, and a cancellation signal — rather than a god-object
//! context (§9 "God-object execution context → explicit dependency
//! bundle"). Composite executors recurse back into `execute_task`, so a
//! loop body or conditional branch can itself contain a parallel group.

pub mod conditional;
pub mod leaf;
pub mod loop_exec;
pub mod parallel;

use crate::error::EngineError;
use crate::globals::GlobalVars;
use crate::model::{Task, TaskId, TaskKind, TaskResult};
use crate::result_store::ResultStore;
use crate::transport::TransportRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct ExecDeps {
    pub tasks: Arc<HashMap<TaskId, Task>>,
    pub store: Arc<ResultStore>,
    pub globals: GlobalVars,
    pub transports: Arc<TransportRegistry>,
    pub cancel: CancellationToken,
}

/// Dispatch a single task by id to the executor matching its kind, without
/// touching the shared store. Used directly by the loop executor, whose
/// embedded task list may run the same id across several iterations —
/// publishing each iteration's result under that id would violate the
/// Result Store's write-once invariant (§3), so loop-embedded results stay
/// internal to the loop's own composite result (see DESIGN.md).
pub async fn dispatch_task(deps: &ExecDeps, task_id: TaskId) -> Result<TaskResult, EngineError> {
    let task = deps
        .tasks
        .get(&task_id)
        .cloned()
        .ok_or_else(|| EngineError::ValidationError(format!("unknown task {task_id}")))?;

    match &task.kind {
        TaskKind::Leaf(_) => leaf::execute(deps, &task).await,
        TaskKind::Parallel(_) => parallel::execute(deps, &task).await,
        TaskKind::Conditional(_) => conditional::execute(deps, &task).await,
        TaskKind::Loop(_) => loop_exec::execute(deps, &task).await,
    }
}

/// Dispatch a single task by id and write its result into the shared
/// store before returning it. Used by the Workflow Driver for top-level
/// tasks, and by the parallel/conditional executors for their
/// members/branches, all of which run their referenced ids exactly once
/// (§5: "Post-group: all member results are visible to tasks after the
/// group").
pub async fn execute_task(deps: &ExecDeps, task_id: TaskId) -> Result<TaskResult, EngineError> {
    let result = dispatch_task(deps, task_id).await?;

    deps.store
        .insert(result.clone())
        .map_err(|e| EngineError::ValidationError(e.to_string()))?;

    Ok(result)
}
