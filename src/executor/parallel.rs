//! Parallel Executor (§4.3). Generalizes the teacher's
//! `FuturesUnordered` + `tokio::sync::Semaphore` dispatch loop
//! (`run_pipeline`'s driver loop in the teacher's `pipeline::executor`)
//! into a bounded worker pool with group success rules and an optional
//! one-more-pass retry for failed members.

use super::{execute_task, ExecDeps};
use crate::env;
use crate::error::EngineError;
use crate::model::{GroupRule, OutputCapture, ParallelTask, Task, TaskId, TaskResult};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::info;

pub async fn execute(deps: &ExecDeps, task: &Task) -> Result<TaskResult, EngineError> {
    let p = match &task.kind {
        crate::model::TaskKind::Parallel(p) => p,
        _ => unreachable!("execute_task only dispatches Parallel here"),
    };

    let started_at = Utc::now();
    let pool_size = effective_pool_size(p.max_parallel);

    let mut member_results = run_wave(deps, &p.members, pool_size).await?;

    if p.retry_failed {
        let still_failed: Vec<TaskId> = member_results
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.task_id)
            .collect();
        if !still_failed.is_empty() {
            let retried = run_wave(deps, &still_failed, pool_size).await?;
            for r in retried {
                if let Some(slot) = member_results.iter_mut().find(|m| m.task_id == r.task_id) {
                    *slot = r;
                }
            }
        }
    }

    member_results.sort_by_key(|r| r.task_id);

    let succeeded = member_results.iter().filter(|r| r.success).count();
    let total = member_results.len();
    let group_success = p.rule.satisfied(succeeded, total);

    let mut stdout = String::new();
    for r in &member_results {
        stdout.push_str(&r.stdout_string());
        stdout.push('\n');
    }

    let stdout_capture = crate::streaming::capture(stdout.as_bytes()).map_err(|e| {
        EngineError::TransportError {
            task_id: task.id,
            message: format!("failed to capture parallel group stdout: {e}"),
        }
    })?;

    Ok(TaskResult {
        task_id: task.id,
        exit_code: if group_success { 0 } else { 1 },
        stdout: stdout_capture,
        stderr: OutputCapture::default(),
        success: group_success,
        started_at,
        finished_at: Utc::now(),
        attempts: 1,
        skipped: false,
        error_kind: None,
    })
}

async fn run_wave(
    deps: &ExecDeps,
    members: &[TaskId],
    pool_size: usize,
) -> Result<Vec<TaskResult>, EngineError> {
    let sem = Arc::new(Semaphore::new(pool_size.max(1)));
    let mut futures = FuturesUnordered::new();

    for &member_id in members {
        let deps = deps.clone();
        let sem = sem.clone();
        futures.push(async move {
            let _permit = sem.acquire_owned().await.expect("semaphore not closed");
            execute_task(&deps, member_id).await
        });
    }

    let mut results = Vec::with_capacity(members.len());
    while let Some(res) = futures.next().await {
        results.push(res?);
    }
    Ok(results)
}

/// `min(max_parallel, cpu_cores*4, fd_limit/2)`, divided by
/// `TASKER_PARALLEL_INSTANCES` (floor 1). Logs at INFO when the requested
/// value exceeded the cap (§5 "Thread pool capping").
fn effective_pool_size(requested: usize) -> usize {
    let cpu_cap = std::thread::available_parallelism()
        .map(|n| n.get() * 4)
        .unwrap_or(requested);

    let fd_cap = rlimit::getrlimit(rlimit::Resource::NOFILE)
        .map(|(soft, _hard)| (soft / 2).max(1) as usize)
        .unwrap_or(usize::MAX);

    let instances = env::parallel_instances();

    let capped = requested.min(cpu_cap).min(fd_cap);
    let divided = (capped / instances).max(1);

    if divided < requested {
        info!(
            requested,
            cpu_cap, fd_cap, instances, effective = divided,
            "parallel pool size capped"
        );
    }
    divided
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::globals::GlobalVars;
    use crate::model::{LeafTask, Task, TaskKind};
    use crate::result_store::ResultStore;
    use crate::transport::TransportRegistry;
    use std::collections::HashMap;
    use tokio_util::sync::CancellationToken;

    fn leaf(id: TaskId, command: &str) -> Task {
        Task {
            id,
            kind: TaskKind::Leaf(LeafTask {
                exec_type: "local".into(),
                hostname: None,
                command: command.into(),
                arguments: vec![],
                timeout_secs: 5,
                sleep_secs: 0,
                retry_count: 0,
                retry_delay_secs: 0,
                success_expr: None,
                failure_expr: None,
            }),
            on_success: None,
            on_failure: None,
            next: None,
            return_code: None,
        }
    }

    fn group(id: TaskId, members: Vec<TaskId>, rule: GroupRule, max_parallel: usize) -> Task {
        Task {
            id,
            kind: TaskKind::Parallel(ParallelTask {
                members,
                max_parallel,
                rule,
                retry_failed: false,
            }),
            on_success: None,
            on_failure: None,
            next: None,
            return_code: None,
        }
    }

    #[tokio::test]
    async fn all_rule_succeeds_when_every_member_succeeds() {
        let members = vec![leaf(1, "/bin/true"), leaf(2, "/bin/true"), leaf(3, "/bin/true")];
        let grp = group(10, vec![1, 2, 3], GroupRule::All, 2);
        let mut all = members;
        all.push(grp.clone());
        let table: HashMap<TaskId, Task> = all.into_iter().map(|t| (t.id, t)).collect();
        let deps = ExecDeps {
            tasks: Arc::new(table),
            store: Arc::new(ResultStore::new()),
            globals: GlobalVars::from_raw(HashMap::new()).unwrap(),
            transports: Arc::new(TransportRegistry::with_defaults()),
            cancel: CancellationToken::new(),
        };
        let result = execute(&deps, &grp).await.unwrap();
        assert!(result.success);
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn any_rule_succeeds_with_one_success() {
        let members = vec![leaf(1, "/bin/false"), leaf(2, "/bin/true")];
        let grp = group(10, vec![1, 2], GroupRule::Any, 2);
        let mut all = members;
        all.push(grp.clone());
        let table: HashMap<TaskId, Task> = all.into_iter().map(|t| (t.id, t)).collect();
        let deps = ExecDeps {
            tasks: Arc::new(table),
            store: Arc::new(ResultStore::new()),
            globals: GlobalVars::from_raw(HashMap::new()).unwrap(),
            transports: Arc::new(TransportRegistry::with_defaults()),
            cancel: CancellationToken::new(),
        };
        let result = execute(&deps, &grp).await.unwrap();
        assert!(result.success);
    }
}
