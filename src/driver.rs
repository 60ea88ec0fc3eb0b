//! Workflow Driver (§4.7): owns the current task id, dispatches it through
//! the executors, stores its result, and asks the Router where to go next.
//! Terminates when the Router says *end*, a fatal error surfaces, or an
//! external cancellation signal fires. Computes the final exit code per
//! §6, generalizing the teacher's `run_pipeline` driver loop (indegree
//! scheduling over a DAG) into routed single-successor traversal.

use crate::executor::{execute_task, ExecDeps};
use crate::model::TaskId;
use crate::router::{self, CycleGuard, RouteOutcome};
use tracing::{info, warn};

/// §6: a task failed and only `on_success` was defined.
pub const EXIT_TASK_FAILED: i32 = 10;
/// §6: validation failure, or the driver observed external cancellation.
pub const EXIT_VALIDATION_OR_CANCELED: i32 = 20;
/// §6: reserved for the sanitizer collaborator; unused by the core engine.
pub const EXIT_SECURITY_REJECTED: i32 = 21;

pub struct WorkflowOutcome {
    pub exit_code: i32,
    pub executed: Vec<TaskId>,
}

/// Run the workflow to completion starting at `start`. Never panics on a
/// malformed graph — `validate::validate` is expected to have already
/// rejected unknown references and routing cycles are caught here anyway
/// as a defensive backstop.
pub async fn run(deps: &ExecDeps, start: TaskId) -> WorkflowOutcome {
    let mut guard = CycleGuard::new(start, deps.tasks.len());
    let mut current = start;
    let mut executed = Vec::new();
    let mut return_override: Option<i32> = None;

    loop {
        if deps.cancel.is_cancelled() {
            info!(task = current, "workflow canceled");
            return finish(return_override, EXIT_VALIDATION_OR_CANCELED, executed);
        }

        if let Err(e) = guard.step() {
            warn!(error = %e, "routing cycle exceeded bound");
            return finish(return_override, EXIT_VALIDATION_OR_CANCELED, executed);
        }

        let Some(task) = deps.tasks.get(&current).cloned() else {
            warn!(task = current, "router selected an unknown task id");
            return finish(return_override, EXIT_VALIDATION_OR_CANCELED, executed);
        };

        let result = match execute_task(deps, current).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, task = current, "fatal error, terminating workflow");
                return finish(return_override, EXIT_VALIDATION_OR_CANCELED, executed);
            }
        };

        executed.push(current);
        if let Some(r) = task.return_code {
            return_override = Some(r);
        }

        match router::route(&task, &result) {
            RouteOutcome::Next(next) => {
                current = next;
            }
            RouteOutcome::End => match router::next_by_id_order(&deps.tasks, current) {
                Some(next) => current = next,
                None => return finish(return_override, 0, executed),
            },
            RouteOutcome::TerminateTaskFailed => {
                return finish(return_override, EXIT_TASK_FAILED, executed);
            }
            RouteOutcome::TerminateUnrouted { exit_code } => {
                let code = if (1..=9).contains(&exit_code) { exit_code } else { 1 };
                return finish(return_override, code, executed);
            }
        }
    }
}

fn finish(return_override: Option<i32>, default_code: i32, executed: Vec<TaskId>) -> WorkflowOutcome {
    WorkflowOutcome {
        exit_code: return_override.unwrap_or(default_code),
        executed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Cond;
    use crate::globals::GlobalVars;
    use crate::model::{LeafTask, ParallelTask, GroupRule, Task, TaskKind};
    use crate::result_store::ResultStore;
    use crate::transport::TransportRegistry;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn leaf(
        id: TaskId,
        command: &str,
        failure: Option<&str>,
        on_success: Option<TaskId>,
        on_failure: Option<TaskId>,
        return_code: Option<i32>,
    ) -> Task {
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
                failure_expr: failure.map(|f| Cond::parse(f).unwrap()),
            }),
            on_success,
            on_failure,
            next: None,
            return_code,
        }
    }

    fn deps_for(table: HashMap<TaskId, Task>) -> ExecDeps {
        ExecDeps {
            tasks: Arc::new(table),
            store: Arc::new(ResultStore::new()),
            globals: GlobalVars::from_raw(HashMap::new()).unwrap(),
            transports: Arc::new(TransportRegistry::with_defaults()),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn inverse_logic_success_exits_one() {
        let t = leaf(1, "/bin/false", Some("exit_1"), None, None, None);
        let deps = deps_for(vec![t].into_iter().map(|t| (t.id, t)).collect());
        let outcome = run(&deps, 1).await;
        assert_eq!(outcome.exit_code, 1);
        assert_eq!(outcome.executed, vec![1]);
    }

    #[tokio::test]
    async fn error_handler_routing_runs_both_tasks() {
        let t1 = leaf(1, "/bin/false", None, None, Some(99), None);
        let t99 = leaf(99, "/bin/echo", None, None, None, Some(1));
        let deps = deps_for(
            vec![t1, t99]
                .into_iter()
                .map(|t| (t.id, t))
                .collect(),
        );
        let outcome = run(&deps, 1).await;
        assert_eq!(outcome.exit_code, 1);
        assert_eq!(outcome.executed, vec![1, 99]);
        let r1 = deps.store.get(1).unwrap();
        assert!(!r1.success);
        let r99 = deps.store.get(99).unwrap();
        assert!(r99.success);
    }

    #[tokio::test]
    async fn strict_success_with_only_on_success_terminates_exit_10() {
        let t1 = leaf(1, "/bin/false", None, Some(5), None, None);
        let t5 = leaf(5, "/bin/true", None, None, None, None);
        let deps = deps_for(vec![t1, t5].into_iter().map(|t| (t.id, t)).collect());
        let outcome = run(&deps, 1).await;
        assert_eq!(outcome.exit_code, 10);
        assert_eq!(outcome.executed, vec![1]);
        assert!(!deps.store.contains(5));
    }

    #[tokio::test]
    async fn success_falls_through_to_smallest_greater_id() {
        let t1 = leaf(1, "/bin/true", None, None, None, None);
        let t2 = leaf(2, "/bin/true", None, None, None, None);
        let deps = deps_for(vec![t1, t2].into_iter().map(|t| (t.id, t)).collect());
        let outcome = run(&deps, 1).await;
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.executed, vec![1, 2]);
    }

    #[tokio::test]
    async fn parallel_all_succeed_group_is_visible_afterward() {
        let m1 = leaf(1, "/bin/true", None, None, None, None);
        let m2 = leaf(2, "/bin/true", None, None, None, None);
        let m3 = leaf(3, "/bin/true", None, None, None, None);
        let group = Task {
            id: 10,
            kind: TaskKind::Parallel(ParallelTask {
                members: vec![1, 2, 3],
                max_parallel: 2,
                rule: GroupRule::All,
                retry_failed: false,
            }),
            on_success: None,
            on_failure: None,
            next: None,
            return_code: None,
        };
        let deps = deps_for(
            vec![m1, m2, m3, group]
                .into_iter()
                .map(|t| (t.id, t))
                .collect(),
        );
        let outcome = run(&deps, 10).await;
        assert_eq!(outcome.exit_code, 0);
        assert!(deps.store.contains(1));
        assert!(deps.store.contains(2));
        assert!(deps.store.contains(3));
    }

    #[tokio::test]
    async fn return_override_is_last_writer_wins() {
        let t1 = leaf(1, "/bin/true", None, None, None, Some(5));
        let t2 = leaf(2, "/bin/true", None, None, None, Some(7));
        let deps = deps_for(vec![t1, t2].into_iter().map(|t| (t.id, t)).collect());
        let outcome = run(&deps, 1).await;
        assert_eq!(outcome.exit_code, 7);
    }
}
