//! Router (§4.6): after a task completes, decide the next task id from its
//! outcome and routing fields. `on_success`/`on_failure` and `next` are
//! validated as mutually exclusive before execution ever starts
//! (`validate::validate_routing`), so this module only has to read them.

use crate::error::EngineError;
use crate::model::{Task, TaskId, TaskResult};
use std::collections::HashMap;

/// Where the Workflow Driver goes after a task finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Continue with this task id.
    Next(TaskId),
    /// Success with no explicit routing (§4.6 row 3): the driver applies
    /// the id-order fallback (`next_by_id_order`) and only truly ends the
    /// workflow when that comes up empty.
    End,
    /// A failing task had only `on_success` defined (§4.6, the
    /// strict-success case) — terminate with the fixed TASK_FAILED code.
    TerminateTaskFailed,
    /// A failing task had no routing at all — terminate with the exit code
    /// derived from the failing task itself (§6: propagated 1-9, or the
    /// driver's own mapping when the exit code is out of that range).
    TerminateUnrouted { exit_code: i32 },
}

/// Single-hop routing decision, independent of cycle bookkeeping.
pub fn route(task: &Task, result: &TaskResult) -> RouteOutcome {
    if result.success {
        if let Some(t) = task.on_success {
            return RouteOutcome::Next(t);
        }
        if let Some(t) = task.next {
            return RouteOutcome::Next(t);
        }
        RouteOutcome::End
    } else {
        if let Some(t) = task.on_failure {
            return RouteOutcome::Next(t);
        }
        if task.on_success.is_some() {
            return RouteOutcome::TerminateTaskFailed;
        }
        if let Some(t) = task.next {
            return RouteOutcome::Next(t);
        }
        RouteOutcome::TerminateUnrouted {
            exit_code: result.exit_code,
        }
    }
}

/// The success-with-no-routing fallback: smallest id greater than the
/// current one, or *end* if none remains (§4.6 row 3).
pub fn next_by_id_order(tasks: &HashMap<TaskId, Task>, current: TaskId) -> Option<TaskId> {
    tasks
        .keys()
        .copied()
        .filter(|&id| id > current)
        .min()
}

/// Routing-cycle guard: the driver calls this once per hop. Bounded at
/// `10 * task_count` per §4.6, so a workflow that routes forever without
/// reaching a terminal task fails fast with `RoutingLoop` instead of
/// hanging.
pub struct CycleGuard {
    max_hops: usize,
    hops: usize,
    start: TaskId,
}

impl CycleGuard {
    pub fn new(start: TaskId, task_count: usize) -> Self {
        CycleGuard {
            max_hops: (10 * task_count).max(10),
            hops: 0,
            start,
        }
    }

    pub fn step(&mut self) -> Result<(), EngineError> {
        self.hops += 1;
        if self.hops > self.max_hops {
            return Err(EngineError::RoutingLoop {
                start: self.start,
                hops: self.hops,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LeafTask, OutputCapture, Task, TaskKind};
    use chrono::Utc;

    fn task(id: TaskId, on_success: Option<TaskId>, on_failure: Option<TaskId>, next: Option<TaskId>) -> Task {
        Task {
            id,
            kind: TaskKind::Leaf(LeafTask {
                exec_type: "local".into(),
                hostname: None,
                command: "/bin/true".into(),
                arguments: vec![],
                timeout_secs: 5,
                sleep_secs: 0,
                retry_count: 0,
                retry_delay_secs: 0,
                success_expr: None,
                failure_expr: None,
            }),
            on_success,
            on_failure,
            next,
            return_code: None,
        }
    }

    fn result(task_id: TaskId, success: bool, exit_code: i32) -> TaskResult {
        TaskResult {
            task_id,
            exit_code,
            stdout: OutputCapture::default(),
            stderr: OutputCapture::default(),
            success,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            attempts: 1,
            skipped: false,
            error_kind: None,
        }
    }

    #[test]
    fn success_with_on_success_routes_there() {
        let t = task(1, Some(5), None, None);
        assert_eq!(route(&t, &result(1, true, 0)), RouteOutcome::Next(5));
    }

    #[test]
    fn failure_with_only_on_success_terminates_task_failed() {
        let t = task(1, Some(5), None, None);
        assert_eq!(
            route(&t, &result(1, false, 1)),
            RouteOutcome::TerminateTaskFailed
        );
    }

    #[test]
    fn failure_with_on_failure_routes_there() {
        let t = task(1, Some(5), Some(99), None);
        assert_eq!(route(&t, &result(1, false, 1)), RouteOutcome::Next(99));
    }

    #[test]
    fn failure_with_no_routing_terminates_unrouted() {
        let t = task(1, None, None, None);
        assert_eq!(
            route(&t, &result(1, false, 3)),
            RouteOutcome::TerminateUnrouted { exit_code: 3 }
        );
    }

    #[test]
    fn success_with_no_routing_falls_through_to_end() {
        let t = task(1, None, None, None);
        assert_eq!(route(&t, &result(1, true, 0)), RouteOutcome::End);
    }

    #[test]
    fn cycle_guard_trips_after_bound() {
        let mut guard = CycleGuard::new(1, 2);
        for _ in 0..20 {
            if guard.step().is_err() {
                return;
            }
        }
        panic!("cycle guard never tripped");
    }
}
