//! Validator (§3 invariants, §8 properties) — an out-of-scope collaborator
//! per the spec, but implemented here as a separate pass from parsing
//! (mirroring the teacher's `validate_pipeline` function), so the engine
//! never starts executing a structurally unsound workflow (§7,
//! `ValidationError` → exit 20).

use crate::error::EngineError;
use crate::model::{Task, TaskId, TaskKind};
use std::collections::{HashMap, HashSet};

const MAX_TIMEOUT_SECS: u64 = 86_400;
const MAX_RETRY_COUNT: u32 = 100;
const MAX_RETRY_DELAY_SECS: u64 = 3_600;
const MAX_MAX_PARALLEL: usize = 1_000;
const MAX_LOOP_ITERATIONS: u32 = 10_000;

pub fn validate(tasks: &[Task]) -> Result<(), EngineError> {
    let mut seen = HashSet::new();
    for t in tasks {
        if !seen.insert(t.id) {
            return Err(EngineError::ValidationError(format!(
                "duplicate task id {}",
                t.id
            )));
        }
    }
    let by_id: HashMap<TaskId, &Task> = tasks.iter().map(|t| (t.id, t)).collect();

    for t in tasks {
        validate_routing(t)?;
        validate_refs_exist(t, &by_id)?;
        validate_bounds(t)?;
    }
    for t in tasks {
        if let TaskKind::Parallel(p) = &t.kind {
            validate_no_intra_group_refs(p, &by_id)?;
        }
    }
    Ok(())
}

fn validate_routing(t: &Task) -> Result<(), EngineError> {
    if t.next.is_some() && (t.on_success.is_some() || t.on_failure.is_some()) {
        return Err(EngineError::ValidationError(format!(
            "task {}: 'next' is mutually exclusive with 'on_success'/'on_failure'",
            t.id
        )));
    }
    if let TaskKind::Leaf(l) = &t.kind {
        if l.success_expr.is_some() && l.failure_expr.is_some() {
            return Err(EngineError::ValidationError(format!(
                "task {}: 'success' and 'failure' are mutually exclusive",
                t.id
            )));
        }
    }
    Ok(())
}

fn validate_refs_exist(t: &Task, by_id: &HashMap<TaskId, &Task>) -> Result<(), EngineError> {
    let check = |id: TaskId| -> Result<(), EngineError> {
        if !by_id.contains_key(&id) {
            return Err(EngineError::ValidationError(format!(
                "task {}: references unknown task {}",
                t.id, id
            )));
        }
        Ok(())
    };
    if let Some(id) = t.on_success {
        check(id)?;
    }
    if let Some(id) = t.on_failure {
        check(id)?;
    }
    if let Some(id) = t.next {
        check(id)?;
    }
    match &t.kind {
        TaskKind::Parallel(p) => {
            for m in &p.members {
                check(*m)?;
            }
        }
        TaskKind::Conditional(c) => {
            for m in c.if_true_tasks.iter().chain(c.if_false_tasks.iter()) {
                check(*m)?;
            }
        }
        TaskKind::Loop(l) => {
            for m in &l.tasks {
                check(*m)?;
            }
        }
        TaskKind::Leaf(_) => {}
    }
    Ok(())
}

fn validate_bounds(t: &Task) -> Result<(), EngineError> {
    match &t.kind {
        TaskKind::Leaf(l) => {
            if l.timeout_secs == 0 || l.timeout_secs > MAX_TIMEOUT_SECS {
                return Err(EngineError::ValidationError(format!(
                    "task {}: timeout {} out of range [1,{}]",
                    t.id, l.timeout_secs, MAX_TIMEOUT_SECS
                )));
            }
            if l.retry_count > MAX_RETRY_COUNT {
                return Err(EngineError::ValidationError(format!(
                    "task {}: retry_count {} exceeds {}",
                    t.id, l.retry_count, MAX_RETRY_COUNT
                )));
            }
            if l.retry_delay_secs > MAX_RETRY_DELAY_SECS {
                return Err(EngineError::ValidationError(format!(
                    "task {}: retry_delay {} exceeds {}",
                    t.id, l.retry_delay_secs, MAX_RETRY_DELAY_SECS
                )));
            }
        }
        TaskKind::Parallel(p) => {
            if p.max_parallel == 0 || p.max_parallel > MAX_MAX_PARALLEL {
                return Err(EngineError::ValidationError(format!(
                    "task {}: max_parallel {} out of range [1,{}]",
                    t.id, p.max_parallel, MAX_MAX_PARALLEL
                )));
            }
            if p.members.is_empty() {
                return Err(EngineError::ValidationError(format!(
                    "task {}: parallel group has no members",
                    t.id
                )));
            }
        }
        TaskKind::Loop(l) => {
            if l.iterations > MAX_LOOP_ITERATIONS {
                return Err(EngineError::ValidationError(format!(
                    "task {}: loop iterations {} exceeds {}",
                    t.id, l.iterations, MAX_LOOP_ITERATIONS
                )));
            }
        }
        TaskKind::Conditional(_) => {}
    }
    Ok(())
}

/// A parallel member's fields may not reference `@k_*@` results of another
/// member of the same group (§4.3) — only of tasks outside it.
fn validate_no_intra_group_refs(
    p: &crate::model::ParallelTask,
    by_id: &HashMap<TaskId, &Task>,
) -> Result<(), EngineError> {
    let group: HashSet<TaskId> = p.members.iter().copied().collect();
    for member_id in &p.members {
        let Some(task) = by_id.get(member_id) else {
            continue;
        };
        if let TaskKind::Leaf(l) = &task.kind {
            let mut text = l.command.clone();
            for a in &l.arguments {
                text.push(' ');
                text.push_str(a);
            }
            let mut referenced: Vec<TaskId> = referenced_task_ids(&text);
            if let Some(expr) = &l.success_expr {
                referenced.extend(expr.referenced_task_ids());
            }
            if let Some(expr) = &l.failure_expr {
                referenced.extend(expr.referenced_task_ids());
            }
            for referenced in referenced {
                if group.contains(&referenced) && referenced != *member_id {
                    return Err(EngineError::ValidationError(format!(
                        "task {member_id}: references task {referenced} in the same parallel group (task {})",
                        p.members.first().copied().unwrap_or(*member_id)
                    )));
                }
            }
        }
    }
    Ok(())
}

fn referenced_task_ids(text: &str) -> Vec<TaskId> {
    static RE: once_cell::sync::Lazy<regex::Regex> =
        once_cell::sync::Lazy::new(|| regex::Regex::new(r"@(\d+)_(stdout|stderr|success)@").unwrap());
    RE.captures_iter(text)
        .filter_map(|c| c[1].parse().ok())
        .collect()
}
