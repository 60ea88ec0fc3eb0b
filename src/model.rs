//! The data model (§3): `Task`, `TaskResult`, and the group/loop policy
//! types. Tasks form a routed graph kept as a flat table keyed by id — all
//! inter-task links (parallel members, conditional branches, loop bodies,
//! routing targets) are id lookups, never direct ownership, per the
//! "cyclic references among tasks" design note.

use crate::condition::Cond;
use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;

pub type TaskId = u64;

#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub on_success: Option<TaskId>,
    pub on_failure: Option<TaskId>,
    pub next: Option<TaskId>,
    pub return_code: Option<i32>,
}

impl Task {
    pub fn has_explicit_routing(&self) -> bool {
        self.on_success.is_some() || self.on_failure.is_some() || self.next.is_some()
    }
}

#[derive(Debug, Clone)]
pub enum TaskKind {
    Leaf(LeafTask),
    Parallel(ParallelTask),
    Conditional(ConditionalTask),
    Loop(LoopTask),
}

#[derive(Debug, Clone)]
pub struct LeafTask {
    pub exec_type: String,
    pub hostname: Option<String>,
    pub command: String,
    pub arguments: Vec<String>,
    pub timeout_secs: u64,
    pub sleep_secs: u64,
    pub retry_count: u32,
    pub retry_delay_secs: u64,
    pub success_expr: Option<Cond>,
    pub failure_expr: Option<Cond>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupRule {
    All,
    Any,
    Majority,
    Count(usize),
}

impl GroupRule {
    pub fn satisfied(&self, succeeded: usize, total: usize) -> bool {
        match self {
            GroupRule::All => succeeded == total,
            GroupRule::Any => succeeded >= 1,
            GroupRule::Majority => succeeded * 2 > total,
            GroupRule::Count(n) => succeeded >= *n,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParallelTask {
    pub members: Vec<TaskId>,
    pub max_parallel: usize,
    pub rule: GroupRule,
    pub retry_failed: bool,
}

#[derive(Debug, Clone)]
pub struct ConditionalTask {
    pub condition: Cond,
    pub if_true_tasks: Vec<TaskId>,
    pub if_false_tasks: Vec<TaskId>,
}

#[derive(Debug, Clone)]
pub struct LoopTask {
    pub tasks: Vec<TaskId>,
    pub iterations: u32,
    pub break_on_success: bool,
    pub break_on_failure: bool,
}

/// Captured stdout/stderr: either held inline, or spilled to a named temp
/// file once a task's output crosses the streaming threshold (§2.5 / §5).
/// The `NamedTempFile` is reference-counted so the spill file is removed
/// whenever the last owning `TaskResult` (and thus the last `OutputCapture`
/// clone) is dropped, on every normal exit path.
#[derive(Debug, Clone)]
pub enum OutputCapture {
    Inline(String),
    Spilled(Arc<NamedTempFile>),
}

impl OutputCapture {
    pub fn read(&self) -> std::io::Result<String> {
        match self {
            OutputCapture::Inline(s) => Ok(s.clone()),
            OutputCapture::Spilled(f) => std::fs::read_to_string(f.path()),
        }
    }

    pub fn spill_path(&self) -> Option<&Path> {
        match self {
            OutputCapture::Inline(_) => None,
            OutputCapture::Spilled(f) => Some(f.path()),
        }
    }
}

impl Default for OutputCapture {
    fn default() -> Self {
        OutputCapture::Inline(String::new())
    }
}

/// One completed task's record (§3). Written once, immutable thereafter;
/// the `ResultStore` hands out clones, never references into its map.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub exit_code: i32,
    pub stdout: OutputCapture,
    pub stderr: OutputCapture,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub attempts: u32,
    pub skipped: bool,
    pub error_kind: Option<ErrorKind>,
}

impl TaskResult {
    pub fn stdout_string(&self) -> String {
        self.stdout.read().unwrap_or_default()
    }

    pub fn stderr_string(&self) -> String {
        self.stderr.read().unwrap_or_default()
    }
}
