//! Task-file parser (§6) — an out-of-scope collaborator per the spec, but
//! one that must exist for the binary to run. Translates the text format
//! into `Vec<Task>` consumed by the engine. Grounded in the teacher's
//! `pipeline::parser` (load-then-validate as two separate passes), adapted
//! from the teacher's flat YAML-of-DAG-tasks shape to the spec's
//! `key=value` record format.

use crate::condition::Cond;
use crate::error::EngineError;
use crate::model::{ConditionalTask, GroupRule, LeafTask, LoopTask, ParallelTask, Task, TaskKind};
use std::collections::HashMap;
use std::path::Path;

type Record = Vec<(String, String)>;

/// Load and parse a task file into the in-memory task list. Structural
/// validation (§3 invariants, §8 properties) is a separate pass — see
/// `validate.rs` — so a caller can inspect a parsed-but-unvalidated list.
pub fn load_task_file(path: &Path) -> Result<Vec<Task>, EngineError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        EngineError::ParseError(format!("failed to read {}: {e}", path.display()))
    })?;
    parse_task_text(&content)
}

pub fn parse_task_text(content: &str) -> Result<Vec<Task>, EngineError> {
    let records = split_records(content)?;
    records.into_iter().map(|r| task_from_record(&r)).collect()
}

/// Strip `#` comments, then split into records on blank lines or a
/// repeated `task=` key (whichever comes first).
fn split_records(content: &str) -> Result<Vec<Record>, EngineError> {
    let mut records = Vec::new();
    let mut current: Record = Vec::new();

    for raw_line in content.lines() {
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            if !current.is_empty() {
                records.push(std::mem::take(&mut current));
            }
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            return Err(EngineError::ParseError(format!(
                "malformed line (expected key=value): '{line}'"
            )));
        };
        let key = key.trim().to_string();
        let value = value.trim().to_string();

        if key == "task" && !current.is_empty() {
            records.push(std::mem::take(&mut current));
        }
        current.push((key, value));
    }
    if !current.is_empty() {
        records.push(current);
    }
    Ok(records)
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn as_map(record: &Record) -> HashMap<&str, &str> {
    record
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect()
}

fn required<'a>(map: &HashMap<&str, &'a str>, key: &str) -> Result<&'a str, EngineError> {
    map.get(key)
        .copied()
        .ok_or_else(|| EngineError::ParseError(format!("missing required field '{key}'")))
}

fn parse_u64(map: &HashMap<&str, &str>, key: &str, default: u64) -> Result<u64, EngineError> {
    match map.get(key) {
        Some(v) => v
            .parse()
            .map_err(|_| EngineError::ParseError(format!("field '{key}' is not a number: '{v}'"))),
        None => Ok(default),
    }
}

fn parse_u32(map: &HashMap<&str, &str>, key: &str, default: u32) -> Result<u32, EngineError> {
    match map.get(key) {
        Some(v) => v
            .parse()
            .map_err(|_| EngineError::ParseError(format!("field '{key}' is not a number: '{v}'"))),
        None => Ok(default),
    }
}

fn parse_bool(map: &HashMap<&str, &str>, key: &str, default: bool) -> Result<bool, EngineError> {
    match map.get(key) {
        Some(v) => match *v {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(EngineError::ParseError(format!(
                "field '{key}' is not a boolean: '{other}'"
            ))),
        },
        None => Ok(default),
    }
}

fn parse_id_list(value: &str) -> Result<Vec<u64>, EngineError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|_| EngineError::ParseError(format!("bad task id in list: '{s}'")))
        })
        .collect()
}

fn task_from_record(record: &Record) -> Result<Task, EngineError> {
    let map = as_map(record);

    let id: u64 = required(&map, "task")?
        .parse()
        .map_err(|_| EngineError::ParseError("field 'task' is not a non-negative integer".into()))?;

    let kind_tag = map.get("kind").copied().unwrap_or("leaf");

    let on_success = map.get("on_success").map(|v| v.parse()).transpose().map_err(|_| {
        EngineError::ParseError("field 'on_success' is not a task id".into())
    })?;
    let on_failure = map.get("on_failure").map(|v| v.parse()).transpose().map_err(|_| {
        EngineError::ParseError("field 'on_failure' is not a task id".into())
    })?;
    let next = map
        .get("next")
        .map(|v| v.parse())
        .transpose()
        .map_err(|_| EngineError::ParseError("field 'next' is not a task id".into()))?;
    let return_code = map
        .get("return")
        .map(|v| v.parse())
        .transpose()
        .map_err(|_| EngineError::ParseError("field 'return' is not an integer".into()))?;

    let kind = match kind_tag {
        "leaf" => TaskKind::Leaf(leaf_from_map(&map)?),
        "parallel" => TaskKind::Parallel(parallel_from_map(&map)?),
        "conditional" => TaskKind::Conditional(conditional_from_map(&map)?),
        "loop" => TaskKind::Loop(loop_from_map(&map)?),
        other => {
            return Err(EngineError::ParseError(format!(
                "unknown task kind '{other}'"
            )))
        }
    };

    Ok(Task {
        id,
        kind,
        on_success,
        on_failure,
        next,
        return_code,
    })
}

fn leaf_from_map(map: &HashMap<&str, &str>) -> Result<LeafTask, EngineError> {
    let exec_type = map.get("exec_type").unwrap_or(&"local").to_string();
    let hostname = map.get("hostname").map(|s| s.to_string());
    let command = required(map, "command")?.to_string();
    let arguments = map
        .get("arguments")
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    let timeout_secs = parse_u64(map, "timeout", 60)?;
    let sleep_secs = parse_u64(map, "sleep", 0)?;
    let retry_count = parse_u32(map, "retry_count", 0)?;
    let retry_delay_secs = parse_u64(map, "retry_delay", 0)?;

    let success_expr = map.get("success").map(|s| Cond::parse(s)).transpose()?;
    let failure_expr = map.get("failure").map(|s| Cond::parse(s)).transpose()?;

    if success_expr.is_some() && failure_expr.is_some() {
        return Err(EngineError::ValidationError(
            "'success' and 'failure' are mutually exclusive".into(),
        ));
    }

    Ok(LeafTask {
        exec_type,
        hostname,
        command,
        arguments,
        timeout_secs,
        sleep_secs,
        retry_count,
        retry_delay_secs,
        success_expr,
        failure_expr,
    })
}

fn parallel_from_map(map: &HashMap<&str, &str>) -> Result<ParallelTask, EngineError> {
    let members = parse_id_list(required(map, "members")?)?;
    let max_parallel = parse_u64(map, "max_parallel", 4)? as usize;
    let rule_tag = map.get("rule").copied().unwrap_or("all");
    let rule = match rule_tag {
        "all" => GroupRule::All,
        "any" => GroupRule::Any,
        "majority" => GroupRule::Majority,
        other if other.starts_with("count:") => {
            let n: usize = other[6..].parse().map_err(|_| {
                EngineError::ParseError(format!("bad count rule: '{other}'"))
            })?;
            GroupRule::Count(n)
        }
        other => {
            return Err(EngineError::ParseError(format!(
                "unknown group rule '{other}'"
            )))
        }
    };
    let retry_failed = parse_bool(map, "retry_failed", false)?;

    Ok(ParallelTask {
        members,
        max_parallel,
        rule,
        retry_failed,
    })
}

fn conditional_from_map(map: &HashMap<&str, &str>) -> Result<ConditionalTask, EngineError> {
    let condition = Cond::parse(required(map, "condition")?)?;
    let if_true_tasks = map
        .get("if_true_tasks")
        .map(|s| parse_id_list(s))
        .transpose()?
        .unwrap_or_default();
    let if_false_tasks = map
        .get("if_false_tasks")
        .map(|s| parse_id_list(s))
        .transpose()?
        .unwrap_or_default();

    Ok(ConditionalTask {
        condition,
        if_true_tasks,
        if_false_tasks,
    })
}

fn loop_from_map(map: &HashMap<&str, &str>) -> Result<LoopTask, EngineError> {
    let tasks = parse_id_list(required(map, "tasks")?)?;
    let iterations = parse_u32(map, "loop", 1)?;
    let break_on_success = parse_bool(map, "break_on_success", false)?;
    let break_on_failure = parse_bool(map, "break_on_failure", false)?;

    Ok(LoopTask {
        tasks,
        iterations,
        break_on_success,
        break_on_failure,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_leaf_task() {
        let text = "task=1\nkind=leaf\ncommand=/bin/echo\narguments=hello world\n";
        let tasks = parse_task_text(text).unwrap();
        assert_eq!(tasks.len(), 1);
        match &tasks[0].kind {
            TaskKind::Leaf(l) => {
                assert_eq!(l.command, "/bin/echo");
                assert_eq!(l.arguments, vec!["hello", "world"]);
            }
            _ => panic!("expected leaf"),
        }
    }

    #[test]
    fn splits_on_blank_line() {
        let text = "task=1\ncommand=/bin/true\n\ntask=2\ncommand=/bin/false\n";
        let tasks = parse_task_text(text).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].id, 2);
    }

    #[test]
    fn splits_on_repeated_task_marker_without_blank_line() {
        let text = "task=1\ncommand=/bin/true\ntask=2\ncommand=/bin/false\n";
        let tasks = parse_task_text(text).unwrap();
        assert_eq!(tasks.len(), 2);
    }

    #[test]
    fn strips_comments() {
        let text = "# a comment\ntask=1\ncommand=/bin/true # trailing comment\n";
        let tasks = parse_task_text(text).unwrap();
        match &tasks[0].kind {
            TaskKind::Leaf(l) => assert_eq!(l.command, "/bin/true"),
            _ => panic!("expected leaf"),
        }
    }

    #[test]
    fn rejects_both_success_and_failure() {
        let text = "task=1\ncommand=/bin/true\nsuccess=exit_0\nfailure=exit_1\n";
        assert!(parse_task_text(text).is_err());
    }

    #[test]
    fn parses_parallel_task() {
        let text = "task=10\nkind=parallel\nmembers=1,2,3\nmax_parallel=2\nrule=majority\n";
        let tasks = parse_task_text(text).unwrap();
        match &tasks[0].kind {
            TaskKind::Parallel(p) => {
                assert_eq!(p.members, vec![1, 2, 3]);
                assert_eq!(p.max_parallel, 2);
                assert_eq!(p.rule, GroupRule::Majority);
            }
            _ => panic!("expected parallel"),
        }
    }
}
