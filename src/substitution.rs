//! Variable substitution (§4.1). Two pattern classes, each substituted in a
//! single pass: task-result references first, then global references.
//! Patterns are precompiled once (`once_cell::Lazy`) — recompiling a regex
//! per call is explicitly forbidden by the spec.

use crate::error::EngineError;
use crate::globals::GlobalVars;
use crate::model::TaskId;
use crate::result_store::ResultStore;
use once_cell::sync::Lazy;
use regex::Regex;

static TASK_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@(\d+)_(stdout|stderr|success)@").unwrap());
static GLOBAL_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@([A-Za-z_][A-Za-z0-9_]*)@").unwrap());

/// Substitute all `@<k>_stdout@` / `@<k>_stderr@` / `@<k>_success@` and
/// `@<name>@` references in `text`. `task_id` identifies the task whose
/// field is being substituted, purely for error attribution.
pub fn substitute(
    text: &str,
    task_id: TaskId,
    store: &ResultStore,
    globals: &GlobalVars,
) -> Result<String, EngineError> {
    let after_task_refs = substitute_task_refs(text, task_id, store)?;
    substitute_global_refs(&after_task_refs, task_id, globals)
}

fn substitute_task_refs(
    text: &str,
    task_id: TaskId,
    store: &ResultStore,
) -> Result<String, EngineError> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in TASK_REF.captures_iter(text) {
        let whole = caps.get(0).unwrap();
        out.push_str(&text[last..whole.start()]);
        last = whole.end();

        let referenced_id: TaskId = caps[1].parse().map_err(|_| EngineError::UnresolvedReference {
            task_id,
            reference: whole.as_str().to_string(),
        })?;
        let field = &caps[2];

        let Some(result) = store.get(referenced_id) else {
            return Err(EngineError::UnresolvedReference {
                task_id,
                reference: whole.as_str().to_string(),
            });
        };

        let rendered = match field {
            "stdout" => result.stdout_string().trim().to_string(),
            "stderr" => result.stderr_string().trim().to_string(),
            "success" => result.success.to_string(),
            _ => unreachable!("regex only captures known field names"),
        };
        out.push_str(&rendered);
    }
    out.push_str(&text[last..]);
    Ok(out)
}

fn substitute_global_refs(
    text: &str,
    task_id: TaskId,
    globals: &GlobalVars,
) -> Result<String, EngineError> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in GLOBAL_REF.captures_iter(text) {
        let whole = caps.get(0).unwrap();
        out.push_str(&text[last..whole.start()]);
        last = whole.end();

        let name = &caps[1];
        match globals.resolve(name)? {
            Some(value) => out.push_str(&value),
            None => {
                return Err(EngineError::UnresolvedReference {
                    task_id,
                    reference: whole.as_str().to_string(),
                })
            }
        }
    }
    out.push_str(&text[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OutputCapture, TaskResult};
    use chrono::Utc;
    use std::collections::HashMap;

    fn sample_result(id: TaskId, stdout: &str, success: bool) -> TaskResult {
        let now = Utc::now();
        TaskResult {
            task_id: id,
            exit_code: if success { 0 } else { 1 },
            stdout: OutputCapture::Inline(stdout.to_string()),
            stderr: OutputCapture::Inline(String::new()),
            success,
            started_at: now,
            finished_at: now,
            attempts: 1,
            skipped: false,
            error_kind: None,
        }
    }

    #[test]
    fn substitutes_task_and_global_refs() {
        let store = ResultStore::new();
        store.insert(sample_result(1, "hello", true)).unwrap();
        let mut raw = HashMap::new();
        raw.insert("GREETING".to_string(), "world".to_string());
        let globals = GlobalVars::from_raw(raw).unwrap();

        let out = substitute("@1_stdout@ @GREETING@ @1_success@", 2, &store, &globals).unwrap();
        assert_eq!(out, "hello world true");
    }

    #[test]
    fn unresolved_task_ref_errors() {
        let store = ResultStore::new();
        let globals = GlobalVars::from_raw(HashMap::new()).unwrap();
        let err = substitute("@9_stdout@", 1, &store, &globals).unwrap_err();
        assert!(matches!(err, EngineError::UnresolvedReference { .. }));
    }

    #[test]
    fn idempotent_on_plain_text() {
        let store = ResultStore::new();
        let globals = GlobalVars::from_raw(HashMap::new()).unwrap();
        let text = "just a plain string with no markers";
        let out1 = substitute(text, 1, &store, &globals).unwrap();
        let out2 = substitute(&out1, 1, &store, &globals).unwrap();
        assert_eq!(out1, out2);
        assert_eq!(out1, text);
    }
}
