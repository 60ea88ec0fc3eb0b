//! Condition grammar (§4.1): a small pre-parsed AST instead of a
//! regex-matched string, per the "Dynamic expression evaluation → a parsed
//! AST" redesign note. Parsing happens once, at validation time; evaluation
//! walks the tree and is short-circuit, left-to-right.

use crate::error::EngineError;
use crate::globals::GlobalVars;
use crate::model::TaskId;
use crate::result_store::ResultStore;
use crate::substitution;
use once_cell::sync::Lazy;
use regex::Regex;

static EXIT_ATOM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^exit_(-?\d+)$").unwrap());
static EXPR_ATOM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(@[^@]+@)(=|!=|~)(.*)$").unwrap());
static TASK_REF_IN_EXPR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^@(\d+)_(?:stdout|stderr|success)@$").unwrap());

/// A single atom of the condition grammar.
#[derive(Debug, Clone)]
pub enum Atom {
    ExitCode(i32),
    Eq { expr: String, literal: String },
    Ne { expr: String, literal: String },
    Match { expr: String, pattern: Regex },
    True,
    False,
}

impl Atom {
    fn parse(text: &str) -> Result<Atom, EngineError> {
        let text = text.trim();
        if text == "true" {
            return Ok(Atom::True);
        }
        if text == "false" {
            return Ok(Atom::False);
        }
        if let Some(caps) = EXIT_ATOM.captures(text) {
            let n: i32 = caps[1]
                .parse()
                .map_err(|_| EngineError::ValidationError(format!("bad exit code atom: {text}")))?;
            return Ok(Atom::ExitCode(n));
        }
        if let Some(caps) = EXPR_ATOM.captures(text) {
            let expr = caps[1].to_string();
            let op = &caps[2];
            let rhs = caps[3].to_string();
            return match op {
                "=" => Ok(Atom::Eq { expr, literal: rhs }),
                "!=" => Ok(Atom::Ne { expr, literal: rhs }),
                "~" => {
                    let pattern = Regex::new(&rhs).map_err(|e| {
                        EngineError::ValidationError(format!("bad regex in condition '{text}': {e}"))
                    })?;
                    Ok(Atom::Match { expr, pattern })
                }
                _ => unreachable!(),
            };
        }
        Err(EngineError::ValidationError(format!(
            "unrecognized condition atom: '{text}'"
        )))
    }

    fn evaluate(
        &self,
        current_exit_code: Option<i32>,
        task_id: TaskId,
        store: &ResultStore,
        globals: &GlobalVars,
    ) -> Result<bool, EngineError> {
        match self {
            Atom::True => Ok(true),
            Atom::False => Ok(false),
            Atom::ExitCode(n) => Ok(current_exit_code == Some(*n)),
            Atom::Eq { expr, literal } => {
                let resolved = substitution::substitute(expr, task_id, store, globals)?;
                Ok(resolved == *literal)
            }
            Atom::Ne { expr, literal } => {
                let resolved = substitution::substitute(expr, task_id, store, globals)?;
                Ok(resolved != *literal)
            }
            Atom::Match { expr, pattern } => {
                let resolved = substitution::substitute(expr, task_id, store, globals)?;
                Ok(pattern.is_match(&resolved))
            }
        }
    }

    /// The task id referenced by this atom's `@k_*@` expression, if any
    /// (§4.3: parallel members must not reference siblings in `success=`/
    /// `failure=` any more than in `command=`/`arguments=`).
    fn referenced_task_id(&self) -> Option<TaskId> {
        let expr = match self {
            Atom::Eq { expr, .. } | Atom::Ne { expr, .. } | Atom::Match { expr, .. } => expr,
            Atom::ExitCode(_) | Atom::True | Atom::False => return None,
        };
        TASK_REF_IN_EXPR
            .captures(expr)
            .and_then(|c| c[1].parse().ok())
    }
}

/// A parsed condition: either a pure AND-chain or a pure OR-chain of atoms.
/// Parentheses and mixed `|`/`&` are not supported at this level (§4.1).
#[derive(Debug, Clone)]
pub enum Cond {
    Atom(Atom),
    And(Vec<Atom>),
    Or(Vec<Atom>),
}

impl Cond {
    pub fn parse(text: &str) -> Result<Cond, EngineError> {
        let text = text.trim();
        let has_and = text.contains('&');
        let has_or = text.contains('|');
        if has_and && has_or {
            return Err(EngineError::ValidationError(format!(
                "condition '{text}' mixes '|' and '&'; not supported"
            )));
        }
        if has_or {
            let atoms = text
                .split('|')
                .map(Atom::parse)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Cond::Or(atoms));
        }
        if has_and {
            let atoms = text
                .split('&')
                .map(Atom::parse)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Cond::And(atoms));
        }
        Ok(Cond::Atom(Atom::parse(text)?))
    }

    /// Evaluate short-circuit, left-to-right, against the current task's
    /// exit code (for `success=`/`failure=` use) and the shared store.
    pub fn evaluate(
        &self,
        current_exit_code: Option<i32>,
        task_id: TaskId,
        store: &ResultStore,
        globals: &GlobalVars,
    ) -> Result<bool, EngineError> {
        match self {
            Cond::Atom(a) => a.evaluate(current_exit_code, task_id, store, globals),
            Cond::And(atoms) => {
                for a in atoms {
                    if !a.evaluate(current_exit_code, task_id, store, globals)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Cond::Or(atoms) => {
                for a in atoms {
                    if a.evaluate(current_exit_code, task_id, store, globals)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    /// All task ids this condition's atoms reference via `@k_*@`
    /// expressions, used by the validator to reject intra-group references
    /// in `success=`/`failure=` the same way it already does for
    /// `command=`/`arguments=` (§4.3).
    pub fn referenced_task_ids(&self) -> Vec<TaskId> {
        match self {
            Cond::Atom(a) => a.referenced_task_id().into_iter().collect(),
            Cond::And(atoms) | Cond::Or(atoms) => {
                atoms.iter().filter_map(Atom::referenced_task_id).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_true_false() {
        assert!(matches!(Cond::parse("true").unwrap(), Cond::Atom(Atom::True)));
        assert!(matches!(Cond::parse("false").unwrap(), Cond::Atom(Atom::False)));
    }

    #[test]
    fn parses_exit_atom() {
        match Cond::parse("exit_0").unwrap() {
            Cond::Atom(Atom::ExitCode(0)) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn rejects_mixed_combinators() {
        assert!(Cond::parse("exit_0|exit_1&true").is_err());
    }

    #[test]
    fn or_chain_short_circuits() {
        let store = ResultStore::new();
        let globals = GlobalVars::from_raw(Default::default()).unwrap();
        let cond = Cond::parse("exit_1|exit_2|exit_0").unwrap();
        assert!(cond.evaluate(Some(0), 1, &store, &globals).unwrap());
    }

    #[test]
    fn and_chain_fails_fast() {
        let store = ResultStore::new();
        let globals = GlobalVars::from_raw(Default::default()).unwrap();
        let cond = Cond::parse("exit_0&exit_1").unwrap();
        assert!(!cond.evaluate(Some(0), 1, &store, &globals).unwrap());
    }

    #[test]
    fn referenced_task_ids_finds_sibling_reference() {
        let cond = Cond::parse("@1_success@=true").unwrap();
        assert_eq!(cond.referenced_task_ids(), vec![1]);
    }

    #[test]
    fn referenced_task_ids_empty_for_exit_and_literal_atoms() {
        let cond = Cond::parse("exit_0|exit_1").unwrap();
        assert!(cond.referenced_task_ids().is_empty());
    }
}
