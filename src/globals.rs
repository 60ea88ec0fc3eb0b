//! Global variable environment (§2.2 / §3). Frozen after workflow start;
//! values may reference other globals via `@name@`, resolved lazily at
//! substitution time, but a cycle among globals is rejected up front.

use crate::error::EngineError;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const MAX_RESOLUTION_DEPTH: usize = 32;

#[derive(Debug, Clone)]
pub struct GlobalVars(Arc<HashMap<String, String>>);

impl GlobalVars {
    /// Build from a raw key/value map, rejecting cyclic `@name@` references
    /// among the values themselves (validation-time error per §3).
    pub fn from_raw(raw: HashMap<String, String>) -> Result<Self, EngineError> {
        detect_cycles(&raw)?;
        Ok(GlobalVars(Arc::new(raw)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Resolve a global by name, recursively substituting any `@other@`
    /// references found in its value. Cycles were already ruled out at
    /// construction time; the depth cap is a defensive backstop.
    pub fn resolve(&self, name: &str) -> Result<Option<String>, EngineError> {
        self.resolve_inner(name, 0)
    }

    fn resolve_inner(&self, name: &str, depth: usize) -> Result<Option<String>, EngineError> {
        let Some(raw) = self.0.get(name) else {
            return Ok(None);
        };
        if depth >= MAX_RESOLUTION_DEPTH {
            return Err(EngineError::ValidationError(format!(
                "global '{name}' exceeds max resolution depth (possible cycle)"
            )));
        }
        let mut out = String::with_capacity(raw.len());
        let mut rest = raw.as_str();
        while let Some(at) = rest.find('@') {
            out.push_str(&rest[..at]);
            let after = &rest[at + 1..];
            if let Some(end) = after.find('@') {
                let candidate = &after[..end];
                if is_ident(candidate) {
                    match self.resolve_inner(candidate, depth + 1)? {
                        Some(resolved) => {
                            out.push_str(&resolved);
                            rest = &after[end + 1..];
                            continue;
                        }
                        None => {
                            // Not a known global; leave the literal text alone.
                            out.push('@');
                            out.push_str(candidate);
                            out.push('@');
                            rest = &after[end + 1..];
                            continue;
                        }
                    }
                }
            }
            out.push('@');
            rest = after;
        }
        out.push_str(rest);
        Ok(Some(out))
    }
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn detect_cycles(raw: &HashMap<String, String>) -> Result<(), EngineError> {
    let mut visiting: HashSet<String> = HashSet::new();
    let mut done: HashSet<String> = HashSet::new();

    fn refs_of(value: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut rest = value;
        while let Some(at) = rest.find('@') {
            let after = &rest[at + 1..];
            if let Some(end) = after.find('@') {
                let candidate = &after[..end];
                if is_ident(candidate) {
                    out.push(candidate.to_string());
                }
                rest = &after[end + 1..];
            } else {
                break;
            }
        }
        out
    }

    fn visit(
        name: &str,
        raw: &HashMap<String, String>,
        visiting: &mut HashSet<String>,
        done: &mut HashSet<String>,
    ) -> Result<(), EngineError> {
        if done.contains(name) {
            return Ok(());
        }
        if visiting.contains(name) {
            return Err(EngineError::ValidationError(format!(
                "cycle detected among global variables at '{name}'"
            )));
        }
        visiting.insert(name.to_string());
        if let Some(value) = raw.get(name) {
            for dep in refs_of(value) {
                if raw.contains_key(&dep) {
                    visit(&dep, raw, visiting, done)?;
                }
            }
        }
        visiting.remove(name);
        done.insert(name.to_string());
        Ok(())
    }

    for name in raw.keys() {
        visit(name, raw, &mut visiting, &mut done)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_nested_reference() {
        let mut raw = HashMap::new();
        raw.insert("a".to_string(), "hello @b@".to_string());
        raw.insert("b".to_string(), "world".to_string());
        let g = GlobalVars::from_raw(raw).unwrap();
        assert_eq!(g.resolve("a").unwrap().unwrap(), "hello world");
    }

    #[test]
    fn rejects_cycle() {
        let mut raw = HashMap::new();
        raw.insert("a".to_string(), "@b@".to_string());
        raw.insert("b".to_string(), "@a@".to_string());
        assert!(GlobalVars::from_raw(raw).is_err());
    }

    #[test]
    fn unknown_reference_left_literal() {
        let mut raw = HashMap::new();
        raw.insert("a".to_string(), "value @nope@ end".to_string());
        let g = GlobalVars::from_raw(raw).unwrap();
        assert_eq!(g.resolve("a").unwrap().unwrap(), "value @nope@ end");
    }
}
