//! Environment bootstrap (§6) — out of scope in detail, but the two
//! environment variables the engine consumes live here so the rest of the
//! crate doesn't reach into `std::env` directly.

use std::env;

/// `TASKER_PARALLEL_INSTANCES`: peer-instance count, used to divide the
/// parallel executor's pool cap (§5 "Thread pool capping").
pub fn parallel_instances() -> usize {
    env::var("TASKER_PARALLEL_INSTANCES")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|&n: &usize| n > 0)
        .unwrap_or(1)
}

/// `TASKER_NESTED_LEVEL`: advisory nesting depth, surfaced only in logs.
pub fn nested_level() -> u32 {
    env::var("TASKER_NESTED_LEVEL")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env() {
        // Intentionally does not set/unset process env (shared across test
        // threads); just asserts the parse falls back sanely when absent.
        if env::var("TASKER_PARALLEL_INSTANCES").is_err() {
            assert_eq!(parallel_instances(), 1);
        }
        if env::var("TASKER_NESTED_LEVEL").is_err() {
            assert_eq!(nested_level(), 0);
        }
    }
}
