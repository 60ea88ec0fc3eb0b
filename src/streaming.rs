//! Streaming Output Handler (§2.5 / §5): buffers captured stdout/stderr,
//! spilling to an anonymous temp file once the buffer crosses a threshold.
//! Spill files carry a stable prefix so they're recognizable if a hard
//! crash (not a normal unwind) leaves one behind, and are owned by the
//! `TaskResult` via `Arc<NamedTempFile>` so they're removed on every normal
//! exit path once nothing references them anymore.

use crate::model::OutputCapture;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Output at or below this size stays inline; anything larger spills.
pub const SPILL_THRESHOLD_BYTES: usize = 1024 * 1024;

pub const SPILL_FILE_PREFIX: &str = "tasker-spill-";

pub fn capture(bytes: &[u8]) -> std::io::Result<OutputCapture> {
    if bytes.len() <= SPILL_THRESHOLD_BYTES {
        Ok(OutputCapture::Inline(String::from_utf8_lossy(bytes).into_owned()))
    } else {
        let mut file = tempfile::Builder::new()
            .prefix(SPILL_FILE_PREFIX)
            .tempfile()?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(OutputCapture::Spilled(Arc::new(file)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_inline_at_threshold() {
        let bytes = vec![b'a'; SPILL_THRESHOLD_BYTES];
        let cap = capture(&bytes).unwrap();
        assert!(matches!(cap, OutputCapture::Inline(_)));
    }

    #[test]
    fn spills_above_threshold() {
        let bytes = vec![b'a'; SPILL_THRESHOLD_BYTES + 1];
        let cap = capture(&bytes).unwrap();
        assert!(matches!(cap, OutputCapture::Spilled(_)));
        assert_eq!(cap.read().unwrap().len(), SPILL_THRESHOLD_BYTES + 1);
    }

    #[test]
    fn spilled_file_removed_on_drop() {
        let bytes = vec![b'a'; SPILL_THRESHOLD_BYTES + 1];
        let cap = capture(&bytes).unwrap();
        let path = cap.spill_path().unwrap().to_path_buf();
        assert!(path.exists());
        drop(cap);
        assert!(!path.exists());
    }
}
