//! Transport Driver abstraction (§2.4 / §6). The engine never builds shell
//! strings; it hands a driver an argv and gets back exit code, stdout,
//! stderr. Only the abstract contract is in scope per the spec — `local`
//! is a real implementation, `remote-a`/`remote-b` are illustrative
//! remote-shell wrappers satisfying the same trait.

mod local;
mod remote;

pub use local::LocalDriver;
pub use remote::RemoteDriver;

use crate::error::EngineError;
use crate::model::TaskId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a single transport invocation.
#[derive(Debug, Clone)]
pub struct TransportOutcome {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
}

#[async_trait]
pub trait TransportDriver: Send + Sync {
    /// Run `command` with `arguments` against `hostname` (ignored by local
    /// transports), bounded by `timeout`. Must terminate the full
    /// subprocess tree on timeout and still return whatever output had
    /// already been produced.
    async fn run(
        &self,
        task_id: TaskId,
        hostname: Option<&str>,
        command: &str,
        arguments: &[String],
        timeout: Duration,
    ) -> Result<TransportOutcome, EngineError>;
}

/// Maps an `exec_type` tag to the driver that handles it (§2.4).
#[derive(Clone)]
pub struct TransportRegistry {
    drivers: HashMap<String, Arc<dyn TransportDriver>>,
}

impl TransportRegistry {
    /// The default registry: `local` plus two illustrative remote-shell
    /// wrappers distinguished only by the wrapper binary they invoke.
    pub fn with_defaults() -> Self {
        let mut drivers: HashMap<String, Arc<dyn TransportDriver>> = HashMap::new();
        drivers.insert("local".to_string(), Arc::new(LocalDriver::new()));
        drivers.insert(
            "remote-a".to_string(),
            Arc::new(RemoteDriver::new("ssh")),
        );
        drivers.insert(
            "remote-b".to_string(),
            Arc::new(RemoteDriver::new("rsh")),
        );
        Self { drivers }
    }

    pub fn register(&mut self, exec_type: impl Into<String>, driver: Arc<dyn TransportDriver>) {
        self.drivers.insert(exec_type.into(), driver);
    }

    pub fn get(&self, exec_type: &str) -> Option<Arc<dyn TransportDriver>> {
        self.drivers.get(exec_type).cloned()
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
