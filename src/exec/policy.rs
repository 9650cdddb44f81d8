use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MEMORY_LIMIT_MB: u64 = 512;
pub const DEFAULT_TIME_LIMIT_SECONDS: u64 = 30;
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Resource and confinement limits for one sandboxed job.
///
/// Built once per job and never mutated afterwards; the `with_*` methods
/// return a new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxPolicy {
    /// Ceiling on the child's address space, in MiB.
    pub memory_limit_mb: u64,
    /// Wall-clock ceiling for the whole job.
    pub time_limit_seconds: u64,
    /// Whether the child shares the host network namespace.
    pub allow_network: bool,
    /// Extra host paths mounted read-only, in order.
    pub allowed_paths: Vec<PathBuf>,
    /// Cap on captured stdout/stderr returned to the caller.
    pub max_output_bytes: usize,
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            memory_limit_mb: DEFAULT_MEMORY_LIMIT_MB,
            time_limit_seconds: DEFAULT_TIME_LIMIT_SECONDS,
            allow_network: false,
            allowed_paths: Vec::new(),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl SandboxPolicy {
    pub fn with_memory_limit_mb(self, memory_limit_mb: u64) -> Self {
        Self {
            memory_limit_mb,
            ..self
        }
    }

    pub fn with_time_limit_seconds(self, time_limit_seconds: u64) -> Self {
        Self {
            time_limit_seconds,
            ..self
        }
    }

    pub fn with_network(self, allow_network: bool) -> Self {
        Self {
            allow_network,
            ..self
        }
    }

    pub fn with_allowed_paths(self, allowed_paths: Vec<PathBuf>) -> Self {
        Self {
            allowed_paths,
            ..self
        }
    }

    pub fn with_max_output_bytes(self, max_output_bytes: usize) -> Self {
        Self {
            max_output_bytes,
            ..self
        }
    }

    pub fn time_limit(&self) -> Duration {
        Duration::from_secs(self.time_limit_seconds)
    }

    /// Address-space ceiling in bytes, as handed to the resource limiter.
    pub fn memory_limit_bytes(&self) -> u64 {
        self.memory_limit_mb.saturating_mul(1024 * 1024)
    }
}
