//! Failure classification for isolated jobs.
//!
//! The exit code is the primary signal: a workload killed with SIGKILL under
//! an address-space limit reports 128 + 9. Matching stderr text is a
//! best-effort secondary signal only. Interpreters and helper versions word
//! their diagnostics differently and the text is locale-dependent, so a miss
//! falls through to a generic execution failure rather than a wrong verdict.

use super::error::{SandboxError, Violation};
use super::process::Captured;

/// 128 + SIGKILL, what the kernel OOM killer leaves behind.
pub const OOM_KILL_EXIT_CODE: i32 = 137;

const MEMORY_PATTERNS: &[&str] = &[
    "MemoryError",
    "Cannot allocate memory",
    "out of memory",
    "std::bad_alloc",
];

const MOUNT_PATTERNS: &[&str] = &[
    "bwrap:",
    "Can't mount",
    "Can't bind mount",
    "Operation not permitted",
    "Permission denied",
    "No permissions to creating new namespace",
    "setting up uid map",
];

/// Classify a non-zero exit of an isolated job.
///
/// Returns `None` when the job succeeded.
pub fn classify_failure(captured: &Captured, memory_limit_mb: u64) -> Option<SandboxError> {
    if captured.success() {
        return None;
    }

    let stderr = captured.stderr.trim();

    if captured.exit_code == OOM_KILL_EXIT_CODE || contains_any(stderr, MEMORY_PATTERNS) {
        return Some(
            Violation::MemoryLimit {
                limit_mb: memory_limit_mb,
                diagnostic: format!("exit code {}: {}", captured.exit_code, stderr),
            }
            .into(),
        );
    }

    if contains_any(stderr, MOUNT_PATTERNS) {
        return Some(Violation::Mount(stderr.to_string()).into());
    }

    Some(SandboxError::Execution(generic_diagnostic(captured)))
}

/// Diagnostic for an unclassified non-zero exit: raw stderr, or the exit
/// code when the child printed nothing.
pub fn generic_diagnostic(captured: &Captured) -> String {
    let stderr = captured.stderr.trim();
    if stderr.is_empty() {
        format!("process exited with code {}", captured.exit_code)
    } else {
        stderr.to_string()
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}
