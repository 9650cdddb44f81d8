use std::path::PathBuf;
use std::time::Duration;

/// Failure of a single sandboxed job.
///
/// Callers only ever see these three kinds. None of them are retried inside
/// the sandbox.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("sandbox violation: {0}")]
    Violation(#[from] Violation),
    #[error("sandbox timeout after {}s", .limit.as_secs())]
    Timeout { limit: Duration },
    #[error("execution failed: {0}")]
    Execution(String),
}

/// Security- or policy-relevant rejection.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Violation {
    #[error("malformed archive: {0}")]
    MalformedArchive(String),
    #[error("compression ratio {ratio:.1} exceeds limit {max_ratio:.1}")]
    CompressionRatio { ratio: f64, max_ratio: f64 },
    #[error("uncompressed size {size} bytes exceeds limit {max_size} bytes")]
    UncompressedSize { size: u64, max_size: u64 },
    #[error("invalid file name: {0:?}")]
    InvalidFileName(String),
    #[error("memory limit of {limit_mb} MiB exceeded: {diagnostic}")]
    MemoryLimit { limit_mb: u64, diagnostic: String },
    #[error("security/mount error: {0}")]
    Mount(String),
}

/// Error raised while constructing a backend.
///
/// These are configuration problems of the host, not of a job, and surface
/// before any job runs.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error(
        "isolation helper '{helper}' not found on PATH. Install it (e.g. the bubblewrap package) \
         or disable isolation to use the passthrough backend"
    )]
    HelperNotFound { helper: String },
    #[error(
        "sandbox isolation is not supported on '{os}'. Disable isolation explicitly \
         (sandbox.isolation: false) or run inside a Linux environment"
    )]
    UnsupportedPlatform { os: String },
    #[error("interpreter package directory is not a directory: {0}")]
    InvalidPackageDir(PathBuf),
}

impl SandboxError {
    pub(crate) fn io(context: &str, err: std::io::Error) -> Self {
        SandboxError::Execution(format!("{context}: {err}"))
    }

    /// Message suitable for end users: no host paths, no command lines.
    pub fn user_message(&self) -> &'static str {
        match self {
            SandboxError::Violation(
                Violation::MalformedArchive(_)
                | Violation::CompressionRatio { .. }
                | Violation::UncompressedSize { .. },
            ) => "file too large or corrupt",
            SandboxError::Violation(Violation::InvalidFileName(_)) => "invalid file name",
            SandboxError::Violation(Violation::MemoryLimit { .. }) => {
                "script exceeded memory limit"
            }
            SandboxError::Violation(Violation::Mount(_)) => "script was blocked by the sandbox",
            SandboxError::Timeout { .. } => "script exceeded time limit",
            SandboxError::Execution(_) => "script crashed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    // === SandboxError ===

    #[rstest]
    #[case::timeout(
        SandboxError::Timeout { limit: Duration::from_secs(30) },
        "sandbox timeout after 30s"
    )]
    #[case::execution(
        SandboxError::Execution("Traceback (most recent call last)".to_string()),
        "execution failed: Traceback (most recent call last)"
    )]
    #[case::violation(
        SandboxError::Violation(Violation::Mount("bwrap: Can't mount proc".to_string())),
        "sandbox violation: security/mount error: bwrap: Can't mount proc"
    )]
    fn sandbox_error_display(#[case] error: SandboxError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    #[case::ratio(
        Violation::CompressionRatio { ratio: 10000.0, max_ratio: 50.0 },
        "compression ratio 10000.0 exceeds limit 50.0"
    )]
    #[case::size(
        Violation::UncompressedSize { size: 200, max_size: 100 },
        "uncompressed size 200 bytes exceeds limit 100 bytes"
    )]
    #[case::memory(
        Violation::MemoryLimit { limit_mb: 64, diagnostic: "exit code 137".to_string() },
        "memory limit of 64 MiB exceeded: exit code 137"
    )]
    #[case::file_name(
        Violation::InvalidFileName("../etc/passwd".to_string()),
        "invalid file name: \"../etc/passwd\""
    )]
    fn violation_display(#[case] violation: Violation, #[case] expected: &str) {
        assert_eq!(violation.to_string(), expected);
    }

    #[test]
    fn violation_converts_into_sandbox_error() {
        let err: SandboxError = Violation::MalformedArchive("bad header".to_string()).into();
        assert!(matches!(
            err,
            SandboxError::Violation(Violation::MalformedArchive(_))
        ));
    }

    #[test]
    fn io_error_becomes_execution_failure() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = SandboxError::io("failed to write input", io_err);
        assert_eq!(
            err.to_string(),
            "execution failed: failed to write input: denied"
        );
    }

    // === user_message ===

    #[rstest]
    #[case::archive(
        SandboxError::Violation(Violation::UncompressedSize { size: 2, max_size: 1 }),
        "file too large or corrupt"
    )]
    #[case::timeout(SandboxError::Timeout { limit: Duration::from_secs(1) }, "script exceeded time limit")]
    #[case::crash(SandboxError::Execution("/srv/app/secret.py line 3".to_string()), "script crashed")]
    fn user_message_hides_diagnostics(#[case] error: SandboxError, #[case] expected: &str) {
        let message = error.user_message();
        assert_eq!(message, expected);
        assert!(!message.contains('/'));
    }

    // === BackendError ===

    #[test]
    fn unsupported_platform_names_both_remedies() {
        let err = BackendError::UnsupportedPlatform {
            os: "windows".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("'windows'"));
        assert!(message.contains("Disable isolation"));
        assert!(message.contains("Linux environment"));
    }

    #[test]
    fn helper_not_found_mentions_passthrough() {
        let err = BackendError::HelperNotFound {
            helper: "bwrap".to_string(),
        };
        assert!(err.to_string().contains("passthrough backend"));
    }

    // === anyhow integration ===

    #[test]
    fn sandbox_error_into_anyhow() {
        let error = SandboxError::Execution("boom".to_string());
        let anyhow_err: anyhow::Error = error.into();
        assert_eq!(anyhow_err.to_string(), "execution failed: boom");
    }
}
