use std::path::PathBuf;

use tracing::{info, warn};

use super::Backend;
use super::bwrap::{
    BubblewrapProvider, HelperSettings, IsolationProvider, JobMounts, SANDBOX_SCRIPT_DIR,
    SANDBOX_WORK_DIR,
};
use super::classify::classify_failure;
use super::error::{BackendError, SandboxError};
use super::interpreter::Interpreter;
use super::output::read_script_output;
use super::policy::SandboxPolicy;
use super::process::{Captured, Completion, JobCommand, run_with_timeout};
use super::request::{InlineRequest, ScriptOutput, ScriptRequest};
use super::scratch::ScratchDir;

/// Production executor.
///
/// Every job runs under the resource limiter and the namespace-isolation
/// helper with a read-only view of the host, one writable scratch directory,
/// and no network unless the policy allows it.
pub struct LinuxIsolationBackend {
    policy: SandboxPolicy,
    interpreter: Interpreter,
    provider: Box<dyn IsolationProvider>,
    scratch_root: Option<PathBuf>,
}

impl LinuxIsolationBackend {
    /// Locate the helpers now; a missing helper fails here, not at the first
    /// job.
    pub fn new(
        policy: SandboxPolicy,
        interpreter: Interpreter,
        helpers: &HelperSettings,
    ) -> Result<Self, BackendError> {
        let provider = BubblewrapProvider::locate(helpers)?;
        Ok(Self::with_provider(policy, interpreter, Box::new(provider)))
    }

    pub fn with_provider(
        policy: SandboxPolicy,
        interpreter: Interpreter,
        provider: Box<dyn IsolationProvider>,
    ) -> Self {
        Self {
            policy,
            interpreter,
            provider,
            scratch_root: None,
        }
    }

    /// Create scratch directories under `root` instead of the OS temp dir.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    fn execute(
        &self,
        command: &[String],
        mounts: &JobMounts<'_>,
        scratch: &ScratchDir,
    ) -> Result<Captured, SandboxError> {
        let job = JobCommand {
            argv: self.provider.wrap(&self.policy, mounts, command),
            cwd: scratch.work_dir().to_path_buf(),
            env: vec![],
        };

        let captured = match run_with_timeout(
            &job,
            scratch,
            self.policy.time_limit(),
            self.policy.max_output_bytes,
        )? {
            Completion::TimedOut => {
                return Err(SandboxError::Timeout {
                    limit: self.policy.time_limit(),
                });
            }
            Completion::Exited(captured) => captured,
        };

        if let Some(err) = classify_failure(&captured, self.policy.memory_limit_mb) {
            warn!(
                backend = self.name(),
                exit_code = captured.exit_code,
                error = %err,
                "isolated job failed"
            );
            return Err(err);
        }
        Ok(captured)
    }
}

fn in_sandbox(dir: &str, name: &str) -> String {
    format!("{dir}/{name}")
}

impl Backend for LinuxIsolationBackend {
    fn name(&self) -> &'static str {
        "linux-isolation"
    }

    fn policy(&self) -> &SandboxPolicy {
        &self.policy
    }

    fn run(&self, request: &InlineRequest) -> Result<String, SandboxError> {
        let input_name = request.input_name()?;
        let scratch = ScratchDir::create(self.scratch_root.as_deref())?;

        let input = match &request.input_bytes {
            Some(bytes) => {
                scratch.materialize(input_name, Some(bytes.as_slice()))?;
                Some(in_sandbox(SANDBOX_WORK_DIR, input_name))
            }
            None => None,
        };

        info!(
            backend = self.name(),
            memory_limit_mb = self.policy.memory_limit_mb,
            allow_network = self.policy.allow_network,
            "running inline job"
        );
        let command =
            self.interpreter
                .inline_command(&request.code, input.as_deref(), &request.extra_args);
        let mounts = JobMounts {
            work_dir: scratch.work_dir(),
            script_dir: None,
        };
        self.execute(&command, &mounts, &scratch)
            .map(|captured| captured.merged())
    }

    fn run_python(&self, request: &ScriptRequest) -> Result<ScriptOutput, SandboxError> {
        let (input_name, output_name) = request.file_names()?;
        let (_, script_dir, script_name) = request.resolve_script()?;
        let scratch = ScratchDir::create(self.scratch_root.as_deref())?;

        scratch.materialize(input_name, request.input_bytes.as_deref())?;

        info!(
            backend = self.name(),
            script = %script_name,
            memory_limit_mb = self.policy.memory_limit_mb,
            allow_network = self.policy.allow_network,
            "running script job"
        );
        let command = self.interpreter.script_command(
            &in_sandbox(SANDBOX_SCRIPT_DIR, &script_name),
            &in_sandbox(SANDBOX_WORK_DIR, input_name),
            &in_sandbox(SANDBOX_WORK_DIR, output_name),
            &request.extra_args,
        );
        let mounts = JobMounts {
            work_dir: scratch.work_dir(),
            script_dir: Some(&script_dir),
        };
        self.execute(&command, &mounts, &scratch)?;
        read_script_output(&scratch.work_dir().join(output_name), request.binary_output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::error::Violation;
    use rstest::rstest;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Records the job it was asked to confine and replaces it with a fixed
    /// shell snippet.
    struct ScriptedProvider {
        snippet: &'static str,
        seen: Arc<Mutex<Vec<Vec<String>>>>,
    }

    impl IsolationProvider for ScriptedProvider {
        fn wrap(
            &self,
            _policy: &SandboxPolicy,
            _mounts: &JobMounts<'_>,
            command: &[String],
        ) -> Vec<String> {
            self.seen.lock().unwrap().push(command.to_vec());
            vec!["sh".into(), "-c".into(), self.snippet.into()]
        }
    }

    struct Harness {
        backend: LinuxIsolationBackend,
        seen: Arc<Mutex<Vec<Vec<String>>>>,
        scratch_root: TempDir,
    }

    impl Harness {
        fn command(&self, index: usize) -> Vec<String> {
            self.seen.lock().unwrap()[index].clone()
        }

        fn leftover_scratch_dirs(&self) -> usize {
            std::fs::read_dir(self.scratch_root.path()).unwrap().count()
        }
    }

    fn harness(snippet: &'static str) -> Harness {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let provider = ScriptedProvider {
            snippet,
            seen: Arc::clone(&seen),
        };
        let scratch_root = TempDir::new().unwrap();
        let backend = LinuxIsolationBackend::with_provider(
            SandboxPolicy::default()
                .with_memory_limit_mb(64)
                .with_time_limit_seconds(5),
            Interpreter::default(),
            Box::new(provider),
        )
        .with_scratch_root(scratch_root.path());
        Harness {
            backend,
            seen,
            scratch_root,
        }
    }

    #[test]
    fn inline_paths_are_rewritten_to_sandbox_mounts() {
        let h = harness("echo ok");
        let request = InlineRequest::new("print('ok')")
            .with_input(b"x".to_vec(), Some("controls.xlsx".to_string()))
            .with_args(["--year", "2024"]);
        assert_eq!(h.backend.run(&request).unwrap(), "ok\n");
        assert_eq!(
            h.command(0),
            [
                "python3",
                "-c",
                "print('ok')",
                "/work/controls.xlsx",
                "--year",
                "2024"
            ]
        );
        assert_eq!(h.leftover_scratch_dirs(), 0);
    }

    #[test]
    fn script_paths_are_rewritten_to_sandbox_mounts() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("import_vendors.py");
        std::fs::write(&script, "").unwrap();
        let h = harness("exit 0");
        let request = ScriptRequest::new(&script).with_output_filename("result.json");

        // The snippet writes nothing, so the promised output is missing.
        assert!(matches!(
            h.backend.run_python(&request),
            Err(SandboxError::Execution(_))
        ));
        assert_eq!(
            h.command(0),
            [
                "python3",
                "/script/import_vendors.py",
                "/work/input",
                "--output",
                "/work/result.json"
            ]
        );
        assert_eq!(h.leftover_scratch_dirs(), 0);
    }

    #[rstest]
    #[case::oom_kill("kill -9 $$")]
    #[case::memory_error("echo MemoryError >&2; exit 1")]
    fn memory_exhaustion_is_violation(#[case] snippet: &'static str) {
        let h = harness(snippet);
        let err = h
            .backend
            .run(&InlineRequest::new("x = ' ' * 10**10"))
            .unwrap_err();
        assert!(
            matches!(
                err,
                SandboxError::Violation(Violation::MemoryLimit { limit_mb: 64, .. })
            ),
            "unexpected error: {err:?}"
        );
        assert_eq!(h.leftover_scratch_dirs(), 0);
    }

    #[test]
    fn mount_failure_is_violation() {
        let h = harness("echo \"bwrap: Can't mount proc on /newroot/proc\" >&2; exit 1");
        let err = h.backend.run(&InlineRequest::new("print(1)")).unwrap_err();
        assert!(matches!(
            err,
            SandboxError::Violation(Violation::Mount(ref d)) if d.contains("Can't mount proc")
        ));
        assert_eq!(h.leftover_scratch_dirs(), 0);
    }

    #[test]
    fn timeout_wins_over_classification() {
        let h = harness("echo MemoryError >&2; sleep 30");
        let h = Harness {
            backend: LinuxIsolationBackend {
                policy: h.backend.policy.clone().with_time_limit_seconds(1),
                ..h.backend
            },
            ..h
        };
        let err = h.backend.run(&InlineRequest::new("print(1)")).unwrap_err();
        assert!(matches!(err, SandboxError::Timeout { .. }));
        assert_eq!(h.leftover_scratch_dirs(), 0);
    }

    #[test]
    fn shared_file_names_are_rejected_before_any_job() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("noop.py");
        std::fs::write(&script, "").unwrap();
        let h = harness("exit 0");
        let request = ScriptRequest::new(&script).with_input(b"upload".to_vec(), Some("output".into()));

        assert!(matches!(
            h.backend.run_python(&request),
            Err(SandboxError::Violation(Violation::InvalidFileName(_)))
        ));
        assert!(h.seen.lock().unwrap().is_empty());
        assert_eq!(h.leftover_scratch_dirs(), 0);
    }

    #[test]
    fn missing_helper_fails_at_construction() {
        let helpers = HelperSettings {
            isolation_helper: PathBuf::from("__nonexistent_bwrap_12345__"),
            ..HelperSettings::default()
        };
        let result =
            LinuxIsolationBackend::new(SandboxPolicy::default(), Interpreter::default(), &helpers);
        assert!(matches!(result, Err(BackendError::HelperNotFound { .. })));
    }
}
