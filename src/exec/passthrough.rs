use std::path::PathBuf;

use tracing::{debug, info};

use super::Backend;
use super::classify::generic_diagnostic;
use super::error::SandboxError;
use super::interpreter::Interpreter;
use super::output::read_script_output;
use super::policy::SandboxPolicy;
use super::process::{Completion, JobCommand, run_with_timeout};
use super::request::{InlineRequest, ScriptOutput, ScriptRequest};
use super::scratch::ScratchDir;

/// Development-only executor.
///
/// Runs the interpreter directly with a wall-clock timeout and a private
/// working directory. There is no memory ceiling, no network isolation and no
/// filesystem confinement; never select it for code of unknown trust on a
/// shared host.
pub struct PassthroughBackend {
    policy: SandboxPolicy,
    interpreter: Interpreter,
    scratch_root: Option<PathBuf>,
}

impl PassthroughBackend {
    pub fn new(policy: SandboxPolicy, interpreter: Interpreter) -> Self {
        Self {
            policy,
            interpreter,
            scratch_root: None,
        }
    }

    /// Create scratch directories under `root` instead of the OS temp dir.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    fn execute(&self, argv: Vec<String>, scratch: &ScratchDir) -> Result<String, SandboxError> {
        let command = JobCommand {
            argv,
            cwd: scratch.work_dir().to_path_buf(),
            env: vec![("PYTHONDONTWRITEBYTECODE".to_string(), "1".to_string())],
        };
        match run_with_timeout(
            &command,
            scratch,
            self.policy.time_limit(),
            self.policy.max_output_bytes,
        )? {
            Completion::TimedOut => Err(SandboxError::Timeout {
                limit: self.policy.time_limit(),
            }),
            Completion::Exited(captured) if captured.success() => Ok(captured.merged()),
            Completion::Exited(captured) => {
                debug!(exit_code = captured.exit_code, "passthrough job failed");
                Err(SandboxError::Execution(generic_diagnostic(&captured)))
            }
        }
    }
}

impl Backend for PassthroughBackend {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn policy(&self) -> &SandboxPolicy {
        &self.policy
    }

    fn run(&self, request: &InlineRequest) -> Result<String, SandboxError> {
        let input_name = request.input_name()?;
        let scratch = ScratchDir::create(self.scratch_root.as_deref())?;

        let input = match &request.input_bytes {
            Some(bytes) => Some(scratch.materialize(input_name, Some(bytes.as_slice()))?),
            None => None,
        };
        let input = input.as_ref().map(|p| p.to_string_lossy().into_owned());

        info!(backend = self.name(), "running inline job");
        let argv = self
            .interpreter
            .inline_command(&request.code, input.as_deref(), &request.extra_args);
        self.execute(argv, &scratch)
    }

    fn run_python(&self, request: &ScriptRequest) -> Result<ScriptOutput, SandboxError> {
        let (input_name, output_name) = request.file_names()?;
        let (script, _, _) = request.resolve_script()?;
        let scratch = ScratchDir::create(self.scratch_root.as_deref())?;

        let input = scratch.materialize(input_name, request.input_bytes.as_deref())?;
        let output = scratch.work_dir().join(output_name);

        info!(backend = self.name(), script = %script.display(), "running script job");
        let argv = self.interpreter.script_command(
            &script.to_string_lossy(),
            &input.to_string_lossy(),
            &output.to_string_lossy(),
            &request.extra_args,
        );
        self.execute(argv, &scratch)?;
        read_script_output(&output, request.binary_output)
    }
}
