pub mod bwrap;
pub mod classify;
pub mod error;
pub mod interpreter;
pub mod linux;
pub mod output;
pub mod passthrough;
pub mod policy;
pub mod process;
pub mod request;
pub mod scratch;
pub mod selector;

pub use bwrap::{BubblewrapProvider, HelperSettings, IsolationProvider, JobMounts};
pub use error::{BackendError, SandboxError, Violation};
pub use interpreter::Interpreter;
pub use linux::LinuxIsolationBackend;
pub use passthrough::PassthroughBackend;
pub use policy::SandboxPolicy;
pub use request::{InlineRequest, ScriptOutput, ScriptRequest};
pub use selector::{BackendSelector, SandboxEnvironment};

/// An executor for single, bounded sandbox jobs.
///
/// Each call blocks for at most the policy's time limit plus setup and
/// teardown, holds no state across calls, and removes its scratch directory
/// before returning.
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    /// The policy this backend enforces.
    fn policy(&self) -> &SandboxPolicy;

    /// Run inline code and return merged stdout/stderr.
    fn run(&self, request: &InlineRequest) -> Result<String, SandboxError>;

    /// Run a trusted script through the `<script> <input> --output <output>`
    /// contract and return what it wrote to the output file.
    fn run_python(&self, request: &ScriptRequest) -> Result<ScriptOutput, SandboxError>;
}
