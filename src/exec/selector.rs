use std::path::PathBuf;

use tracing::{info, warn};

use super::Backend;
use super::bwrap::HelperSettings;
use super::error::BackendError;
use super::interpreter::Interpreter;
use super::linux::LinuxIsolationBackend;
use super::passthrough::PassthroughBackend;
use super::policy::SandboxPolicy;

/// The only host OS the isolation backend supports.
pub const SUPPORTED_OS: &str = "linux";

/// Everything backend selection depends on, captured once up front instead of
/// read from ambient process state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxEnvironment {
    pub isolation_enabled: bool,
    pub host_os: String,
    pub helpers: HelperSettings,
    pub interpreter: Interpreter,
    pub scratch_root: Option<PathBuf>,
}

impl SandboxEnvironment {
    /// Environment for the running host.
    pub fn for_host(isolation_enabled: bool) -> Self {
        Self {
            isolation_enabled,
            host_os: std::env::consts::OS.to_string(),
            helpers: HelperSettings::default(),
            interpreter: Interpreter::default(),
            scratch_root: None,
        }
    }
}

/// Single decision point for which backend a caller gets.
pub struct BackendSelector {
    environment: SandboxEnvironment,
}

impl BackendSelector {
    pub fn new(environment: SandboxEnvironment) -> Self {
        Self { environment }
    }

    pub fn environment(&self) -> &SandboxEnvironment {
        &self.environment
    }

    /// Build the backend for one job's policy.
    ///
    /// - isolation disabled: passthrough, with a loud warning
    /// - isolation enabled on Linux: the isolation backend, which itself
    ///   fails if its helpers are missing
    /// - isolation enabled elsewhere: an error; never a silent downgrade
    pub fn create(&self, policy: SandboxPolicy) -> Result<Box<dyn Backend>, BackendError> {
        let env = &self.environment;

        if !env.isolation_enabled {
            warn!(
                host_os = %env.host_os,
                "SANDBOX ISOLATION IS DISABLED: scripts run as plain subprocesses with no \
                 memory, network or filesystem confinement. Never use this on a shared or \
                 production host"
            );
            let mut backend = PassthroughBackend::new(policy, env.interpreter.clone());
            if let Some(root) = &env.scratch_root {
                backend = backend.with_scratch_root(root);
            }
            return Ok(Box::new(backend));
        }

        if env.host_os != SUPPORTED_OS {
            return Err(BackendError::UnsupportedPlatform {
                os: env.host_os.clone(),
            });
        }

        let mut backend =
            LinuxIsolationBackend::new(policy, env.interpreter.clone(), &env.helpers)?;
        if let Some(root) = &env.scratch_root {
            backend = backend.with_scratch_root(root);
        }
        info!(backend = backend.name(), "selected sandbox backend");
        Ok(Box::new(backend))
    }
}
