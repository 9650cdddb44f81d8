use std::path::{Path, PathBuf};

use super::error::BackendError;
use super::policy::SandboxPolicy;

/// Where the job's scratch work directory appears inside the sandbox.
pub const SANDBOX_WORK_DIR: &str = "/work";
/// Where a scripted job's script directory appears inside the sandbox.
pub const SANDBOX_SCRIPT_DIR: &str = "/script";

const SANDBOX_PATH_ENV: &str = "/usr/local/bin:/usr/bin:/bin";

/// Host directories the interpreter needs, always bound read-only.
const SYSTEM_DIRS: &[&str] = &["/usr", "/bin", "/lib"];

/// Bound read-only only when present on the host.
const OPTIONAL_SYSTEM_DIRS: &[&str] = &[
    "/lib64",
    "/usr/local",
    "/etc/alternatives",
    "/etc/ld.so.cache",
];

/// Host-side paths of one job that the confinement exposes.
#[derive(Debug, Clone, Copy)]
pub struct JobMounts<'a> {
    /// Scratch work directory, mounted read-write at [`SANDBOX_WORK_DIR`].
    pub work_dir: &'a Path,
    /// Parent directory of a trusted script, mounted read-only at
    /// [`SANDBOX_SCRIPT_DIR`].
    pub script_dir: Option<&'a Path>,
}

/// Wraps a job command line with host-specific confinement.
///
/// `command` already uses in-sandbox paths. Implementations return the full
/// argv to spawn on the host. A native namespace/cgroup implementation can
/// stand in for the external helpers without touching the backend.
pub trait IsolationProvider: Send + Sync {
    fn wrap(&self, policy: &SandboxPolicy, mounts: &JobMounts<'_>, command: &[String]) -> Vec<String>;
}

/// Names or paths of the external helpers and the interpreter package
/// directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperSettings {
    pub isolation_helper: PathBuf,
    pub resource_limiter: PathBuf,
    /// The interpreter's third-party package directory, bound read-only at
    /// the same path and exported through `PYTHONPATH`.
    pub package_dir: Option<PathBuf>,
}

impl Default for HelperSettings {
    fn default() -> Self {
        Self {
            isolation_helper: PathBuf::from("bwrap"),
            resource_limiter: PathBuf::from("prlimit"),
            package_dir: None,
        }
    }
}

/// `prlimit --as=<bytes> -- bwrap ... -- <command>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BubblewrapProvider {
    bwrap: PathBuf,
    prlimit: PathBuf,
    package_dir: Option<PathBuf>,
    uid: u32,
    gid: u32,
}

impl BubblewrapProvider {
    /// Resolve both helpers on `PATH` and validate the package directory.
    ///
    /// Fails at construction so a misconfigured host never reaches its first
    /// job.
    pub fn locate(settings: &HelperSettings) -> Result<Self, BackendError> {
        let bwrap = resolve_helper(&settings.isolation_helper)?;
        let prlimit = resolve_helper(&settings.resource_limiter)?;

        if let Some(dir) = &settings.package_dir
            && !dir.is_dir()
        {
            return Err(BackendError::InvalidPackageDir(dir.clone()));
        }

        Ok(Self::new(bwrap, prlimit, settings.package_dir.clone()))
    }

    /// Build a provider from already-resolved helper paths, running as the
    /// invoking user.
    pub fn new(bwrap: PathBuf, prlimit: PathBuf, package_dir: Option<PathBuf>) -> Self {
        // SAFETY: getuid/getgid cannot fail and touch no memory.
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        Self {
            bwrap,
            prlimit,
            package_dir,
            uid,
            gid,
        }
    }

    /// Build bubblewrap command-line arguments for namespace isolation.
    ///
    /// The arguments set up:
    /// - Fresh namespaces; the network namespace is shared only when allowed
    /// - The invoking user's uid/gid inside the user namespace
    /// - A cleared environment with a fixed PATH
    /// - Read-only system directories, package directory, and allowed paths
    /// - tmpfs /tmp, /proc, /dev
    /// - The job's work directory read-write, the script directory read-only
    pub fn build_bwrap_args(
        &self,
        policy: &SandboxPolicy,
        mounts: &JobMounts<'_>,
        command: &[String],
    ) -> Vec<String> {
        let mut args = Vec::new();

        args.push("--unshare-all".to_string());
        if policy.allow_network {
            args.push("--share-net".to_string());
        }
        args.push("--unshare-user".to_string());
        args.extend(["--uid".to_string(), self.uid.to_string()]);
        args.extend(["--gid".to_string(), self.gid.to_string()]);
        args.push("--die-with-parent".to_string());

        args.push("--clearenv".to_string());
        let mut env = vec![
            ("PATH", SANDBOX_PATH_ENV.to_string()),
            ("HOME", SANDBOX_WORK_DIR.to_string()),
            ("LANG", "C.UTF-8".to_string()),
            ("PYTHONDONTWRITEBYTECODE", "1".to_string()),
        ];
        if let Some(dir) = &self.package_dir {
            env.push(("PYTHONPATH", path_arg(dir)));
        }
        for (key, value) in env {
            args.extend(["--setenv".to_string(), key.to_string(), value]);
        }

        for dir in SYSTEM_DIRS {
            args.extend(["--ro-bind".to_string(), dir.to_string(), dir.to_string()]);
        }
        for dir in OPTIONAL_SYSTEM_DIRS {
            args.extend(["--ro-bind-try".to_string(), dir.to_string(), dir.to_string()]);
        }

        args.extend(["--proc".to_string(), "/proc".to_string()]);
        args.extend(["--dev".to_string(), "/dev".to_string()]);
        args.extend(["--tmpfs".to_string(), "/tmp".to_string()]);

        if let Some(dir) = &self.package_dir {
            let path = path_arg(dir);
            args.extend(["--ro-bind".to_string(), path.clone(), path]);
        }

        for allowed in &policy.allowed_paths {
            let path = path_arg(allowed);
            args.extend(["--ro-bind".to_string(), path.clone(), path]);
        }

        args.extend([
            "--bind".to_string(),
            path_arg(mounts.work_dir),
            SANDBOX_WORK_DIR.to_string(),
        ]);
        if let Some(script_dir) = mounts.script_dir {
            args.extend([
                "--ro-bind".to_string(),
                path_arg(script_dir),
                SANDBOX_SCRIPT_DIR.to_string(),
            ]);
        }

        args.extend(["--chdir".to_string(), SANDBOX_WORK_DIR.to_string()]);

        args.push("--".to_string());
        args.extend_from_slice(command);

        args
    }
}

impl IsolationProvider for BubblewrapProvider {
    fn wrap(&self, policy: &SandboxPolicy, mounts: &JobMounts<'_>, command: &[String]) -> Vec<String> {
        let mut argv = vec![
            path_arg(&self.prlimit),
            format!("--as={}", policy.memory_limit_bytes()),
            "--".to_string(),
            path_arg(&self.bwrap),
        ];
        argv.extend(self.build_bwrap_args(policy, mounts, command));
        argv
    }
}

fn resolve_helper(helper: &Path) -> Result<PathBuf, BackendError> {
    which::which(helper).map_err(|_| BackendError::HelperNotFound {
        helper: helper.display().to_string(),
    })
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
