use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::error::SandboxError;
use super::scratch::ScratchDir;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A fully assembled child invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCommand {
    pub argv: Vec<String>,
    pub cwd: std::path::PathBuf,
    pub env: Vec<(String, String)>,
}

/// What the child left behind once it exited on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captured {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl Captured {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr.
    pub fn merged(&self) -> String {
        let mut text = String::with_capacity(self.stdout.len() + self.stderr.len());
        text.push_str(&self.stdout);
        text.push_str(&self.stderr);
        text
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Exited(Captured),
    TimedOut,
}

/// Spawn `command` and wait for it, killing its process group once `timeout`
/// elapses.
///
/// stdout and stderr go to capture files inside `scratch` rather than pipes,
/// so a chatty child cannot block on a full pipe while we poll.
pub fn run_with_timeout(
    command: &JobCommand,
    scratch: &ScratchDir,
    timeout: Duration,
    max_output_bytes: usize,
) -> Result<Completion, SandboxError> {
    let Some((program, args)) = command.argv.split_first() else {
        return Err(SandboxError::Execution("empty command line".to_string()));
    };

    let stdout = File::create(scratch.stdout_path())
        .map_err(|e| SandboxError::io("failed to create stdout capture", e))?;
    let stderr = File::create(scratch.stderr_path())
        .map_err(|e| SandboxError::io("failed to create stderr capture", e))?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(&command.cwd)
        .envs(command.env.iter().map(|(k, v)| (k, v)))
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Own process group so a timeout takes down grandchildren as well.
        cmd.process_group(0);
    }

    debug!(command = %quote(&command.argv), cwd = %command.cwd.display(), "spawning job");
    let mut child = cmd.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            SandboxError::Execution(format!("command not found: {program}"))
        }
        std::io::ErrorKind::PermissionDenied => {
            SandboxError::Execution(format!("permission denied: {program}"))
        }
        _ => SandboxError::io("failed to spawn job", e),
    })?;

    let start = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if start.elapsed() >= timeout {
                    kill_process_group(child.id());
                    let _ = child.kill();
                    let _ = child.wait();
                    warn!(
                        pid = child.id(),
                        timeout_secs = timeout.as_secs(),
                        "job exceeded its time limit and was killed"
                    );
                    return Ok(Completion::TimedOut);
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                kill_process_group(child.id());
                let _ = child.kill();
                let _ = child.wait();
                return Err(SandboxError::io("failed to wait for job", e));
            }
        }
    };

    // Background children left by the job must not outlive its scratch dir.
    kill_process_group(child.id());

    let exit_code = exit_code_from_status(status);
    debug!(exit_code, elapsed_ms = start.elapsed().as_millis() as u64, "job exited");

    Ok(Completion::Exited(Captured {
        exit_code,
        stdout: read_capped(&scratch.stdout_path(), max_output_bytes)?,
        stderr: read_capped(&scratch.stderr_path(), max_output_bytes)?,
    }))
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    // SAFETY: killpg has no memory-safety preconditions; the group id is the
    // child's pid because it was spawned with process_group(0).
    unsafe {
        libc::killpg(pid as libc::pid_t, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

/// Read at most `limit` bytes, decoding lossily.
fn read_capped(path: &Path, limit: usize) -> Result<String, SandboxError> {
    let file = File::open(path).map_err(|e| SandboxError::io("failed to read captured output", e))?;
    let mut buf = Vec::new();
    file.take(limit as u64)
        .read_to_end(&mut buf)
        .map_err(|e| SandboxError::io("failed to read captured output", e))?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Extract the exit code from a process exit status.
///
/// If the process was killed by a signal, return 128 + signal number
/// (standard shell convention).
pub fn exit_code_from_status(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}

/// Shell-quoted rendering of a command line for logs.
pub(crate) fn quote(argv: &[String]) -> String {
    shlex::try_join(argv.iter().map(String::as_str)).unwrap_or_else(|_| argv.join(" "))
}
