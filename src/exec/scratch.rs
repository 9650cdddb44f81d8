use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::warn;

use super::error::SandboxError;

const WORK_DIR: &str = "work";
const STDOUT_FILE: &str = "stdout";
const STDERR_FILE: &str = "stderr";

/// Single-use job directory.
///
/// Layout:
/// - `work/`: the child's working directory (bind-mounted into the sandbox),
///   holding the input file and, for scripts, the output file
/// - `stdout`, `stderr`: capture files, never visible inside the sandbox
///
/// The whole tree is removed when the value is dropped, on every exit path,
/// including trees the job made unreadable to its own user.
pub struct ScratchDir {
    root: Option<TempDir>,
    path: PathBuf,
    work: PathBuf,
}

impl ScratchDir {
    pub fn create(parent: Option<&Path>) -> Result<Self, SandboxError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("scriptbox-");
        let root = match parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(|e| SandboxError::io("failed to create scratch directory", e))?;

        let work = root.path().join(WORK_DIR);
        fs::create_dir(&work)
            .map_err(|e| SandboxError::io("failed to create scratch work directory", e))?;

        Ok(Self {
            path: root.path().to_path_buf(),
            root: Some(root),
            work,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn work_dir(&self) -> &Path {
        &self.work
    }

    pub fn stdout_path(&self) -> PathBuf {
        self.path.join(STDOUT_FILE)
    }

    pub fn stderr_path(&self) -> PathBuf {
        self.path.join(STDERR_FILE)
    }

    /// Write `bytes` (or an empty file) as `work/<name>` and return its host path.
    pub fn materialize(&self, name: &str, bytes: Option<&[u8]>) -> Result<PathBuf, SandboxError> {
        let path = self.work.join(name);
        fs::write(&path, bytes.unwrap_or_default())
            .map_err(|e| SandboxError::io("failed to materialize input", e))?;
        Ok(path)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let Some(root) = self.root.take() else {
            return;
        };
        if root.close().is_ok() {
            return;
        }
        // The job may have stripped permissions from directories it created.
        restore_owner_access(&self.path);
        if let Err(e) = fs::remove_dir_all(&self.path) {
            warn!(
                path = %self.path.display(),
                error = %e,
                "failed to remove scratch directory"
            );
        }
    }
}

/// Give the owner `rwx` on `dir` and every directory below it. Symlinks are
/// not followed.
#[cfg(unix)]
fn restore_owner_access(dir: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let _ = fs::set_permissions(dir, fs::Permissions::from_mode(0o700));
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        if entry.file_type().is_ok_and(|t| t.is_dir()) {
            restore_owner_access(&entry.path());
        }
    }
}

#[cfg(not(unix))]
fn restore_owner_access(_dir: &Path) {}
