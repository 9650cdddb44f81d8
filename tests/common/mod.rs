#![allow(dead_code)]

use std::fs;
use std::io::{Cursor, Write as _};
use std::path::{Path, PathBuf};

use scriptbox::exec::{Interpreter, PassthroughBackend, SandboxPolicy};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

/// A passthrough backend running `sh`, with scratch directories kept under a
/// private root so tests can check that nothing is left behind.
pub struct ShellSandbox {
    pub root: TempDir,
    pub backend: PassthroughBackend,
}

impl ShellSandbox {
    pub fn new(policy: SandboxPolicy) -> Self {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("scratch")).unwrap();
        let backend = PassthroughBackend::new(policy, Interpreter::new("sh"))
            .with_scratch_root(root.path().join("scratch"));
        Self { root, backend }
    }

    pub fn scratch_root(&self) -> PathBuf {
        self.root.path().join("scratch")
    }

    /// Number of scratch directories still on disk.
    pub fn leftover_scratch_dirs(&self) -> usize {
        fs::read_dir(self.scratch_root()).unwrap().count()
    }

    pub fn write_script(&self, name: &str, body: &str) -> PathBuf {
        write_file(&self.root.path().join("scripts"), name, body.as_bytes())
    }
}

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

/// Build an in-memory zip whose entries are compressed with `method`.
pub fn zip_archive(entries: &[(&str, &[u8])], method: zip::CompressionMethod) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(method);
    for (name, data) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}
