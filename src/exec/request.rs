use std::path::{Component, Path, PathBuf};

use super::error::{SandboxError, Violation};

pub const DEFAULT_INPUT_FILENAME: &str = "input";
pub const DEFAULT_OUTPUT_FILENAME: &str = "output";

/// A self-contained program body handed to the interpreter's inline flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineRequest {
    pub code: String,
    pub input_bytes: Option<Vec<u8>>,
    pub input_filename: Option<String>,
    pub extra_args: Vec<String>,
}

impl InlineRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Self::default()
        }
    }

    pub fn with_input(mut self, bytes: Vec<u8>, filename: Option<String>) -> Self {
        self.input_bytes = Some(bytes);
        self.input_filename = filename;
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub(crate) fn input_name(&self) -> Result<&str, SandboxError> {
        checked_file_name(self.input_filename.as_deref(), DEFAULT_INPUT_FILENAME)
    }
}

/// An external, trusted script driven through the file contract
/// `<script> <input> --output <output> [extra_args...]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptRequest {
    pub script_path: PathBuf,
    pub input_bytes: Option<Vec<u8>>,
    pub input_filename: Option<String>,
    pub output_filename: Option<String>,
    pub extra_args: Vec<String>,
    pub binary_output: bool,
}

impl ScriptRequest {
    pub fn new(script_path: impl Into<PathBuf>) -> Self {
        Self {
            script_path: script_path.into(),
            ..Self::default()
        }
    }

    pub fn with_input(mut self, bytes: Vec<u8>, filename: Option<String>) -> Self {
        self.input_bytes = Some(bytes);
        self.input_filename = filename;
        self
    }

    pub fn with_output_filename(mut self, filename: impl Into<String>) -> Self {
        self.output_filename = Some(filename.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn binary(mut self) -> Self {
        self.binary_output = true;
        self
    }

    /// Input and output names, each a plain file name and never the same
    /// one: a shared name would hand the caller's upload back as output.
    pub(crate) fn file_names(&self) -> Result<(&str, &str), SandboxError> {
        let input = checked_file_name(self.input_filename.as_deref(), DEFAULT_INPUT_FILENAME)?;
        let output = checked_file_name(self.output_filename.as_deref(), DEFAULT_OUTPUT_FILENAME)?;
        if input == output {
            return Err(Violation::InvalidFileName(output.to_string()).into());
        }
        Ok((input, output))
    }

    /// Canonical script path plus its parent directory and file name.
    pub(crate) fn resolve_script(&self) -> Result<(PathBuf, PathBuf, String), SandboxError> {
        let script = self.script_path.canonicalize().map_err(|e| {
            SandboxError::Execution(format!(
                "script '{}' cannot be resolved: {e}",
                self.script_path.display()
            ))
        })?;
        let parent = script_dir(&script)?;
        let name = script
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                SandboxError::Execution(format!("script '{}' has no file name", script.display()))
            })?;
        Ok((script, parent, name))
    }
}

/// What a scripted job left in its output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOutput {
    Text(String),
    Bytes(Vec<u8>),
}

impl ScriptOutput {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ScriptOutput::Text(text) => Some(text),
            ScriptOutput::Bytes(_) => None,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            ScriptOutput::Text(text) => text.into_bytes(),
            ScriptOutput::Bytes(bytes) => bytes,
        }
    }
}

/// The directory holding `script`. The filesystem root is refused because it
/// would be mounted into the sandbox wholesale.
fn script_dir(script: &Path) -> Result<PathBuf, SandboxError> {
    match script.parent() {
        Some(parent) if parent.parent().is_some() => Ok(parent.to_path_buf()),
        _ => Err(SandboxError::Execution(format!(
            "script '{}' must live in a directory below the filesystem root",
            script.display()
        ))),
    }
}

/// Accept only a single normal path component so a caller-supplied name
/// cannot point outside the scratch directory.
fn checked_file_name<'a>(name: Option<&'a str>, default: &'a str) -> Result<&'a str, SandboxError> {
    let name = name.unwrap_or(default);
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == name => Ok(name),
        _ => Err(Violation::InvalidFileName(name.to_string()).into()),
    }
}
