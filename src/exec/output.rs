use std::path::Path;

use super::error::SandboxError;
use super::request::ScriptOutput;

/// Read back the file a script promised to write.
///
/// A missing file after a zero exit is a protocol violation of the script,
/// reported as an execution failure rather than an empty result.
pub fn read_script_output(path: &Path, binary: bool) -> Result<ScriptOutput, SandboxError> {
    if !path.is_file() {
        return Err(SandboxError::Execution(
            "script exited successfully but did not produce its output file".to_string(),
        ));
    }
    let bytes =
        std::fs::read(path).map_err(|e| SandboxError::io("failed to read script output", e))?;
    if binary {
        return Ok(ScriptOutput::Bytes(bytes));
    }
    String::from_utf8(bytes)
        .map(ScriptOutput::Text)
        .map_err(|_| SandboxError::Execution("script output is not valid UTF-8".to_string()))
}
