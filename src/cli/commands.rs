use std::io::Write as _;
use std::path::Path;

use anyhow::Context as _;

use scriptbox::archive::ArchiveValidator;
use scriptbox::config::Config;
use scriptbox::exec::{
    BackendError, BackendSelector, InlineRequest, SandboxError, ScriptOutput, ScriptRequest,
};

use super::{CheckArchiveArgs, Commands, RunArgs, ScriptArgs};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Run one subcommand against the loaded config.
pub fn execute(command: Commands, config: &Config) -> anyhow::Result<()> {
    match command {
        Commands::Run(args) => run_inline(args, config),
        Commands::Script(args) => run_script(args, config),
        Commands::CheckArchive(args) => check_archive(&args, config),
    }
}

/// 2 for setup problems (unsupported host, missing helper), 1 for everything
/// that went wrong inside a job.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<BackendError>().is_some() {
        2
    } else {
        1
    }
}

fn run_inline(args: RunArgs, config: &Config) -> anyhow::Result<()> {
    let mut parts = args.code.into_iter();
    let code = parts.next().context("no code given")?;
    let mut request = InlineRequest::new(code).with_args(parts);
    if let Some(path) = &args.input {
        let (bytes, name) = read_input(path, config)?;
        request = request.with_input(bytes, name);
    }

    let backend = BackendSelector::new(config.environment()).create(config.policy())?;
    let output = backend.run(&request).map_err(report)?;
    print!("{output}");
    Ok(())
}

fn run_script(args: ScriptArgs, config: &Config) -> anyhow::Result<()> {
    let mut request = ScriptRequest::new(&args.script).with_args(args.args);
    if let Some(path) = &args.input {
        let (bytes, name) = read_input(path, config)?;
        request = request.with_input(bytes, name);
    }
    if let Some(name) = args.output_name {
        request = request.with_output_filename(name);
    }
    if args.binary {
        request = request.binary();
    }

    let backend = BackendSelector::new(config.environment()).create(config.policy())?;
    let output = backend.run_python(&request).map_err(report)?;

    match (&args.out, output) {
        (Some(out), output) => std::fs::write(out, output.into_bytes())
            .with_context(|| format!("failed to write {}", out.display()))?,
        (None, ScriptOutput::Text(text)) => print!("{text}"),
        (None, ScriptOutput::Bytes(bytes)) => std::io::stdout().write_all(&bytes)?,
    }
    Ok(())
}

fn check_archive(args: &CheckArchiveArgs, config: &Config) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let stats = ArchiveValidator::new(config.archive_limits())
        .validate(&bytes)
        .map_err(report)?;
    println!(
        "ok: {} entries, {} bytes compressed, {} bytes uncompressed (ratio {:.1})",
        stats.entries,
        stats.compressed,
        stats.uncompressed,
        stats.ratio()
    );
    Ok(())
}

/// Read an input file, rejecting zip containers that fail the safety checks
/// before they reach any script.
fn read_input(path: &Path, config: &Config) -> anyhow::Result<(Vec<u8>, Option<String>)> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    if bytes.starts_with(ZIP_MAGIC) {
        ArchiveValidator::new(config.archive_limits())
            .validate(&bytes)
            .map_err(report)?;
    }
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());
    Ok((bytes, name))
}

/// Lead with the short message a platform user would see; the diagnostic
/// stays in the chain for the operator.
fn report(err: SandboxError) -> anyhow::Error {
    let message = err.user_message();
    anyhow::Error::new(err).context(message)
}
