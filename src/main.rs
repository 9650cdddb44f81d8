mod cli;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use scriptbox::config::{ConfigLoader, DefaultConfigLoader};

use cli::Cli;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let mut loader = DefaultConfigLoader::new();
    if let Some(path) = cli.config {
        loader = loader.with_explicit_path(path);
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let config = match loader.load(&cwd) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("scriptbox: config error: {e}");
            return ExitCode::from(2);
        }
    };

    match cli::execute(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("scriptbox: {e:#}");
            ExitCode::from(cli::exit_code_for(&e))
        }
    }
}
