mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{execute, exit_code_for};

#[derive(Parser)]
#[command(name = "scriptbox", version, about = "Run untrusted scoring and import scripts in a sandbox")]
pub struct Cli {
    /// Config file to use instead of ./scriptbox.yml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
#[cfg_attr(test, derive(Debug, PartialEq))]
pub enum Commands {
    /// Run inline code and print its merged output
    Run(RunArgs),
    /// Run a script with the `<script> <input> --output <file>` contract
    Script(ScriptArgs),
    /// Check an uploaded archive for zip-bomb characteristics
    CheckArchive(CheckArchiveArgs),
}

#[derive(clap::Args)]
#[cfg_attr(test, derive(Debug, PartialEq))]
pub struct RunArgs {
    /// File made available to the code as its input
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Code to run, followed by extra arguments passed to it
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub code: Vec<String>,
}

#[derive(clap::Args)]
#[cfg_attr(test, derive(Debug, PartialEq))]
pub struct ScriptArgs {
    /// Trusted script to run
    pub script: PathBuf,

    /// Input file handed to the script
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Name of the output file the script writes
    #[arg(long)]
    pub output_name: Option<String>,

    /// Return the output file as raw bytes
    #[arg(long)]
    pub binary: bool,

    /// Write the output here instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Extra arguments passed to the script
    #[arg(last = true)]
    pub args: Vec<String>,
}

#[derive(clap::Args)]
#[cfg_attr(test, derive(Debug, PartialEq))]
pub struct CheckArchiveArgs {
    pub file: PathBuf,
}
