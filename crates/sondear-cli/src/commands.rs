//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Sondear: replay, inspect, and merge runtime diagnostics output
#[derive(Parser, Debug)]
#[command(name = "sondear")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a JSON-lines instrumentation log, writing the output files
    /// the live engine would have written
    Replay(ReplayArgs),

    /// Summarize a coverage file per unit
    Inspect(InspectArgs),

    /// Merge coverage files from several requests into one
    Merge(MergeArgs),
}

/// Arguments for the replay command
#[derive(Parser, Debug)]
pub struct ReplayArgs {
    /// Replay log (JSON lines), or `-` for stdin
    pub log: PathBuf,

    /// Active modes, comma-separated (e.g. "coverage,trace")
    #[arg(short, long, default_value = "coverage")]
    pub mode: String,

    /// Directory outputs are written to
    #[arg(short, long, default_value = "/tmp")]
    pub output_dir: PathBuf,

    /// Extra settings as `key=value` pairs, same syntax as the
    /// SONDEAR_CONFIG environment variable
    #[arg(short, long)]
    pub set: Vec<String>,
}

/// Arguments for the inspect command
#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Coverage file in the native listing format
    pub input: PathBuf,
}

/// Arguments for the merge command
#[derive(Parser, Debug)]
pub struct MergeArgs {
    /// Coverage files to merge
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Where to write the merged result
    #[arg(short, long)]
    pub output: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "native")]
    pub format: MergeFormatArg,
}

/// Merge output format flag
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeFormatArg {
    /// Native coverage listing
    Native,
    /// LCOV tracefile
    Lcov,
}

impl From<MergeFormatArg> for crate::merge::MergeFormat {
    fn from(arg: MergeFormatArg) -> Self {
        match arg {
            MergeFormatArg::Native => Self::Native,
            MergeFormatArg::Lcov => Self::Lcov,
        }
    }
}
