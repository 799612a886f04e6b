//! Sondear CLI: offline tooling for the diagnostics engine
//!
//! ## Usage
//!
//! ```bash
//! sondear replay run.jsonl --mode coverage,trace   # Replay an instrumentation log
//! sondear inspect /tmp/coverage.1234.0             # Per-unit coverage summary
//! sondear merge a.cov b.cov -o merged.cov          # Sum counts across requests
//! sondear merge a.cov b.cov -o out.info -f lcov    # Export LCOV instead
//! ```

use clap::Parser;
use sondear::{ModeMask, Settings, SinkRoot};
use sondear_cli::{inspect, merge, replay, Cli, CliError, CliResult, Commands, ReplayArgs};
use std::io::BufReader;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    match cli.command {
        Commands::Replay(args) => run_replay(&args),
        Commands::Inspect(args) => inspect::run(&args.input),
        Commands::Merge(args) => merge::run(&args.inputs, &args.output, args.format.into()),
    }
}

fn init_tracing(cli: &Cli) {
    let default = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_replay(args: &ReplayArgs) -> CliResult<()> {
    let settings = build_settings(args)?;
    let sink = SinkRoot::directory(&args.output_dir);

    let (_, outcome) = if args.log.as_os_str() == "-" {
        replay(settings, sink, BufReader::new(std::io::stdin()))
    } else {
        let file = std::fs::File::open(&args.log)?;
        replay(settings, sink, BufReader::new(file))
    }?;

    println!(
        "replayed {} event(s), wrote {} output(s)",
        outcome.events,
        outcome.summary.outputs.len()
    );
    for output in &outcome.summary.outputs {
        println!("  {} ({} bytes)", output.name, output.bytes);
    }
    if !outcome.summary.is_clean() {
        return Err(CliError::replay(format!(
            "{} sink(s) failed to flush",
            outcome.summary.errors.len()
        )));
    }
    Ok(())
}

fn build_settings(args: &ReplayArgs) -> CliResult<Settings> {
    let mut settings = Settings::new();
    settings.mode = ModeMask::parse(&args.mode)?;
    settings.output_dir = args.output_dir.to_string_lossy().into_owned();
    for pair in &args.set {
        let errors = settings.apply_override_str(pair);
        if let Some(first) = errors.into_iter().next() {
            return Err(first.into());
        }
    }
    Ok(settings)
}
