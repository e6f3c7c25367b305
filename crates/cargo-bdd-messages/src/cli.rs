//! Command dispatch for the `cargo bdd-messages` entrypoint.

use std::ffi::OsString;
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use eyre::{Context, Result};
use rstest_bdd_messages::validation::{StreamSummary, StreamValidator};

use crate::output::{write_summary, write_summary_json, write_valid};

/// Name cargo passes as the first argument when run as `cargo bdd-messages`.
const CARGO_SUBCOMMAND: &str = "bdd-messages";

/// Inspect Cucumber message streams written by rstest-bdd runs.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub(crate) struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Supported commands.
#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Validate ordering, references and durations of a stream.
    Check(StreamArgs),
    /// Print message and step-status counts for a valid stream.
    Summary(SummaryArgs),
}

#[derive(Debug, Args)]
pub(crate) struct StreamArgs {
    /// NDJSON file to read.
    pub path: Utf8PathBuf,
}

#[derive(Debug, Args)]
pub(crate) struct SummaryArgs {
    /// NDJSON file to read.
    pub path: Utf8PathBuf,
    /// Emit JSON instead of human-readable text.
    #[arg(long)]
    pub json: bool,
}

/// Drop the subcommand name cargo inserts ahead of the real arguments.
fn normalise_args(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    let mut args: Vec<OsString> = args.into_iter().collect();
    if args.get(1).is_some_and(|arg| arg == CARGO_SUBCOMMAND) {
        args.remove(1);
    }
    args
}

pub(crate) fn run() -> Result<()> {
    let cli = Cli::parse_from(normalise_args(std::env::args_os()));
    tracing::debug!(command = ?cli.command, "dispatching");
    match cli.command {
        Commands::Check(args) => handle_check(&args),
        Commands::Summary(args) => handle_summary(&args),
    }
}

/// Read and validate the stream at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the stream is invalid.
fn load_summary(path: &Utf8Path) -> Result<StreamSummary> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read message stream {path}"))?;
    let summary = StreamValidator::validate_str(&text)
        .wrap_err_with(|| format!("invalid message stream {path}"))?;
    tracing::debug!(%path, runs = summary.runs, "validated message stream");
    Ok(summary)
}

fn handle_check(args: &StreamArgs) -> Result<()> {
    let summary = load_summary(&args.path)?;
    let mut stdout = io::stdout().lock();
    write_valid(&mut stdout, &args.path, &summary)?;
    stdout.flush().wrap_err("failed to flush check result")
}

fn handle_summary(args: &SummaryArgs) -> Result<()> {
    let summary = load_summary(&args.path)?;
    let mut stdout = io::stdout().lock();
    if args.json {
        write_summary_json(&mut stdout, &summary)?;
    } else {
        write_summary(&mut stdout, &summary)?;
    }
    stdout.flush().wrap_err("failed to flush summary")
}
