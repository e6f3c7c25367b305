//! Helpers for rendering command output.

use std::io::Write;

use camino::Utf8Path;
use eyre::{Context, Result};
use rstest_bdd_messages::validation::StreamSummary;

pub(crate) fn write_valid(
    writer: &mut dyn Write,
    path: &Utf8Path,
    summary: &StreamSummary,
) -> Result<()> {
    let messages: usize = summary.messages.values().sum();
    writeln!(
        writer,
        "ok {path}: {messages} messages in {} run(s)",
        summary.runs
    )
    .wrap_err_with(|| format!("failed to write check result for {path}"))
}

fn outcome(success: Option<bool>) -> &'static str {
    match success {
        Some(true) => "passed",
        Some(false) => "failed",
        None => "unknown",
    }
}

pub(crate) fn write_summary(writer: &mut dyn Write, summary: &StreamSummary) -> Result<()> {
    writeln!(writer, "runs: {}", summary.runs).wrap_err("failed to write run count")?;
    writeln!(writer, "outcome: {}", outcome(summary.success))
        .wrap_err("failed to write run outcome")?;
    writeln!(writer, "messages:").wrap_err("failed to write message heading")?;
    for (kind, count) in &summary.messages {
        writeln!(writer, "  {kind}: {count}")
            .wrap_err_with(|| format!("failed to write count for {kind}"))?;
    }
    if summary.step_statuses.is_empty() {
        return Ok(());
    }
    writeln!(writer, "steps:").wrap_err("failed to write step heading")?;
    for (status, count) in &summary.step_statuses {
        writeln!(writer, "  {status}: {count}")
            .wrap_err_with(|| format!("failed to write count for {status} steps"))?;
    }
    Ok(())
}

pub(crate) fn write_summary_json(writer: &mut dyn Write, summary: &StreamSummary) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, summary)
        .wrap_err("failed to serialise summary as JSON")?;
    writeln!(writer).wrap_err("failed to terminate JSON summary")
}
