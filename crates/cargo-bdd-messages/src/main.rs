//! Command line inspection of Cucumber message streams.
//!
//! `cargo bdd-messages check <path>` validates an NDJSON file written by
//! `rstest-bdd-messages` and exits non-zero on the first violation.
//! `cargo bdd-messages summary <path>` prints message and step-status
//! counts, as text or JSON.

mod cli;
mod logging;
mod output;

fn main() -> eyre::Result<()> {
    logging::init_logging();
    cli::run()
}
