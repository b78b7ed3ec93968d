//! shelf - Book / Stage / Task progress tracking CLI
//!
//! Tracks books broken into stages and tasks, rolls task completion up into
//! stage and book progress, and keeps every list in a manual order.

use clap::Parser;
use shelf::cli::Cli;
use shelf::output::{emit_error, infer_command_name_from_args};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Longest RUST_LOG value we try to parse.
const MAX_FILTER_LEN: usize = 4096;

fn main() {
    init_tracing();

    let command = infer_command_name_from_args();
    let cli = Cli::parse();
    let json = cli.json_errors();
    if let Err(err) = cli.run() {
        let _ = emit_error(&command, &err, json);
        std::process::exit(err.exit_code());
    }
}

/// Diagnostics go to stderr; stdout belongs to command output and `--events -`.
fn init_tracing() {
    let filter = log_filter(std::env::var("RUST_LOG").ok().as_deref());
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Logging is off unless RUST_LOG holds a filter that parses.
fn log_filter(raw: Option<&str>) -> EnvFilter {
    raw.map(str::trim)
        .filter(|raw| !raw.is_empty() && raw.len() <= MAX_FILTER_LEN)
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .unwrap_or_else(|| EnvFilter::new("off"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_filter_defaults_to_off() {
        assert_eq!(log_filter(None).to_string(), "off");
        assert_eq!(log_filter(Some("   ")).to_string(), "off");
        assert_eq!(log_filter(Some(&"a".repeat(MAX_FILTER_LEN + 1))).to_string(), "off");
    }

    #[test]
    fn log_filter_accepts_targets() {
        assert_eq!(log_filter(Some(" shelf=debug ")).to_string(), "shelf=debug");
    }
}
