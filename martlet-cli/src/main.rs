//! Martlet CLI — drives the analytics pipeline from the command line.
//!
//! Every subcommand operates on one workspace: raw CSVs in, model views
//! and published artifacts out.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Martlet: an e-commerce analytics mart pipeline
#[derive(Parser, Debug)]
#[command(name = "martlet", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Run anchor timestamp, RFC 3339 or YYYY-MM-DDTHH:MM:SS (defaults to now)
    #[arg(long)]
    as_of: Option<String>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Generate the synthetic raw CSV source files
    Seed,
    /// Run the whole pipeline: load, build, check, document, publish
    Run {
        /// Generate the raw CSVs first
        #[arg(long)]
        seed: bool,
    },
    /// Load raw sources and rebuild every model view
    Build,
    /// Run the validation battery against the current warehouse
    Check,
    /// Write the documentation snapshot
    Docs,
    /// Validate and publish the reporting query catalog
    Catalog,
    /// Render the HTML dashboard
    Dashboard,
    /// Run one catalog query and print its rows
    Query {
        /// Query name, e.g. revenue_by_category
        name: String,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create default configuration file
    Init,
    /// Show current configuration
    Show,
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    // Human-readable layer for stderr (always active)
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    // JSON file layer for structured logging
    let log_dir = directories::ProjectDirs::from("io", "martlet", "martlet")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "martlet.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    // Resolve workspace
    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let as_of = match &cli.as_of {
        Some(raw) => parse_as_of(raw)?,
        None => chrono::Utc::now(),
    };
    tracing::debug!(workspace = %workspace.display(), %as_of, "Resolved run context");

    commands::handle_command(cli.command, &workspace, as_of)
}

/// Accepts RFC 3339 or the naive timestamp format the source files carry;
/// naive values are taken as UTC.
fn parse_as_of(raw: &str) -> anyhow::Result<chrono::DateTime<chrono::Utc>> {
    if let Ok(fixed) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Ok(fixed.with_timezone(&chrono::Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(naive.and_utc());
    }
    anyhow::bail!("Cannot parse --as-of '{raw}': expected RFC 3339 or YYYY-MM-DDTHH:MM:SS")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_as_of_rfc3339() {
        let parsed = parse_as_of("2024-06-15T12:00:00Z").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-06-15T12:00:00+00:00");
    }

    #[test]
    fn test_parse_as_of_offset_normalized_to_utc() {
        let parsed = parse_as_of("2024-06-15T14:00:00+02:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-06-15T12:00:00+00:00");
    }

    #[test]
    fn test_parse_as_of_naive_taken_as_utc() {
        let parsed = parse_as_of("2024-06-15T12:00:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-06-15T12:00:00+00:00");
    }

    #[test]
    fn test_parse_as_of_rejects_date_only() {
        let err = parse_as_of("2024-06-15").unwrap_err();
        assert!(err.to_string().contains("--as-of"));
    }
}
