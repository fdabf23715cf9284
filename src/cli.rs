//! CLI argument parsing for tracealign

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Process exit code when every spec is SUCCESS or SKIPPED
pub const EXIT_OK: i32 = 0;
/// Process exit code when any spec FAILED
pub const EXIT_VALIDATION_FAILED: i32 = 1;
/// Process exit code for unrecoverable errors
pub const EXIT_ERROR: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "tracealign")]
#[command(version)]
#[command(about = "Validates source-embedded service contracts against OpenTelemetry traces", long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Align annotated specs against a trace and report per-spec verdicts
    Align {
        /// Source tree to scan for @ServiceSpec annotations
        #[arg(long, value_name = "DIR")]
        sources: PathBuf,

        /// OTLP JSON trace file
        #[arg(long, value_name = "FILE")]
        trace: PathBuf,

        /// Report output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
        format: OutputFormat,

        /// Worker count for parsing and alignment (default 4)
        #[arg(long, value_name = "N")]
        workers: Option<usize>,

        /// Disable the per-file parse cache
        #[arg(long)]
        no_cache: bool,

        /// Treat specs with no matching span as FAILED instead of SKIPPED
        #[arg(long)]
        fail_on_missing: bool,

        /// Collect and report performance counters
        #[arg(long)]
        metrics: bool,

        /// Per-assertion evaluation deadline in seconds
        #[arg(long, value_name = "SECS", default_value_t = 5)]
        timeout_secs: u64,

        /// Maximum assertion expression depth
        #[arg(long, value_name = "DEPTH", default_value_t = 10)]
        max_depth: usize,
    },

    /// Scan a source tree and print the extracted specs
    Parse {
        /// Source tree to scan for @ServiceSpec annotations
        #[arg(long, value_name = "DIR")]
        sources: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
        format: OutputFormat,

        /// Worker count for parsing (default 4)
        #[arg(long, value_name = "N")]
        workers: Option<usize>,
    },

    /// Ingest a trace file and print its span tree
    Trace {
        /// OTLP JSON trace file
        #[arg(long, value_name = "FILE")]
        trace: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
        format: OutputFormat,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}
