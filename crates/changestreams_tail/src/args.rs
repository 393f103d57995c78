use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};

/// Format used when printing data change records.
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// `<commit timestamp> | <mod type> | <table> | <mods>` per record.
    #[default]
    Text,
    /// One JSON object per record.
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum LoggingMode {
    #[default]
    Pretty,
    Json,
    Compact,
}

impl From<LoggingMode> for logutil::LoggingMode {
    fn from(mode: LoggingMode) -> Self {
        match mode {
            LoggingMode::Pretty => logutil::LoggingMode::Pretty,
            LoggingMode::Json => logutil::LoggingMode::Json,
            LoggingMode::Compact => logutil::LoggingMode::Compact,
        }
    }
}

#[derive(Debug, Parser)]
#[clap(name = "changestreams-tail")]
#[clap(version)]
#[clap(about = "Tail a change stream across all of its partitions", long_about = None)]
pub struct Cli {
    /// Project id.
    #[clap(short, long)]
    pub project: String,

    /// Instance id.
    #[clap(short, long)]
    pub instance: String,

    /// Database id.
    #[clap(short, long)]
    pub database: String,

    /// Change stream id.
    #[clap(short, long)]
    pub stream: String,

    /// Output format.
    #[clap(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Start timestamp in RFC3339 format. Defaults to the current time.
    #[clap(long, value_parser = parse_timestamp)]
    pub start: Option<DateTime<Utc>>,

    /// End timestamp in RFC3339 format. Reads until interrupted if not set.
    #[clap(long, value_parser = parse_timestamp)]
    pub end: Option<DateTime<Utc>>,

    /// Database role for fine-grained access control.
    #[clap(long)]
    pub role: Option<String>,

    /// Print every read result, including heartbeats and child partitions.
    #[clap(short, long)]
    pub verbose: bool,

    /// Print the partition lineage as a Graphviz DOT graph instead of the
    /// change records.
    #[clap(long, requires_all = ["start", "end"])]
    pub visualize_partitions: bool,

    /// Heartbeat interval in milliseconds.
    #[clap(long, value_name = "MILLIS")]
    pub heartbeat_ms: Option<u64>,

    /// Read rows recorded in a JSON file, keyed by partition token.
    #[clap(long, value_name = "FILE")]
    pub replay: PathBuf,

    /// Log output format.
    #[clap(long, value_enum)]
    pub log_mode: Option<LoggingMode>,

    /// Log verbosity.
    #[clap(long, action = clap::ArgAction::Count)]
    pub log_verbosity: u8,
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC3339 timestamp '{s}': {e}"))
}
