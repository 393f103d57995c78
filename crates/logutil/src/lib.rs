//! Utilities for logging.
//!
//! Everything is written to stderr. Stdout belongs to whatever the binary is
//! printing (change records, graph output).

use std::io;

use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Format of the emitted log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoggingMode {
    /// Multi-line, human readable output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
    /// Single line per event.
    Compact,
}

/// Log verbosity, usually derived from the number of times a `-v` style flag
/// was passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<u8> for Verbosity {
    fn from(value: u8) -> Self {
        match value {
            0 => Verbosity::Warn,
            1 => Verbosity::Info,
            2 => Verbosity::Debug,
            _ => Verbosity::Trace,
        }
    }
}

impl From<Verbosity> for Level {
    fn from(value: Verbosity) -> Self {
        match value {
            Verbosity::Warn => Level::WARN,
            Verbosity::Info => Level::INFO,
            Verbosity::Debug => Level::DEBUG,
            Verbosity::Trace => Level::TRACE,
        }
    }
}

/// Initialize a global trace subscriber.
///
/// `RUST_LOG` takes precedence over the provided verbosity. Calling this more
/// than once is a no-op.
pub fn init(verbosity: impl Into<Verbosity>, mode: LoggingMode) {
    let level: Level = verbosity.into().into();
    let builder = FmtSubscriber::builder()
        .with_env_filter(env_filter(level))
        .with_writer(io::stderr);

    let _ = match mode {
        LoggingMode::Json => {
            tracing::subscriber::set_global_default(builder.json().finish())
        }
        LoggingMode::Pretty => {
            tracing::subscriber::set_global_default(builder.pretty().finish())
        }
        LoggingMode::Compact => tracing::subscriber::set_global_default(
            builder.compact().with_target(false).finish(),
        ),
    };
}

/// Initialize a subscriber suitable for tests. Output is captured by the test
/// harness.
pub fn init_test() {
    let _ = FmtSubscriber::builder()
        .with_test_writer()
        .with_env_filter(env_filter(Level::DEBUG))
        .with_file(true)
        .with_line_number(true)
        .try_init();
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}
