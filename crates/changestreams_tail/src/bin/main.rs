use std::process::ExitCode;

use changestreams_tail::args::Cli;
use clap::Parser;
use tracing::info;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Help and version go to stdout and are not failures.
            let code = if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            let _ = err.print();
            return code;
        }
    };

    // Stay quiet unless asked, stderr already carries progress messages.
    if cli.log_mode.is_some() || cli.log_verbosity > 0 {
        logutil::init(cli.log_verbosity, cli.log_mode.unwrap_or_default().into());
    }

    info!(version = env!("CARGO_PKG_VERSION"), "starting...");

    match cli.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
