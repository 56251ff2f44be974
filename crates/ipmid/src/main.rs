//! Command-line entry point for the `ipmid` daemon.

use std::error::Error;
use std::io::{self, Write};
use std::process::ExitCode;

use ipmid::{ProviderSet, run_daemon};
use ipmid_config::Config;

fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(error) => {
            if let Some(cli) = error.cli() {
                cli.print().unwrap_or_default();
                return if cli.use_stderr() {
                    ExitCode::FAILURE
                } else {
                    ExitCode::SUCCESS
                };
            }
            report(&error).unwrap_or_default();
            return ExitCode::FAILURE;
        }
    };

    match run_daemon(config, ProviderSet::new()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            report(&error).unwrap_or_default();
            ExitCode::FAILURE
        }
    }
}

/// Writes `error` and its source chain to stderr. Telemetry may not be
/// installed yet, so this bypasses `tracing`.
fn report(error: &dyn Error) -> io::Result<()> {
    let mut stderr = io::stderr().lock();
    writeln!(stderr, "ipmid: {error}")?;
    let mut source = error.source();
    while let Some(cause) = source {
        writeln!(stderr, "  caused by: {cause}")?;
        source = cause.source();
    }
    Ok(())
}
