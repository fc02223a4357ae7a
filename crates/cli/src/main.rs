use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use registrar_core::config::{AppConfig, LoadOptions, LogFormat};

fn init_logging() -> Result<()> {
    use tracing::Level;

    let config =
        AppConfig::load(LoadOptions::default()).context("loading configuration for logging")?;
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|error| anyhow!(error))
}

fn main() -> ExitCode {
    // stdout carries the JSON outcome line; logs go to stderr.
    if let Err(error) = init_logging() {
        eprintln!("logging disabled: {error:#}");
    }
    registrar_cli::run()
}
