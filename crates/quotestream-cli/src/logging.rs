//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins over the configured level when set.

use quotestream_core::LogFormat;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::CliError;

pub fn init_logging(level: &str, format: LogFormat) -> Result<(), CliError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|error| CliError::Logging(error.to_string()))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(true),
            )
            .try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
    };
    installed.map_err(|error| CliError::Logging(error.to_string()))?;

    tracing::info!(%format, "logging initialized");
    Ok(())
}
