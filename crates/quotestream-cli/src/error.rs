use std::path::PathBuf;

use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] quotestream_core::ConfigError),

    #[error(transparent)]
    Validation(#[from] quotestream_core::ValidationError),

    #[error("{path} already exists, pass --force to overwrite")]
    OutputExists { path: PathBuf },

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error(transparent)]
    Metrics(#[from] quotestream_core::MetricsError),

    #[error("event bus setup failed: {0}")]
    EventBus(#[from] quotestream_core::BusError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Validation(_) => 2,
            Self::OutputExists { .. } => 2,
            Self::Logging(_) => 3,
            Self::Metrics(_) => 4,
            Self::EventBus(_) => 6,
            Self::Io(_) => 10,
        }
    }
}
