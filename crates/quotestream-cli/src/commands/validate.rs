use std::process::ExitCode;

use quotestream_core::{load_config, StreamerConfig};

use crate::cli::ConfigArgs;
use crate::error::CliError;

pub fn execute(args: &ConfigArgs) -> Result<ExitCode, CliError> {
    let config = load_config(&args.config)?;
    println!("{}", summary(&config));
    Ok(ExitCode::SUCCESS)
}

fn summary(config: &StreamerConfig) -> String {
    let toggle = |enabled: bool| if enabled { "enabled" } else { "disabled" };
    format!(
        "configuration OK\n  \
         symbols:   {}\n  \
         interval:  {}s\n  \
         budget:    {} requests/hour\n  \
         storage:   {} ({})\n  \
         event bus: {} ({}, channel {})\n  \
         metrics:   {} (port {})",
        config.symbols.join(", "),
        config.polling_interval_secs,
        config.provider.max_requests_per_hour,
        toggle(config.storage.enabled),
        config.storage.base_url,
        toggle(config.event_bus.enabled),
        config.event_bus.url,
        config.event_bus.channel,
        toggle(config.metrics.enabled),
        config.metrics.port,
    )
}
