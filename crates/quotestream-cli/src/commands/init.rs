use std::fs;
use std::process::ExitCode;

use quotestream_core::StreamerConfig;

use crate::cli::InitArgs;
use crate::error::CliError;

pub fn execute(args: &InitArgs) -> Result<ExitCode, CliError> {
    if args.output.exists() && !args.force {
        return Err(CliError::OutputExists {
            path: args.output.clone(),
        });
    }

    let rendered = StreamerConfig::default().to_yaml()?;
    fs::write(&args.output, rendered)?;

    println!("wrote default configuration to {}", args.output.display());
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use quotestream_core::load_config;

    use super::*;

    #[test]
    fn writes_a_loadable_default_config() {
        let dir = tempfile::tempdir().expect("temp dir");
        let output = dir.path().join("quotestream.yaml");

        execute(&InitArgs {
            output: output.clone(),
            force: false,
        })
        .expect("init succeeds");

        let config = load_config(&output).expect("written config loads");
        assert_eq!(config, StreamerConfig::default());
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().expect("temp dir");
        let output = dir.path().join("quotestream.yaml");
        fs::write(&output, "symbols: [AAPL]\n").expect("seed file");

        let error = execute(&InitArgs {
            output: output.clone(),
            force: false,
        })
        .expect_err("existing file");
        assert!(matches!(error, CliError::OutputExists { .. }));

        execute(&InitArgs {
            output: output.clone(),
            force: true,
        })
        .expect("forced overwrite");
        assert!(fs::read_to_string(&output)
            .expect("read back")
            .contains("polling_interval_secs"));
    }
}
