mod init;
mod run;
mod validate;

use std::process::ExitCode;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub async fn run(cli: &Cli) -> Result<ExitCode, CliError> {
    match &cli.command {
        Command::Run(args) => run::execute(args, cli.log_format).await,
        Command::Validate(args) => validate::execute(args),
        Command::Init(args) => init::execute(args),
    }
}
