//! Command-line interface for gisbatch.
#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};

mod append;
mod error;
mod logging;
mod tasks;

pub use error::{CliError, describe_chain};

use append::AppendArgs;

const ARG_APPEND_TASKS: &str = "tasks";
const ARG_APPEND_LOG_DIR: &str = "log-dir";
const ARG_APPEND_TOKEN: &str = "token";
const ARG_APPEND_LAST_RUN: &str = "last-run";
const ENV_APPEND_TASKS: &str = "GISBATCH_CMDS_APPEND_TASKS";

/// Run the gisbatch CLI with the current process arguments and environment.
///
/// Errors are returned only when the run cannot start: bad arguments,
/// unusable configuration, an unreadable task file or a logger that cannot
/// be installed. Failures once tasks are running are logged instead.
///
/// # Errors
///
/// Returns [`CliError`] when the run cannot start.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    match cli.command {
        Command::Append(args) => append::run_append(args),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "gisbatch",
    about = "Batched edits against hosted feature services",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Append source datasets to hosted layers and tables.
    Append(AppendArgs),
}

#[cfg(test)]
mod tests;
