//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

use gisbatch_cli::{CliError, describe_chain};

fn main() {
    match gisbatch_cli::run() {
        Ok(()) => {}
        // Help and version output exit successfully.
        Err(CliError::ArgumentParsing(err)) if !err.use_stderr() => err.exit(),
        Err(err) => {
            eprintln!("gisbatch: {}", describe_chain(&err));
            std::process::exit(1);
        }
    }
}
