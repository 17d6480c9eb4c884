//! Command-line interface answering node read requests from a SQLite store.
#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};

mod error;
mod nodes;

pub use error::CliError;

use nodes::NodesArgs;

const ARG_DATABASE: &str = "database";
const ARG_METHOD: &str = "method";
const ARG_QUERY: &str = "query";
const ARG_FORMAT: &str = "format";
const ENV_DATABASE: &str = "MAPREAD_CMDS_NODES_DATABASE";

/// Run the mapread CLI with the current process arguments and environment.
///
/// # Errors
///
/// Returns [`CliError`] when the arguments or configuration are invalid,
/// when the request is rejected before the document begins, or when the
/// document cannot be written to stdout.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    match cli.command {
        Command::Nodes(args) => {
            let mut stdout = std::io::stdout().lock();
            nodes::run_nodes(args, &mut stdout)?;
        }
    }
    Ok(())
}

#[derive(Debug, Parser)]
#[command(
    name = "mapread",
    about = "Read-only access to map nodes stored in SQLite",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Stream the requested nodes as a document on stdout.
    Nodes(NodesArgs),
}

#[cfg(test)]
mod tests;
