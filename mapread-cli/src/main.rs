//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

use mapread_cli::CliError;

fn main() {
    match mapread_cli::run() {
        Ok(()) => {}
        Err(CliError::ArgumentParsing(err)) => err.exit(),
        Err(err) => {
            eprintln!("mapread: {err}");
            std::process::exit(1);
        }
    }
}
