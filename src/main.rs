//! # Modular Build CLI
//!
//! This is the binary entry point for the `modbuild` command-line tool.
//!
//! Its primary responsibilities are:
//! - Parsing command-line arguments using `clap`.
//! - Executing the appropriate command based on the parsed arguments.
//! - Handling top-level application errors, translating them into
//!   user-friendly output and the documented process exit codes.
//!
//! The core application logic is defined in the `lib.rs` library crate,
//! ensuring that the binary is a thin wrapper around the reusable
//! library functionality.

mod cli;
mod commands;

use clap::Parser;

fn main() {
    let cli = cli::Cli::parse();
    if let Err(error) = cli.execute() {
        eprintln!("Error: {error:#}");
        let code = error
            .downcast_ref::<modbuild::error::Error>()
            .map(modbuild::error::Error::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}
