//! # Build Command Implementation
//!
//! This module implements the `build` subcommand: the full pipeline of
//! loading repositories, resolving the module selection, validating it
//! and generating the selected modules into the output path.
//!
//! ## Functionality
//!
//! - **Output Override**: `--path` overrides the configuration's output
//!   path.
//! - **Simulation**: `--simulate` logs every operation without touching
//!   the filesystem.
//! - **Build Log**: unless `--no-log` is given, the build log is
//!   persisted next to the configuration file so `clean` can undo the
//!   build later.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;

use modbuild::output::{emoji, OutputConfig};

use super::Context;

/// Generate the selected modules into the output path
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Override the output path from the configuration.
    #[arg(long, value_name = "DIR")]
    pub path: Option<PathBuf>,

    /// Log all operations without writing any files.
    #[arg(long)]
    pub simulate: bool,

    /// Do not persist a build log.
    #[arg(long)]
    pub no_log: bool,
}

/// Execute the `build` command.
pub fn execute(args: BuildArgs, context: &Context) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(&context.color);
    let mut builder = context.builder()?;
    let log = builder.build(args.path.as_deref(), args.simulate)?;

    if args.simulate {
        println!(
            "{} Simulation: would generate {} file(s) from {} module(s)",
            emoji(&out, "🔍", "[SIM]"),
            log.operations().len(),
            log.modules().len()
        );
        for operation in log.operations() {
            println!("  {}", operation.local_destination(log.outpath()).display());
        }
        return Ok(());
    }

    if !args.no_log {
        let log_path = context.buildlog_path();
        let base = log_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        fs::write(&log_path, log.to_xml(&base, true)?)?;
    }

    println!(
        "{} Generated {} file(s) from {} module(s) into {}",
        emoji(&out, "✅", "[OK]"),
        log.operations().len(),
        log.modules().len(),
        log.outpath().display()
    );
    Ok(())
}
