//! # Update Command Implementation
//!
//! This module implements the `update` subcommand, the counterpart of
//! `init` for existing checkouts: it walks the version-control entries
//! of the configuration and reports the update step for every mirror
//! that is present, and the missing ones.

use anyhow::Result;
use clap::Args;

use modbuild::output::{emoji, OutputConfig};

use super::init::destination;
use super::Context;

/// Report update steps for existing version-control mirrors
#[derive(Args, Debug)]
pub struct UpdateArgs {}

/// Execute the `update` command.
pub fn execute(_args: UpdateArgs, context: &Context) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(&context.color);
    let config = context.configuration()?;

    if config.vcs.is_empty() {
        println!("No version-control entries configured.");
        return Ok(());
    }

    for entry in &config.vcs {
        let dest = destination(entry);
        if config.base_dir().join(&dest).exists() {
            println!(
                "{} {}  run: {} -C {} pull",
                emoji(&out, "🔄", "[UPDATE]"),
                entry.url,
                entry.tool,
                dest.display()
            );
        } else {
            println!(
                "{} {} is not checked out; run 'modbuild init' first",
                emoji(&out, "❌", "[MISSING]"),
                dest.display()
            );
        }
    }
    Ok(())
}
