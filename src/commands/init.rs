//! # Init Command Implementation
//!
//! This module implements the `init` subcommand, which walks the
//! version-control entries of the configuration and reports the mirrors
//! a fresh checkout of the project expects.
//!
//! Fetching the mirrors is out of scope; the command prints the exact
//! steps so the user (or a wrapper script) can run them with the tools
//! they already have.

use anyhow::Result;
use clap::Args;

use modbuild::config::VcsEntry;
use modbuild::output::{emoji, OutputConfig};

use super::Context;

/// Report the version-control mirrors the configuration expects
#[derive(Args, Debug)]
pub struct InitArgs {}

/// Execute the `init` command.
pub fn execute(_args: InitArgs, context: &Context) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(&context.color);
    let config = context.configuration()?;

    if config.vcs.is_empty() {
        println!("No version-control entries configured.");
        return Ok(());
    }

    println!(
        "{} {} version-control entrie(s):",
        emoji(&out, "📦", "[VCS]"),
        config.vcs.len()
    );
    for entry in &config.vcs {
        let destination = destination(entry);
        let present = config.base_dir().join(&destination).exists();
        let marker = if present {
            emoji(&out, "✅", "[OK]")
        } else {
            emoji(&out, "❌", "[MISSING]")
        };
        println!("  {} {} {}", marker, entry.url, destination.display());
        if !present {
            println!("      run: {} clone {} {}", entry.tool, entry.url, destination.display());
        }
    }
    Ok(())
}

/// Checkout location of a mirror, derived from the URL when the entry
/// does not name one.
pub(crate) fn destination(entry: &VcsEntry) -> std::path::PathBuf {
    entry.path.clone().unwrap_or_else(|| {
        let name = entry
            .url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("mirror")
            .trim_end_matches(".git");
        std::path::PathBuf::from(name)
    })
}
