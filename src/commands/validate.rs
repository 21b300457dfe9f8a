//! # Validate Command Implementation
//!
//! This module implements the `validate` subcommand, which loads the
//! configuration, resolves the module selection and runs every module's
//! validation step without generating any files.
//!
//! All validation failures are collected and reported together, so a
//! single run shows everything that needs fixing.
//!
//! This command is a safe, read-only operation that does not modify any
//! files.

use anyhow::Result;
use clap::Args;

use modbuild::output::{emoji, OutputConfig};

use super::Context;

/// Validate the module selection without generating anything
#[derive(Args, Debug)]
pub struct ValidateArgs {}

/// Execute the `validate` command.
pub fn execute(_args: ValidateArgs, context: &Context) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(&context.color);
    println!(
        "{} Validating configuration: {}",
        emoji(&out, "🔍", "[SCAN]"),
        context.config.display()
    );

    let mut builder = context.builder()?;
    builder.validate()?;

    println!(
        "{} Validation successful: {} module(s) selected",
        emoji(&out, "✅", "[OK]"),
        builder.tree().all_modules().len()
    );
    Ok(())
}
