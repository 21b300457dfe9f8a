//! # Clean Command Implementation
//!
//! This module implements the `clean` subcommand, which removes every
//! file recorded in a persisted build log and prunes directories the
//! removal leaves empty.
//!
//! Files that were modified after the build are still removed, but a
//! warning names each one first so nothing disappears silently.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use log::warn;

use modbuild::buildlog::{BuildLog, FileState};
use modbuild::output::{emoji, OutputConfig};

use super::Context;

/// Remove previously generated files using the build log
#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Path of the build log to clean from.
    #[arg(long, value_name = "FILE")]
    pub buildlog: Option<PathBuf>,
}

/// Execute the `clean` command.
pub fn execute(args: CleanArgs, context: &Context) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(&context.color);
    let log_path = args.buildlog.unwrap_or_else(|| context.buildlog_path());
    let content = fs::read_to_string(&log_path).map_err(|error| {
        anyhow::anyhow!(
            "Cannot read build log '{}': {error}\n\n\
             hint: Run 'modbuild build' first, or pass --buildlog",
            log_path.display()
        )
    })?;
    let base = log_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let log = BuildLog::from_xml(&content, &base)?;

    let mut removed = 0;
    let mut directories = Vec::new();
    for (path, state) in log.compare_outpath() {
        match state {
            FileState::Missing => continue,
            FileState::Modified => {
                warn!("'{}' was modified after the build", path.display());
            }
            FileState::Unmodified | FileState::Unknown => {}
        }
        fs::remove_file(&path)?;
        removed += 1;
        if let Some(parent) = path.parent() {
            directories.push(parent.to_path_buf());
        }
    }

    // prune emptied directories, deepest first
    directories.sort_by_key(|directory| std::cmp::Reverse(directory.components().count()));
    directories.dedup();
    for directory in directories {
        let mut current = directory;
        while fs::remove_dir(&current).is_ok() {
            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            }
        }
    }

    fs::remove_file(&log_path)?;
    println!(
        "{} Removed {} generated file(s)",
        emoji(&out, "🧹", "[CLEAN]"),
        removed
    );
    Ok(())
}
