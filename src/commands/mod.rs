//! # CLI Command Implementations
//!
//! This module contains the implementation for each subcommand of the
//! `modbuild` command-line tool. Each subcommand is defined in its own
//! file to keep the logic separated and maintainable.
//!
//! ## Structure
//!
//! Each command module typically contains:
//! - An `Args` struct that defines the command-specific arguments and
//!   options, derived using `clap`.
//! - An `execute` function that takes the parsed `Args` and the shared
//!   [`Context`] and performs the command's logic.
//!
//! The `execute` function orchestrates the necessary operations, calling
//! into the `modbuild` library to perform the core logic.

use std::path::PathBuf;

use anyhow::Result;

use modbuild::builder::Builder;
use modbuild::config::Configuration;
use modbuild::suggestions;

pub mod build;
pub mod clean;
pub mod dependencies;
pub mod discover;
pub mod discover_options;
pub mod init;
pub mod update;
pub mod validate;

/// Global arguments shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: PathBuf,
    pub define: Vec<String>,
    pub seed: Option<u64>,
    pub color: String,
}

impl Context {
    /// Parse the project configuration with command-line definitions
    /// applied.
    pub fn configuration(&self) -> Result<Configuration> {
        if !self.config.exists() {
            return Err(suggestions::config_not_found(&self.config));
        }
        let mut configuration = Configuration::parse(&self.config)?;
        configuration.add_commandline_options(self.define.iter().map(String::as_str))?;
        Ok(configuration)
    }

    /// A builder over the parsed configuration.
    pub fn builder(&self) -> Result<Builder> {
        Ok(Builder::new(self.configuration()?).with_seed(self.seed))
    }

    /// Default location of the persisted build log, next to the
    /// configuration file.
    pub fn buildlog_path(&self) -> PathBuf {
        self.config.with_extension("log.xml")
    }
}
