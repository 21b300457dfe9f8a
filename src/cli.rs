//! CLI argument parsing and command dispatch

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::{self, Context};


/// modbuild - Modular code generation build tool
#[derive(Parser, Debug)]
#[command(name = "modbuild")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Path to the project configuration file
    #[arg(
        short = 'c',
        long,
        global = true,
        value_name = "FILE",
        default_value = "modbuild.yaml",
        env = "MODBUILD_CONFIG"
    )]
    config: PathBuf,

    /// Define an option value (NAME=VALUE); overrides the configuration
    #[arg(short = 'D', long = "define", global = true, value_name = "NAME=VALUE")]
    define: Vec<String>,

    /// Fix the scheduler's shuffle seed for reproducible runs
    #[arg(long, global = true, value_name = "SEED")]
    seed: Option<u64>,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Display the namespace tree of all repositories and modules
    Discover(commands::discover::DiscoverArgs),
    /// List options with their values, defaults and descriptions
    DiscoverOptions(commands::discover_options::DiscoverOptionsArgs),
    /// Validate the module selection without generating anything
    Validate(commands::validate::ValidateArgs),
    /// Generate the selected modules into the output path
    Build(commands::build::BuildArgs),
    /// Remove previously generated files using the build log
    Clean(commands::clean::CleanArgs),
    /// Report the version-control mirrors the configuration expects
    Init(commands::init::InitArgs),
    /// Report update steps for existing version-control mirrors
    Update(commands::update::UpdateArgs),
    /// Emit the module dependency graph in Graphviz format
    Dependencies(commands::dependencies::DependenciesArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(&self.log_level),
        )
        .init();

        let context = Context {
            config: self.config,
            define: self.define,
            seed: self.seed,
            color: self.color,
        };

        match self.command {
            Commands::Discover(args) => commands::discover::execute(args, &context),
            Commands::DiscoverOptions(args) => commands::discover_options::execute(args, &context),
            Commands::Validate(args) => commands::validate::execute(args, &context),
            Commands::Build(args) => commands::build::execute(args, &context),
            Commands::Clean(args) => commands::clean::execute(args, &context),
            Commands::Init(args) => commands::init::execute(args, &context),
            Commands::Update(args) => commands::update::execute(args, &context),
            Commands::Dependencies(args) => commands::dependencies::execute(args, &context),
        }
    }
}
