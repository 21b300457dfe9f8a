//! # Modular Build Library
//!
//! This library provides the core functionality for assembling software
//! projects from modular code repositories. It is designed to be used by
//! the `modbuild` command-line tool but can also be embedded into other
//! applications that need programmatic control over module discovery,
//! configuration and code generation.
//!
//! ## Quick Example
//!
//! ```
//! use modbuild::config::Configuration;
//! use modbuild::builder::Builder;
//! use modbuild::descriptor::{ModuleDescriptorBuilder, RepositoryDescriptorBuilder};
//!
//! let uart = ModuleDescriptorBuilder::new("uart")
//!     .init(|module| {
//!         module.name = "uart".to_string();
//!         module.description = "Serial driver.".to_string();
//!     })
//!     .prepare(|_, _| Ok(true))
//!     .build(|_| Ok(()))
//!     .finish()
//!     .unwrap();
//! let repo = RepositoryDescriptorBuilder::new("repo")
//!     .init(|repo| repo.name = "repo".to_string())
//!     .module(uart)
//!     .finish()
//!     .unwrap();
//!
//! let mut config = Configuration::default();
//! config.modules.push("repo:uart".to_string());
//!
//! let mut builder = Builder::new(config);
//! builder.add_repository(repo);
//! builder.load().unwrap();
//! assert_eq!(builder.tree().all_modules().len(), 1);
//! ```
//!
//! ## Core Concepts
//!
//! The library is built around a few key concepts:
//!
//! - **Namespace Tree (`node`)**: Repositories, modules, options,
//!   collectors and queries all live in one tree addressed by
//!   colon-delimited names.
//! - **Name Resolution (`resolver`)**: Partial and glob queries against
//!   the tree, with type, availability and selection checks.
//! - **Descriptors (`descriptor`)**: The callback boundary between the
//!   engine and the content it builds, with a declarative YAML form.
//! - **Options (`option`)**: Typed, validated configuration values that
//!   can feed back into dependency resolution.
//! - **Build Pipeline (`builder`, `scheduler`, `env`)**: Loads
//!   repositories, resolves the module selection and runs the module
//!   callbacks phase by phase.
//! - **Build Log (`buildlog`)**: Records every generated file, detects
//!   write conflicts and enables cleaning a previous build.
//!
//! ## Execution Flow
//!
//! The main entry point is [`builder::Builder`], which executes the
//! following high-level steps:
//!
//! 1.  **Loading**: Register repositories and their options.
//! 2.  **Preparation**: Register modules and decide their availability
//!     against the repository options.
//! 3.  **Selection**: Resolve the requested modules and their
//!     transitive dependency closure.
//! 4.  **Validation**: Run every module's validation step, collecting
//!     all failures.
//! 5.  **Generation**: Run the build and post-build steps, deepest
//!     modules first, recording every emitted file in the build log.

pub mod buildlog;
pub mod builder;
pub mod collector;
pub mod config;
pub mod deps;
pub mod descriptor;
pub mod env;
pub mod error;
pub mod node;
pub mod option;
pub mod output;
pub mod query;
pub mod resolver;
pub mod scheduler;
pub mod suggestions;

#[cfg(test)]
mod resolver_proptest;
