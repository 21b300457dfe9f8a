//! # Build Scheduling
//!
//! The runner drives module callbacks through three phases: validate,
//! build and post-build. Within each phase modules are grouped by their
//! depth in the namespace tree and the deepest group runs first, so
//! submodules always run before the modules containing them.
//!
//! Inside a depth group the execution order is deliberately randomized:
//! modules of equal depth must not depend on their relative execution
//! order, and shuffling every run surfaces such hidden coupling early
//! instead of letting it calcify. A fixed seed makes the shuffle
//! reproducible for debugging.
//!
//! Validation runs every module and aggregates all failures so a single
//! run reports everything that is wrong. The build and post-build phases
//! abort on the first error.

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::buildlog::BuildLog;
use crate::collector::CollectorContext;
use crate::descriptor::{BuildStepFn, ModuleDescriptor};
use crate::env::{BuildEnv, StagedCollection, TemplateRenderer};
use crate::error::{Error, Result};
use crate::node::{NodeId, NodeType, Tree};

/// Executes module callbacks in phase order.
pub struct Runner {
    entries: Vec<(NodeId, ModuleDescriptor)>,
    /// Repository-level build steps; run after every module has built.
    repositories: Vec<(NodeId, BuildStepFn)>,
    seed: Option<u64>,
}

impl Runner {
    pub fn new(seed: Option<u64>) -> Self {
        Runner {
            entries: Vec::new(),
            repositories: Vec::new(),
            seed,
        }
    }

    /// Register a module's callbacks under its tree node.
    pub fn add(&mut self, module: NodeId, descriptor: ModuleDescriptor) {
        self.entries.push((module, descriptor));
    }

    /// Register a repository's build step under its tree node.
    pub fn add_repository(&mut self, repository: NodeId, build: BuildStepFn) {
        self.repositories.push((repository, build));
    }

    /// Run the validate phase.
    ///
    /// Checks that every option of every selected module carries a value
    /// and then runs all `validate` callbacks, collecting every failure.
    /// A single failure is returned as-is; multiple failures are
    /// aggregated into one error.
    pub fn validate(
        &self,
        tree: &Tree,
        outpath: &Path,
        renderer: &dyn TemplateRenderer,
    ) -> Result<()> {
        let mut errors = Vec::new();

        for module in tree.all_modules() {
            for id in tree.descendants(module) {
                let node = tree.node(id);
                if node.node_type() != NodeType::Option
                    || !node.available
                    || !node.selected
                    || tree.owning_module(id) != Some(module)
                {
                    continue;
                }
                if let Ok(option) = tree.option_data(id) {
                    if option.value().is_none() {
                        errors.push(Error::Config {
                            message: format!("Option '{}' has no value", node.fullname),
                            hint: Some(format!("Set it with -D {}=VALUE", node.fullname)),
                        });
                    }
                }
            }
        }

        for &index in &self.ordered_entries(tree) {
            let (module, descriptor) = &self.entries[index];
            if !self.runnable(tree, *module) {
                continue;
            }
            if let Some(validate) = &descriptor.validate {
                debug!("validate {}", tree.node(*module).fullname);
                let mut env = BuildEnv::new(tree, *module, outpath, true, renderer, None);
                env.substitutions = substitutions_for(tree, *module);
                if let Err(error) = validate(&mut env) {
                    errors.push(error);
                }
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.pop().unwrap_or_else(|| Error::config("validation failed"))),
            _ => Err(Error::Aggregate { errors }),
        }
    }

    /// Run all three phases and record emissions into the build log.
    pub fn build(
        &self,
        tree: &mut Tree,
        outpath: &Path,
        simulate: bool,
        renderer: &dyn TemplateRenderer,
        log: &mut BuildLog,
    ) -> Result<()> {
        self.validate(tree, outpath, renderer)?;

        let order = self.ordered_entries(tree);
        for &index in &order {
            let (module, descriptor) = &self.entries[index];
            let module = *module;
            if !self.runnable(tree, module) {
                continue;
            }
            info!("build {}", tree.node(module).fullname);
            let staged = {
                let fullname = tree.node(module).fullname.clone();
                let mut env =
                    BuildEnv::new(&*tree, module, outpath, simulate, renderer, Some(log));
                env.substitutions = substitutions_for(&*tree, module);
                (descriptor.build)(&mut env).map_err(|error| build_error(&fullname, error))?;
                env.take_staged_collections()
            };
            apply_staged(tree, module, staged)?;
        }

        // repositories are the shallowest depth group, so their build
        // step closes the build phase
        for (repository, build) in &self.repositories {
            let repository = *repository;
            if !self.runnable(tree, repository) {
                continue;
            }
            info!("build {}", tree.node(repository).fullname);
            let staged = {
                let fullname = tree.node(repository).fullname.clone();
                let mut env =
                    BuildEnv::new(&*tree, repository, outpath, simulate, renderer, Some(log));
                env.substitutions = substitutions_for(&*tree, repository);
                build(&mut env).map_err(|error| build_error(&fullname, error))?;
                env.take_staged_collections()
            };
            apply_staged(tree, repository, staged)?;
        }

        for &index in &order {
            let (module, descriptor) = &self.entries[index];
            let module = *module;
            if !self.runnable(tree, module) {
                continue;
            }
            if let Some(post_build) = &descriptor.post_build {
                debug!("post-build {}", tree.node(module).fullname);
                let staged = {
                    let fullname = tree.node(module).fullname.clone();
                    let mut env =
                        BuildEnv::new(&*tree, module, outpath, simulate, renderer, Some(log));
                    env.substitutions = substitutions_for(&*tree, module);
                    post_build(&mut env).map_err(|error| build_error(&fullname, error))?;
                    env.take_staged_collections()
                };
                apply_staged(tree, module, staged)?;
            }
        }
        Ok(())
    }

    fn runnable(&self, tree: &Tree, module: NodeId) -> bool {
        let node = tree.node(module);
        node.available && node.selected
    }

    /// Entry indices in execution order: deepest depth group first,
    /// shuffled within each group.
    fn ordered_entries(&self, tree: &Tree) -> Vec<usize> {
        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (index, (module, _)) in self.entries.iter().enumerate() {
            groups.entry(tree.depth(*module)).or_default().push(index);
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut order = Vec::new();
        for (_, mut group) in groups.into_iter().rev() {
            group.shuffle(&mut rng);
            order.extend(group);
        }
        order
    }
}

/// Apply collector contributions staged during a callback.
fn apply_staged(tree: &mut Tree, module: NodeId, staged: Vec<StagedCollection>) -> Result<()> {
    let module_name = tree.node(module).fullname.clone();
    for collection in staged {
        let fullname = tree.node(collection.collector).fullname.clone();
        let context = match collection.filename {
            Some(filename) => CollectorContext::with_file(module_name.clone(), filename),
            None => CollectorContext::new(module_name.clone()),
        };
        tree.collector_data_mut(collection.collector)?
            .add_values(&fullname, &collection.values, context)?;
    }
    Ok(())
}

/// Template and overwrite errors keep their identity; everything else is
/// wrapped with the failing module's name.
fn build_error(module: &str, error: Error) -> Error {
    match error {
        error @ (Error::Template { .. } | Error::OverwritingFile { .. }) => error,
        other => Error::Build {
            module: module.to_string(),
            message: other.to_string(),
        },
    }
}

/// Template substitutions visible to a module: every set option by
/// fullname, the module's own options additionally by their local name,
/// and the module's own fullname as `module`.
fn substitutions_for(tree: &Tree, module: NodeId) -> BTreeMap<String, String> {
    let mut substitutions = BTreeMap::new();
    for id in tree.all_of_type(NodeType::Option, false) {
        let Ok(option) = tree.option_data(id) else {
            continue;
        };
        let Some(value) = option.value() else {
            continue;
        };
        let node = tree.node(id);
        substitutions.insert(node.fullname.clone(), value.to_string());
        if tree.is_ancestor_or_self(module, id) {
            substitutions.insert(node.name.clone(), value.to_string());
        }
    }
    substitutions.insert("module".to_string(), tree.node(module).fullname.clone());
    substitutions
}
