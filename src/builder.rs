//! # The Builder
//!
//! High-level assembly of a build: load the repository descriptors named
//! by the configuration, register repositories and modules into the
//! namespace tree, merge option assignments, resolve the module
//! selection and hand the result to the runner.
//!
//! The loading pipeline is strictly ordered:
//!
//! 1. repository `init` callbacks register repositories and their
//!    options,
//! 2. repository option assignments are merged (names with exactly two
//!    segments), because module availability may depend on them,
//! 3. module `init`/`prepare` callbacks register modules, deciding
//!    availability against the repository options,
//! 4. the remaining option assignments are merged into module options,
//! 5. the requested modules are resolved and their dependency closure
//!    selects everything that will actually build.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::buildlog::BuildLog;
use crate::config::Configuration;
use crate::descriptor::{ModuleDescriptor, ModuleInit, RepositoryDescriptor, RepositoryInit};
use crate::env::{SubstitutionRenderer, TemplateRenderer};
use crate::error::{Error, Result};
use crate::node::{NodeId, NodeKind, NodeType, Tree, SEPARATOR};
use crate::resolver::NameResolver;
use crate::scheduler::Runner;

pub struct Builder {
    config: Configuration,
    tree: Tree,
    runner: Runner,
    renderer: Box<dyn TemplateRenderer>,
    pending_repositories: Vec<RepositoryDescriptor>,
    loaded: bool,
    selected: bool,
}

impl Builder {
    pub fn new(config: Configuration) -> Self {
        Builder {
            config,
            tree: Tree::new("modbuild"),
            runner: Runner::new(None),
            renderer: Box::new(SubstitutionRenderer),
            pending_repositories: Vec::new(),
            loaded: false,
            selected: false,
        }
    }

    /// Parse a configuration file and construct a builder from it.
    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Builder::new(Configuration::parse(path)?))
    }

    /// Fix the scheduler's shuffle seed, for reproducible runs.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.runner = Runner::new(seed);
        self
    }

    pub fn with_renderer(mut self, renderer: Box<dyn TemplateRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Register a repository programmatically, in addition to the ones
    /// named by the configuration.
    pub fn add_repository(&mut self, descriptor: RepositoryDescriptor) {
        self.pending_repositories.push(descriptor);
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Run the full loading pipeline including module selection.
    /// Idempotent.
    pub fn load(&mut self) -> Result<()> {
        self.discover()?;
        if self.selected {
            return Ok(());
        }
        let requested = self.requested_modules()?;
        let selection = self.tree.resolve_selection(&requested, None)?;
        info!("selected {} module(s)", selection.len());
        self.selected = true;
        Ok(())
    }

    /// Load repositories and modules without requiring a module
    /// selection, for inspection commands.
    pub fn discover(&mut self) -> Result<()> {
        if self.loaded {
            return Ok(());
        }

        let mut repositories = std::mem::take(&mut self.pending_repositories);
        for path in self.config.repositories.clone() {
            repositories.push(crate::descriptor::load_repository(&path)?);
        }
        if repositories.is_empty() {
            return Err(Error::Config {
                message: "No repositories loaded".to_string(),
                hint: Some("Add a 'repositories:' list to the configuration".to_string()),
            });
        }

        let mut registered = Vec::new();
        for descriptor in repositories {
            registered.push(self.register_repository(descriptor)?);
        }
        self.tree.update();

        self.merge_repository_options()?;

        for (repo, modules) in registered {
            self.register_modules(repo, modules)?;
        }
        self.tree.update();

        self.merge_module_options()?;
        self.tree.resolve_dependencies()?;

        self.loaded = true;
        Ok(())
    }

    /// Run the validate phase without emitting anything. Works without
    /// a configured output path.
    pub fn validate(&mut self) -> Result<()> {
        self.load()?;
        let outpath = self
            .output_path(None)
            .unwrap_or_else(|_| self.config.base_dir());
        self.runner.validate(&self.tree, &outpath, &*self.renderer)
    }

    /// Run a full build and return its log.
    ///
    /// `outpath` overrides the configuration's output path. In simulate
    /// mode the returned log describes what would have been written, and
    /// the filesystem stays untouched.
    pub fn build(&mut self, outpath: Option<&Path>, simulate: bool) -> Result<BuildLog> {
        self.load()?;
        let outpath = self.output_path(outpath)?;
        let mut log = BuildLog::new(&outpath);
        self.runner
            .build(&mut self.tree, &outpath, simulate, &*self.renderer, &mut log)?;
        Ok(log)
    }

    fn output_path(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| self.config.outpath.clone())
            .ok_or_else(|| Error::Config {
                message: "No output path given".to_string(),
                hint: Some("Pass --path or set 'outpath:' in the configuration".to_string()),
            })?;
        if path.is_absolute() {
            Ok(path)
        } else {
            Ok(self.config.base_dir().join(path))
        }
    }

    fn register_repository(
        &mut self,
        descriptor: RepositoryDescriptor,
    ) -> Result<(NodeId, Vec<ModuleDescriptor>)> {
        let mut init = RepositoryInit::default();
        (descriptor.init)(&mut init);
        if init.name.is_empty() {
            return Err(Error::construction(format!(
                "Repository '{}' did not set a name!",
                descriptor
                    .filename
                    .as_deref()
                    .unwrap_or(Path::new("<programmatic>"))
                    .display()
            )));
        }

        let repo = self
            .tree
            .add_child(self.tree.root, &init.name, NodeKind::Repository)?;
        self.tree.node_mut(repo).description = init.description;
        self.tree.node_mut(repo).filename = descriptor.filename.clone();
        for option in init.options {
            let node = self
                .tree
                .add_child(repo, &option.name, NodeKind::Option(option.data))?;
            self.tree.node_mut(node).description = option.description;
        }
        if let Some(build) = descriptor.build {
            self.runner.add_repository(repo, build);
        }
        info!("registered repository '{}'", init.name);
        Ok((repo, descriptor.modules))
    }

    /// Assign configuration options with exactly two segments; those are
    /// repository options and must exist.
    fn merge_repository_options(&mut self) -> Result<()> {
        for (name, value) in self.option_assignments(true) {
            let node = self.tree.resolve_unique(self.tree.root, &name)?;
            if self.tree.node(node).node_type() != NodeType::Option {
                return Err(Error::config(format!(
                    "'{name}' is not a repository option"
                )));
            }
            self.tree.set_option_value(node, &value)?;
        }
        Ok(())
    }

    /// Assign the remaining configuration options to module options.
    /// Options of unavailable modules are skipped with a warning, so a
    /// shared configuration may assign options of modules that are not
    /// available on every target.
    fn merge_module_options(&mut self) -> Result<()> {
        for (name, value) in self.option_assignments(false) {
            let node = self.tree.resolve_unique(self.tree.root, &name)?;
            if !self.tree.node(node).available {
                warn!("ignoring option '{name}': module is not available");
                continue;
            }
            self.tree.set_option_value(node, &value)?;
        }
        Ok(())
    }

    fn option_assignments(&self, repository_level: bool) -> Vec<(String, String)> {
        self.config
            .option_map()
            .into_iter()
            .filter(|(name, _)| {
                let segments = name.split(SEPARATOR).count();
                (segments == 2) == repository_level
            })
            .collect()
    }

    /// Register a repository's modules, resolving submodule parents.
    /// Parents may be declared in any order, so unattachable modules are
    /// retried until a pass makes no progress.
    fn register_modules(&mut self, repo: NodeId, modules: Vec<ModuleDescriptor>) -> Result<()> {
        let mut pending = Vec::new();
        for descriptor in modules {
            let mut init = ModuleInit::default();
            (descriptor.init)(&mut init);
            let resolver = NameResolver::new(&self.tree, repo, NodeType::Option);
            let available = (descriptor.prepare)(&mut init, &resolver)?;
            pending.push((init, available, descriptor));
        }

        while !pending.is_empty() {
            let mut unattached = Vec::new();
            let mut progress = false;
            for (init, available, descriptor) in pending {
                match self.parent_node(repo, init.parent.as_deref()) {
                    Some(parent) => {
                        self.attach_module(repo, parent, init, available, descriptor)?;
                        progress = true;
                    }
                    None => unattached.push((init, available, descriptor)),
                }
            }
            if !progress {
                let names: Vec<String> = unattached
                    .iter()
                    .map(|(init, _, _)| {
                        format!(
                            "'{}' (parent '{}')",
                            init.name,
                            init.parent.as_deref().unwrap_or_default()
                        )
                    })
                    .collect();
                return Err(Error::construction(format!(
                    "Cannot attach module(s) {}: parent not found!",
                    names.join(", ")
                )));
            }
            pending = unattached;
        }
        Ok(())
    }

    fn parent_node(&self, repo: NodeId, parent: Option<&str>) -> Option<NodeId> {
        let Some(parent) = parent else {
            return Some(repo);
        };
        let repo_name = &self.tree.node(repo).name;
        let fullname = if parent.contains(SEPARATOR) {
            parent.to_string()
        } else {
            format!("{repo_name}{SEPARATOR}{parent}")
        };
        self.tree
            .descendants(repo)
            .into_iter()
            .find(|&id| {
                self.tree.node(id).node_type() == NodeType::Module
                    && self.tree.node(id).fullname == fullname
            })
    }

    fn attach_module(
        &mut self,
        repo: NodeId,
        parent: NodeId,
        init: ModuleInit,
        available: bool,
        descriptor: ModuleDescriptor,
    ) -> Result<()> {
        let module = self.tree.add_child(parent, &init.name, NodeKind::Module)?;
        self.tree.node_mut(module).description = init.description;
        self.tree.node_mut(module).filename = descriptor.filename.clone();
        self.tree.set_available(module, available);

        // a submodule implicitly depends on its parent module
        if parent != repo {
            let parent_fullname = self.tree.node(parent).fullname.clone();
            self.tree.add_dependency_names(module, [parent_fullname]);
        }
        self.tree.add_dependency_names(module, init.dependencies);

        for option in init.options {
            let node = self
                .tree
                .add_child(module, &option.name, NodeKind::Option(option.data))?;
            self.tree.node_mut(node).description = option.description;
        }
        for collector in init.collectors {
            let node = self.tree.add_child(
                module,
                &collector.name,
                NodeKind::Collector(collector.data),
            )?;
            self.tree.node_mut(node).description = collector.description;
        }
        for query in init.queries {
            let node = self
                .tree
                .add_child(module, &query.name, NodeKind::Query(query.data))?;
            self.tree.node_mut(node).description = query.description;
        }

        self.runner.add(module, descriptor);
        Ok(())
    }

    /// Resolve the requested module names; glob queries may match many.
    fn requested_modules(&self) -> Result<Vec<NodeId>> {
        if self.config.modules.is_empty() {
            return Err(Error::Config {
                message: "No modules requested".to_string(),
                hint: Some("Add a 'modules:' list to the configuration".to_string()),
            });
        }
        let mut requested = Vec::new();
        for name in &self.config.modules {
            let matches: Vec<NodeId> = self
                .tree
                .resolve_partial(self.tree.root, name)
                .into_iter()
                .filter(|&id| {
                    self.tree.node(id).node_type() == NodeType::Module
                        && self.tree.node(id).available
                })
                .collect();
            if matches.is_empty() {
                // reuse the resolver's error reporting
                let resolver = NameResolver::new(&self.tree, self.tree.root, NodeType::Module);
                resolver.get(name)?;
                return Err(Error::config(format!("Cannot select module '{name}'")));
            }
            for id in matches {
                if !requested.contains(&id) {
                    requested.push(id);
                }
            }
        }
        Ok(requested)
    }
}
