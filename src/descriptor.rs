//! # Descriptors
//!
//! A descriptor is the boundary between the engine and the content it
//! builds. Programmatic users assemble [`RepositoryDescriptor`] and
//! [`ModuleDescriptor`] values from closures; the command line loads
//! declarative YAML descriptors (`repo.yaml` / `module.yaml`) which are
//! interpreted into the same closure sets.
//!
//! Module callbacks and when they run:
//!
//! - `init` declares identity: name, parent, description, options,
//!   collectors and static dependencies.
//! - `prepare` decides availability, with read access to the repository
//!   options. Required so that availability is always an explicit
//!   decision.
//! - `validate` (optional) checks preconditions without emitting files;
//!   `pre_build` is an accepted alias.
//! - `build` emits files through the environment.
//! - `post_build` (optional) runs after every module has built and may
//!   inspect the build log.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;

use crate::collector::CollectorData;
use crate::env::BuildEnv;
use crate::error::{Error, Result};
use crate::option::{DependencyHandler, OptionData, OptionKind};
use crate::query::QueryData;
use crate::resolver::NameResolver;

/// An option declared by a descriptor, not yet attached to the tree.
pub struct OptionDeclaration {
    pub name: String,
    pub description: String,
    pub data: OptionData,
}

/// A collector declared by a descriptor.
pub struct CollectorDeclaration {
    pub name: String,
    pub description: String,
    pub data: CollectorData,
}

/// A query declared by a descriptor.
pub struct QueryDeclaration {
    pub name: String,
    pub description: String,
    pub data: QueryData,
}

/// Staging area filled by a module's `init` and `prepare` callbacks,
/// registered into the tree by the builder afterwards.
#[derive(Default)]
pub struct ModuleInit {
    pub name: String,
    /// Fullname or partial name of the parent module, if any. Without
    /// one the module attaches directly under its repository.
    pub parent: Option<String>,
    pub description: String,
    pub options: Vec<OptionDeclaration>,
    pub collectors: Vec<CollectorDeclaration>,
    pub queries: Vec<QueryDeclaration>,
    pub dependencies: Vec<String>,
}

impl ModuleInit {
    pub fn add_option(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        data: OptionData,
    ) {
        self.options.push(OptionDeclaration {
            name: name.into(),
            description: description.into(),
            data,
        });
    }

    pub fn add_collector(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        data: CollectorData,
    ) {
        self.collectors.push(CollectorDeclaration {
            name: name.into(),
            description: description.into(),
            data,
        });
    }

    pub fn add_query(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        data: QueryData,
    ) {
        self.queries.push(QueryDeclaration {
            name: name.into(),
            description: description.into(),
            data,
        });
    }

    pub fn depends(&mut self, name: impl Into<String>) {
        self.dependencies.push(name.into());
    }
}

/// Staging area filled by a repository's `init` callback.
#[derive(Default)]
pub struct RepositoryInit {
    pub name: String,
    pub description: String,
    pub options: Vec<OptionDeclaration>,
}

impl RepositoryInit {
    pub fn add_option(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        data: OptionData,
    ) {
        self.options.push(OptionDeclaration {
            name: name.into(),
            description: description.into(),
            data,
        });
    }
}

pub type ModuleInitFn = Box<dyn Fn(&mut ModuleInit)>;
pub type ModulePrepareFn = Box<dyn Fn(&mut ModuleInit, &NameResolver) -> Result<bool>>;
pub type BuildStepFn = Box<dyn Fn(&mut BuildEnv) -> Result<()>>;
pub type RepositoryInitFn = Box<dyn Fn(&mut RepositoryInit)>;

/// The callback set of one module.
pub struct ModuleDescriptor {
    pub(crate) init: ModuleInitFn,
    pub(crate) prepare: ModulePrepareFn,
    pub(crate) validate: Option<BuildStepFn>,
    pub(crate) build: BuildStepFn,
    pub(crate) post_build: Option<BuildStepFn>,
    /// Path of the file that defined this module, if any.
    pub filename: Option<PathBuf>,
}

/// The callback set of one repository, plus its modules.
///
/// The optional `build` step runs during the build phase after every
/// module has built, for generation shared across the repository.
pub struct RepositoryDescriptor {
    pub(crate) init: RepositoryInitFn,
    pub(crate) build: Option<BuildStepFn>,
    pub modules: Vec<ModuleDescriptor>,
    pub filename: Option<PathBuf>,
}

/// Assembles a [`ModuleDescriptor`], verifying required callbacks.
pub struct ModuleDescriptorBuilder {
    location: String,
    init: Option<ModuleInitFn>,
    prepare: Option<ModulePrepareFn>,
    validate: Option<BuildStepFn>,
    build: Option<BuildStepFn>,
    post_build: Option<BuildStepFn>,
    filename: Option<PathBuf>,
}

impl ModuleDescriptorBuilder {
    /// `location` names the descriptor in error messages.
    pub fn new(location: impl Into<String>) -> Self {
        ModuleDescriptorBuilder {
            location: location.into(),
            init: None,
            prepare: None,
            validate: None,
            build: None,
            post_build: None,
            filename: None,
        }
    }

    pub fn init(mut self, f: impl Fn(&mut ModuleInit) + 'static) -> Self {
        self.init = Some(Box::new(f));
        self
    }

    pub fn prepare(
        mut self,
        f: impl Fn(&mut ModuleInit, &NameResolver) -> Result<bool> + 'static,
    ) -> Self {
        self.prepare = Some(Box::new(f));
        self
    }

    pub fn validate(mut self, f: impl Fn(&mut BuildEnv) -> Result<()> + 'static) -> Self {
        self.validate = Some(Box::new(f));
        self
    }

    /// Alias for [`validate`](Self::validate).
    pub fn pre_build(self, f: impl Fn(&mut BuildEnv) -> Result<()> + 'static) -> Self {
        self.validate(f)
    }

    pub fn build(mut self, f: impl Fn(&mut BuildEnv) -> Result<()> + 'static) -> Self {
        self.build = Some(Box::new(f));
        self
    }

    pub fn post_build(mut self, f: impl Fn(&mut BuildEnv) -> Result<()> + 'static) -> Self {
        self.post_build = Some(Box::new(f));
        self
    }

    pub fn filename(mut self, path: impl Into<PathBuf>) -> Self {
        self.filename = Some(path.into());
        self
    }

    pub fn finish(self) -> Result<ModuleDescriptor> {
        let missing = |callback: &str| Error::Descriptor {
            location: self.location.clone(),
            message: format!("missing required callback '{callback}'"),
        };
        Ok(ModuleDescriptor {
            init: self.init.ok_or_else(|| missing("init"))?,
            prepare: self.prepare.ok_or_else(|| missing("prepare"))?,
            validate: self.validate,
            build: self.build.ok_or_else(|| missing("build"))?,
            post_build: self.post_build,
            filename: self.filename,
        })
    }
}

/// Assembles a [`RepositoryDescriptor`].
pub struct RepositoryDescriptorBuilder {
    location: String,
    init: Option<RepositoryInitFn>,
    build: Option<BuildStepFn>,
    modules: Vec<ModuleDescriptor>,
    filename: Option<PathBuf>,
}

impl RepositoryDescriptorBuilder {
    pub fn new(location: impl Into<String>) -> Self {
        RepositoryDescriptorBuilder {
            location: location.into(),
            init: None,
            build: None,
            modules: Vec::new(),
            filename: None,
        }
    }

    pub fn init(mut self, f: impl Fn(&mut RepositoryInit) + 'static) -> Self {
        self.init = Some(Box::new(f));
        self
    }

    /// Repository-level build step, run after every module has built.
    pub fn build(mut self, f: impl Fn(&mut BuildEnv) -> Result<()> + 'static) -> Self {
        self.build = Some(Box::new(f));
        self
    }

    pub fn module(mut self, module: ModuleDescriptor) -> Self {
        self.modules.push(module);
        self
    }

    pub fn filename(mut self, path: impl Into<PathBuf>) -> Self {
        self.filename = Some(path.into());
        self
    }

    pub fn finish(self) -> Result<RepositoryDescriptor> {
        let init = self.init.ok_or_else(|| Error::Descriptor {
            location: self.location.clone(),
            message: "missing required callback 'init'".to_string(),
        })?;
        Ok(RepositoryDescriptor {
            init,
            build: self.build,
            modules: self.modules,
            filename: self.filename,
        })
    }
}

// ---------------------------------------------------------------------
// Declarative YAML descriptors
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct RepositoryFile {
    repository: RepositorySpec,
}

#[derive(Debug, Clone, Deserialize)]
struct RepositorySpec {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    options: Vec<OptionSpec>,
    /// Module descriptor files, relative to this file.
    #[serde(default)]
    modules: Vec<PathBuf>,
    /// Repository-level build actions, run after every module.
    #[serde(default)]
    build: Vec<ActionSpec>,
}

#[derive(Debug, Clone, Deserialize)]
struct ModuleFile {
    module: ModuleSpec,
}

#[derive(Debug, Clone, Deserialize)]
struct ModuleSpec {
    name: String,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    depends: Vec<String>,
    #[serde(default)]
    available_if: Vec<ConditionSpec>,
    #[serde(default)]
    options: Vec<OptionSpec>,
    #[serde(default)]
    collectors: Vec<CollectorSpec>,
    #[serde(default)]
    build: Vec<ActionSpec>,
    #[serde(default)]
    post_build: Vec<ActionSpec>,
}

/// A condition on a repository option.
#[derive(Debug, Clone, Deserialize)]
struct ConditionSpec {
    option: String,
    equals: serde_yaml::Value,
}

#[derive(Debug, Clone, Deserialize)]
struct OptionSpec {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "type")]
    kind: OptionKindSpec,
    #[serde(default)]
    values: Vec<String>,
    #[serde(default)]
    min: Option<i64>,
    #[serde(default)]
    max: Option<i64>,
    #[serde(default)]
    element: Option<OptionKindSpec>,
    #[serde(default)]
    default: Option<serde_yaml::Value>,
    /// Per-value module dependencies of an enumeration option.
    #[serde(default)]
    depends: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum OptionKindSpec {
    String,
    Path,
    Boolean,
    Numeric,
    Enum,
    Set,
}

#[derive(Debug, Clone, Deserialize)]
struct CollectorSpec {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "type")]
    kind: OptionKindSpec,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ActionSpec {
    Copy {
        copy: String,
        #[serde(default)]
        dest: Option<String>,
    },
    Template {
        template: String,
        #[serde(default)]
        dest: Option<String>,
        #[serde(default)]
        substitutions: BTreeMap<String, String>,
    },
    Collect {
        collect: String,
        values: Vec<String>,
    },
}

/// Load a declarative repository descriptor and its module files.
pub fn load_repository(path: &Path) -> Result<RepositoryDescriptor> {
    debug!("loading repository descriptor {}", path.display());
    let file: RepositoryFile = parse_file(path)?;
    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();

    // option specs must fail here, not inside the init callback
    for option in &file.repository.options {
        option_declaration(option).map_err(|error| Error::Descriptor {
            location: path.display().to_string(),
            message: error.to_string(),
        })?;
    }

    let mut builder = RepositoryDescriptorBuilder::new(path.display().to_string()).filename(path);
    for module_path in &file.repository.modules {
        builder = builder.module(load_module(&base.join(module_path))?);
    }
    let spec = file.repository;
    let build_actions = spec.build.clone();
    builder = builder.init(move |repo| {
        repo.name = spec.name.clone();
        repo.description = spec.description.clone();
        for option in &spec.options {
            if let Ok(declaration) = option_declaration(option) {
                repo.options.push(declaration);
            }
        }
    });
    if !build_actions.is_empty() {
        builder = builder.build(move |env| run_actions(env, &build_actions));
    }
    builder.finish()
}

/// Load one declarative module descriptor.
pub fn load_module(path: &Path) -> Result<ModuleDescriptor> {
    debug!("loading module descriptor {}", path.display());
    let file: ModuleFile = parse_file(path)?;
    let location = path.display().to_string();

    for option in &file.module.options {
        option_declaration(option).map_err(|error| Error::Descriptor {
            location: location.clone(),
            message: error.to_string(),
        })?;
    }

    let init_spec = file.module.clone();
    let prepare_spec = file.module.clone();
    let build_actions = file.module.build.clone();
    let post_build_actions = file.module.post_build.clone();

    let mut builder = ModuleDescriptorBuilder::new(location)
        .filename(path)
        .init(move |module| {
            module.name = init_spec.name.clone();
            module.parent = init_spec.parent.clone();
            module.description = init_spec.description.clone();
            for dependency in &init_spec.depends {
                module.depends(dependency.clone());
            }
            for option in &init_spec.options {
                if let Ok(declaration) = option_declaration(option) {
                    module.options.push(declaration);
                }
            }
            for collector in &init_spec.collectors {
                module.add_collector(
                    collector.name.clone(),
                    collector.description.clone(),
                    CollectorData::new(base_kind(collector.kind)),
                );
            }
        })
        .prepare(move |_, repo_options| {
            for condition in &prepare_spec.available_if {
                let value = repo_options.value(&condition.option)?;
                if value.to_string() != scalar_to_string(&condition.equals) {
                    return Ok(false);
                }
            }
            Ok(true)
        })
        .build(move |env| run_actions(env, &build_actions));

    if !post_build_actions.is_empty() {
        builder = builder.post_build(move |env| run_actions(env, &post_build_actions));
    }
    builder.finish()
}

fn run_actions(env: &mut BuildEnv, actions: &[ActionSpec]) -> Result<()> {
    for action in actions {
        match action {
            ActionSpec::Copy { copy, dest } => env.copy(copy, dest.as_deref())?,
            ActionSpec::Template {
                template,
                dest,
                substitutions,
            } => {
                let extra = (!substitutions.is_empty()).then_some(substitutions);
                env.template(template, dest.as_deref(), extra)?;
            }
            ActionSpec::Collect { collect, values } => {
                env.collect(collect, values.iter().cloned())?;
            }
        }
    }
    Ok(())
}

fn parse_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|error| Error::Descriptor {
        location: path.display().to_string(),
        message: error.to_string(),
    })?;
    serde_yaml::from_str(&content).map_err(|error| Error::Descriptor {
        location: path.display().to_string(),
        message: error.to_string(),
    })
}

fn base_kind(spec: OptionKindSpec) -> OptionKind {
    match spec {
        OptionKindSpec::String | OptionKindSpec::Enum | OptionKindSpec::Set => OptionKind::String,
        OptionKindSpec::Path => OptionKind::Path {
            relocate: None,
            contain: None,
        },
        OptionKindSpec::Boolean => OptionKind::Boolean,
        OptionKindSpec::Numeric => OptionKind::Numeric {
            minimum: None,
            maximum: None,
        },
    }
}

fn option_declaration(spec: &OptionSpec) -> Result<OptionDeclaration> {
    let kind = match spec.kind {
        OptionKindSpec::String => OptionKind::String,
        OptionKindSpec::Path => OptionKind::Path {
            relocate: None,
            contain: None,
        },
        OptionKindSpec::Boolean => OptionKind::Boolean,
        OptionKindSpec::Numeric => OptionKind::numeric(spec.min, spec.max)?,
        OptionKindSpec::Enum => OptionKind::enumeration_from_values(spec.values.clone())?,
        OptionKindSpec::Set => {
            let element = base_kind(spec.element.unwrap_or(OptionKindSpec::String));
            OptionKind::set(element)?
        }
    };

    let mut data = match &spec.default {
        Some(default) => {
            OptionData::new(kind).with_default(&spec.name, &scalar_to_string(default))?
        }
        None => OptionData::new(kind),
    };
    if !spec.depends.is_empty() {
        let depends = spec.depends.clone();
        data = data.with_dependency_handler(DependencyHandler(Box::new(move |input| {
            depends.get(input).cloned().unwrap_or_default()
        })));
    }
    Ok(OptionDeclaration {
        name: spec.name.clone(),
        description: spec.description.clone(),
        data,
    })
}

/// Render a YAML scalar the way a user would have typed it.
pub(crate) fn scalar_to_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .unwrap_or_default()
            .trim()
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeKind, NodeType, Tree};
    use crate::option::Value;

    #[test]
    fn test_builder_requires_callbacks() {
        let error = ModuleDescriptorBuilder::new("test")
            .init(|_| {})
            .build(|_| Ok(()))
            .finish()
            .err()
            .unwrap();
        match error {
            Error::Descriptor { message, .. } => assert!(message.contains("prepare")),
            other => panic!("expected descriptor error, got {other:?}"),
        }

        let error = ModuleDescriptorBuilder::new("test")
            .prepare(|_, _| Ok(true))
            .build(|_| Ok(()))
            .finish()
            .err()
            .unwrap();
        assert!(error.to_string().contains("init"));
    }

    #[test]
    fn test_pre_build_is_validate_alias() {
        let descriptor = ModuleDescriptorBuilder::new("test")
            .init(|_| {})
            .prepare(|_, _| Ok(true))
            .pre_build(|_| Ok(()))
            .build(|_| Ok(()))
            .finish()
            .unwrap();
        assert!(descriptor.validate.is_some());
    }

    #[test]
    fn test_yaml_module_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("module.yaml");
        fs::write(
            &path,
            r#"
module:
  name: uart
  description: Serial driver.
  depends: [repo:core]
  options:
    - name: baudrate
      type: numeric
      min: 1200
      max: 1000000
      default: 115200
    - name: dma
      type: enum
      values: [on, off]
      default: off
      depends:
        on: [repo:dma]
  build:
    - copy: uart.h
    - template: uart.c.in
      dest: src/uart.c
"#,
        )
        .unwrap();

        let descriptor = load_module(&path).unwrap();
        let mut init = ModuleInit::default();
        (descriptor.init)(&mut init);

        assert_eq!(init.name, "uart");
        assert_eq!(init.dependencies, vec!["repo:core"]);
        assert_eq!(init.options.len(), 2);
        assert_eq!(init.options[0].name, "baudrate");
        assert_eq!(
            init.options[0].data.value(),
            Some(&Value::Int(115200))
        );
        // enum dependency handler wired up
        let mut data = init.options.remove(1).data;
        let extracted = data.set("uart:dma", "on").unwrap();
        assert_eq!(extracted, vec!["repo:dma"]);
    }

    #[test]
    fn test_yaml_availability_condition() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("module.yaml");
        fs::write(
            &path,
            r#"
module:
  name: fpu
  available_if:
    - option: "repo:core"
      equals: cortex-m4
  build: []
"#,
        )
        .unwrap();
        let descriptor = load_module(&path).unwrap();

        let mut tree = Tree::new("modbuild");
        let repo = tree
            .add_child(tree.root, "repo", NodeKind::Repository)
            .unwrap();
        let core = tree
            .add_child(
                repo,
                "core",
                NodeKind::Option(OptionData::new(OptionKind::String)),
            )
            .unwrap();
        tree.update();

        tree.set_option_value(core, "cortex-m4").unwrap();
        let resolver = NameResolver::new(&tree, repo, NodeType::Option);
        let mut init = ModuleInit::default();
        assert!((descriptor.prepare)(&mut init, &resolver).unwrap());

        tree.set_option_value(core, "cortex-m0").unwrap();
        let resolver = NameResolver::new(&tree, repo, NodeType::Option);
        assert!(!(descriptor.prepare)(&mut init, &resolver).unwrap());
    }

    #[test]
    fn test_yaml_repository_loads_modules() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("repo.yaml"),
            r#"
repository:
  name: repo
  description: Test repository.
  options:
    - name: core
      type: string
  modules:
    - uart/module.yaml
"#,
        )
        .unwrap();
        fs::create_dir(dir.path().join("uart")).unwrap();
        fs::write(
            dir.path().join("uart/module.yaml"),
            r#"
module:
  name: uart
  build:
    - copy: uart.h
"#,
        )
        .unwrap();

        let descriptor = load_repository(&dir.path().join("repo.yaml")).unwrap();
        assert_eq!(descriptor.modules.len(), 1);
        assert!(descriptor.build.is_none());

        let mut init = RepositoryInit::default();
        (descriptor.init)(&mut init);
        assert_eq!(init.name, "repo");
        assert_eq!(init.options.len(), 1);
    }

    #[test]
    fn test_yaml_repository_build_actions() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("repo.yaml"),
            r#"
repository:
  name: repo
  build:
    - copy: common.h
"#,
        )
        .unwrap();

        let descriptor = load_repository(&dir.path().join("repo.yaml")).unwrap();
        assert!(descriptor.build.is_some());
    }

    #[test]
    fn test_bad_yaml_reports_location() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("module.yaml");
        fs::write(&path, "module: [not, a, mapping]").unwrap();
        let error = load_module(&path).err().unwrap();
        match error {
            Error::Descriptor { location, .. } => {
                assert!(location.contains("module.yaml"));
            }
            other => panic!("expected descriptor error, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_option_spec_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("module.yaml");
        fs::write(
            &path,
            r#"
module:
  name: broken
  options:
    - name: count
      type: numeric
      min: 10
      max: 5
  build: []
"#,
        )
        .unwrap();
        assert!(load_module(&path).is_err());
    }
}
