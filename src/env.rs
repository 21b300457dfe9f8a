//! # Build Environment
//!
//! The context handed to every module callback. It carries the namespace
//! tree, the callback's module, the output location and the simulation
//! flag, and offers the file operations modules are allowed to perform:
//! copying sources and rendering templates into the output tree, both of
//! which are recorded in the build log.
//!
//! In simulation mode all operations are logged but nothing touches the
//! filesystem, so a dry run produces the exact build log a real run
//! would.
//!
//! Collector contributions made through [`BuildEnv::collect`] are staged
//! inside the environment and applied by the scheduler once the callback
//! returns, so a failing callback contributes nothing.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::buildlog::BuildLog;
use crate::error::{Error, Result};
use crate::node::{NodeId, NodeType, Tree};
use crate::option::Value;
use crate::resolver::NameResolver;

/// Renders template sources into output text.
///
/// The default implementation substitutes `{{key}}` placeholders; richer
/// engines plug in here.
pub trait TemplateRenderer {
    fn render(
        &self,
        template: &str,
        substitutions: &BTreeMap<String, String>,
    ) -> Result<String>;
}

/// Plain `{{key}}` placeholder substitution.
///
/// Unknown and unclosed placeholders are errors: a typo in a template
/// must not silently survive into the generated output.
#[derive(Debug, Default)]
pub struct SubstitutionRenderer;

impl TemplateRenderer for SubstitutionRenderer {
    fn render(
        &self,
        template: &str,
        substitutions: &BTreeMap<String, String>,
    ) -> Result<String> {
        let mut output = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            output.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| Error::Config {
                message: "unclosed '{{' placeholder".to_string(),
                hint: None,
            })?;
            let key = after[..end].trim();
            let value = substitutions.get(key).ok_or_else(|| Error::Config {
                message: format!("unknown placeholder '{key}'"),
                hint: None,
            })?;
            output.push_str(value);
            rest = &after[end + 2..];
        }
        output.push_str(rest);
        Ok(output)
    }
}

/// A collector contribution staged during a callback.
#[derive(Debug)]
pub(crate) struct StagedCollection {
    pub collector: NodeId,
    pub values: Vec<String>,
    pub filename: Option<PathBuf>,
}

/// The per-module callback context.
pub struct BuildEnv<'a> {
    tree: &'a Tree,
    module: NodeId,
    outpath: PathBuf,
    simulate: bool,
    renderer: &'a dyn TemplateRenderer,
    /// Substitutions visible to every template of this module.
    pub substitutions: BTreeMap<String, String>,
    log: Option<&'a mut BuildLog>,
    staged: Vec<StagedCollection>,
}

impl<'a> BuildEnv<'a> {
    pub fn new(
        tree: &'a Tree,
        module: NodeId,
        outpath: impl Into<PathBuf>,
        simulate: bool,
        renderer: &'a dyn TemplateRenderer,
        log: Option<&'a mut BuildLog>,
    ) -> Self {
        BuildEnv {
            tree,
            module,
            outpath: outpath.into(),
            simulate,
            renderer,
            substitutions: BTreeMap::new(),
            log,
            staged: Vec::new(),
        }
    }

    /// Fullname of the module this environment belongs to.
    pub fn module_name(&self) -> &str {
        &self.tree.node(self.module).fullname
    }

    pub fn simulate(&self) -> bool {
        self.simulate
    }

    /// Absolute path inside the module's source directory.
    pub fn modulepath(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.module_base().join(relative)
    }

    /// Absolute path inside the owning repository's directory.
    pub fn repopath(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.repository_base().join(relative)
    }

    /// Absolute path inside the output directory.
    pub fn outpath(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.outpath.join(relative)
    }

    /// Copy a file or directory tree into the output directory.
    ///
    /// `source` is relative to the module directory; the destination
    /// defaults to the same relative path under the output directory.
    pub fn copy(&mut self, source: &str, destination: Option<&str>) -> Result<()> {
        let source_path = self.modulepath(source);
        self.check_containment(&source_path)?;
        let destination_path = self.outpath(destination.unwrap_or(source));
        self.copy_tree(&source_path, &destination_path)
    }

    fn copy_tree(&mut self, source: &Path, destination: &Path) -> Result<()> {
        if source.is_dir() {
            for entry in fs::read_dir(source)? {
                let entry = entry?;
                self.copy_tree(&entry.path(), &destination.join(entry.file_name()))?;
            }
            return Ok(());
        }
        debug!("copy {} -> {}", source.display(), destination.display());
        if !self.simulate {
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(source, destination)?;
        }
        self.record(source, destination)
    }

    /// Render a template into the output directory.
    ///
    /// `source` is relative to the module directory. The destination
    /// defaults to the source path with a trailing `.in` stripped.
    /// Per-call substitutions shadow the module-wide ones.
    pub fn template(
        &mut self,
        source: &str,
        destination: Option<&str>,
        substitutions: Option<&BTreeMap<String, String>>,
    ) -> Result<()> {
        let source_path = self.modulepath(source);
        self.check_containment(&source_path)?;
        let destination_rel = destination.unwrap_or_else(|| source.strip_suffix(".in").unwrap_or(source));
        let destination_path = self.outpath(destination_rel);

        let template = fs::read_to_string(&source_path)?;
        let mut combined;
        let active = match substitutions {
            Some(extra) => {
                combined = self.substitutions.clone();
                combined.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
                &combined
            }
            None => &self.substitutions,
        };
        let rendered =
            self.renderer
                .render(&template, active)
                .map_err(|error| Error::Template {
                    module: self.module_name().to_string(),
                    template: source.to_string(),
                    message: error.to_string(),
                })?;

        debug!(
            "template {} -> {}",
            source_path.display(),
            destination_path.display()
        );
        if !self.simulate {
            if let Some(parent) = destination_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&destination_path, rendered)?;
        }
        self.record(&source_path, &destination_path)
    }

    /// Resolve an option and return its value.
    pub fn option(&self, query: &str) -> Result<Value> {
        NameResolver::new(self.tree, self.module, NodeType::Option).value(query)
    }

    /// Resolve an option, falling back to a default when it does not
    /// resolve or has no value.
    pub fn option_or(&self, query: &str, default: Value) -> Value {
        self.option(query).unwrap_or(default)
    }

    pub fn has_option(&self, query: &str) -> bool {
        NameResolver::new(self.tree, self.module, NodeType::Option).contains(query)
    }

    /// Whether a module is part of the current selection.
    pub fn has_module(&self, query: &str) -> bool {
        NameResolver::new(self.tree, self.module, NodeType::Module).contains(query)
    }

    /// Evaluate a named query.
    pub fn query(&self, query: &str) -> Result<Value> {
        let id = NameResolver::new(self.tree, self.module, NodeType::Query).get(query)?;
        self.tree.query_data(id)?.value(self)
    }

    /// Stage values for a collector; applied after the callback returns.
    pub fn collect<I, S>(&mut self, collector: &str, values: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = NameResolver::new(self.tree, self.module, NodeType::Collector).get(collector)?;
        self.staged.push(StagedCollection {
            collector: id,
            values: values.into_iter().map(Into::into).collect(),
            filename: self.tree.node(self.module).filename.clone(),
        });
        Ok(())
    }

    /// Read a collector's accumulated values.
    pub fn collector_values(
        &self,
        collector: &str,
        default: Option<&[Value]>,
        unique: bool,
    ) -> Result<Vec<Value>> {
        let id = NameResolver::new(self.tree, self.module, NodeType::Collector).get(collector)?;
        Ok(self.tree.collector_data(id)?.values(default, None, unique))
    }

    /// Read access to the build log, when this environment carries one.
    pub fn buildlog(&self) -> Option<&BuildLog> {
        self.log.as_deref()
    }

    /// Contribute a metadata value to the build log.
    pub fn add_metadata(&mut self, key: &str, value: &str) {
        if let Some(log) = self.log.as_mut() {
            log.add_metadata(key, value);
        }
    }

    pub(crate) fn take_staged_collections(&mut self) -> Vec<StagedCollection> {
        std::mem::take(&mut self.staged)
    }

    fn record(&mut self, source: &Path, destination: &Path) -> Result<()> {
        let module = self.tree.node(self.module).fullname.clone();
        let module_base = self.module_base();
        let descriptor = self.tree.node(self.module).filename.clone();
        if let Some(log) = self.log.as_mut() {
            log.log(
                &module,
                &module_base,
                descriptor.as_deref(),
                source,
                destination,
            )?;
        }
        Ok(())
    }

    fn module_base(&self) -> PathBuf {
        self.tree
            .node(self.module)
            .filepath()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn repository_base(&self) -> PathBuf {
        let mut current = Some(self.module);
        while let Some(id) = current {
            if self.tree.node(id).node_type() == NodeType::Repository {
                if let Some(path) = self.tree.node(id).filepath() {
                    return path;
                }
            }
            current = self.tree.node(id).parent;
        }
        self.module_base()
    }

    /// Sources must come from within the owning repository.
    fn check_containment(&self, source: &Path) -> Result<()> {
        let repository = crate::option::normalize(&self.repository_base());
        let source = crate::option::normalize(source);
        if source.starts_with(&repository) {
            return Ok(());
        }
        Err(Error::Config {
            message: format!(
                "Module '{}' accesses '{}' outside its repository '{}'",
                self.module_name(),
                source.display(),
                repository.display()
            ),
            hint: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;

    #[test]
    fn test_substitution_renderer() {
        let renderer = SubstitutionRenderer;
        let mut substitutions = BTreeMap::new();
        substitutions.insert("name".to_string(), "uart".to_string());
        substitutions.insert("baud".to_string(), "115200".to_string());

        let rendered = renderer
            .render("init_{{name}}({{ baud }});", &substitutions)
            .unwrap();
        assert_eq!(rendered, "init_uart(115200);");
    }

    #[test]
    fn test_substitution_renderer_rejects_unknown_placeholder() {
        let renderer = SubstitutionRenderer;
        let error = renderer
            .render("{{missing}}", &BTreeMap::new())
            .unwrap_err();
        assert!(error.to_string().contains("missing"));
    }

    #[test]
    fn test_substitution_renderer_rejects_unclosed_placeholder() {
        let renderer = SubstitutionRenderer;
        assert!(renderer.render("{{oops", &BTreeMap::new()).is_err());
    }

    fn tree_with_module(repo_file: &Path, module_file: &Path) -> (Tree, NodeId) {
        let mut tree = Tree::new("modbuild");
        let repo = tree
            .add_child(tree.root, "repo", NodeKind::Repository)
            .unwrap();
        tree.node_mut(repo).filename = Some(repo_file.to_path_buf());
        let module = tree.add_child(repo, "uart", NodeKind::Module).unwrap();
        tree.node_mut(module).filename = Some(module_file.to_path_buf());
        tree.set_available(module, true);
        tree.update();
        (tree, module)
    }

    #[test]
    fn test_copy_and_template_into_outpath() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("repo");
        let module_dir = repo.join("uart");
        fs::create_dir_all(&module_dir).unwrap();
        fs::write(module_dir.join("uart.h"), "#pragma once\n").unwrap();
        fs::write(module_dir.join("uart.c.in"), "int baud = {{baud}};\n").unwrap();

        let (tree, module) = tree_with_module(&repo.join("repo.yaml"), &module_dir.join("module.yaml"));
        let out = dir.path().join("out");
        let renderer = SubstitutionRenderer;
        let mut log = BuildLog::new(&out);
        let mut env = BuildEnv::new(&tree, module, &out, false, &renderer, Some(&mut log));
        env.substitutions
            .insert("baud".to_string(), "9600".to_string());

        env.copy("uart.h", None).unwrap();
        env.template("uart.c.in", None, None).unwrap();

        assert_eq!(
            fs::read_to_string(out.join("uart.h")).unwrap(),
            "#pragma once\n"
        );
        assert_eq!(
            fs::read_to_string(out.join("uart.c")).unwrap(),
            "int baud = 9600;\n"
        );
        assert_eq!(log.operations().len(), 2);
        assert_eq!(log.operations()[1].destination, out.join("uart.c"));
        // every operation records the descriptor that defined the module
        assert_eq!(
            log.operations()[0].descriptor,
            Some(module_dir.join("module.yaml"))
        );
    }

    #[test]
    fn test_copy_directory_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("repo");
        let module_dir = repo.join("uart");
        fs::create_dir_all(module_dir.join("include/detail")).unwrap();
        fs::write(module_dir.join("include/uart.h"), "a").unwrap();
        fs::write(module_dir.join("include/detail/regs.h"), "b").unwrap();

        let (tree, module) = tree_with_module(&repo.join("repo.yaml"), &module_dir.join("module.yaml"));
        let out = dir.path().join("out");
        let renderer = SubstitutionRenderer;
        let mut log = BuildLog::new(&out);
        let mut env = BuildEnv::new(&tree, module, &out, false, &renderer, Some(&mut log));

        env.copy("include", Some("inc")).unwrap();
        assert!(out.join("inc/uart.h").exists());
        assert!(out.join("inc/detail/regs.h").exists());
        assert_eq!(log.operations().len(), 2);
    }

    #[test]
    fn test_simulation_logs_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("repo");
        let module_dir = repo.join("uart");
        fs::create_dir_all(&module_dir).unwrap();
        fs::write(module_dir.join("uart.h"), "x").unwrap();

        let (tree, module) = tree_with_module(&repo.join("repo.yaml"), &module_dir.join("module.yaml"));
        let out = dir.path().join("out");
        let renderer = SubstitutionRenderer;
        let mut log = BuildLog::new(&out);
        let mut env = BuildEnv::new(&tree, module, &out, true, &renderer, Some(&mut log));

        env.copy("uart.h", None).unwrap();
        assert!(!out.exists());
        assert_eq!(log.operations().len(), 1);
    }

    #[test]
    fn test_source_outside_repository_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("repo");
        let module_dir = repo.join("uart");
        fs::create_dir_all(&module_dir).unwrap();

        let (tree, module) = tree_with_module(&repo.join("repo.yaml"), &module_dir.join("module.yaml"));
        let renderer = SubstitutionRenderer;
        let mut env = BuildEnv::new(
            &tree,
            module,
            dir.path().join("out"),
            false,
            &renderer,
            None,
        );

        let error = env.copy("../../../etc/passwd", None).unwrap_err();
        assert!(error.to_string().contains("outside its repository"));
    }

    #[test]
    fn test_template_error_names_module_and_template() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("repo");
        let module_dir = repo.join("uart");
        fs::create_dir_all(&module_dir).unwrap();
        fs::write(module_dir.join("bad.c.in"), "{{nope}}").unwrap();

        let (tree, module) = tree_with_module(&repo.join("repo.yaml"), &module_dir.join("module.yaml"));
        let renderer = SubstitutionRenderer;
        let mut env = BuildEnv::new(
            &tree,
            module,
            dir.path().join("out"),
            false,
            &renderer,
            None,
        );

        let error = env.template("bad.c.in", None, None).unwrap_err();
        match error {
            Error::Template {
                module, template, ..
            } => {
                assert_eq!(module, "repo:uart");
                assert_eq!(template, "bad.c.in");
            }
            other => panic!("expected template error, got {other:?}"),
        }
    }
}
