//! # Dependency Resolution
//!
//! Modules declare dependencies as names; this module turns those names
//! into tree nodes and computes the transitive closure of a requested
//! module set. Resolution results are cached on the node, so resolving
//! twice is idempotent and cheap.
//!
//! Only names containing a separator are treated as module references.
//! Setting an option can feed bare ancillary names (such as enumeration
//! dependency values) into a module's dependency list; those are skipped
//! here.

use crate::error::{Error, Result};
use crate::node::{NodeId, NodeType, Tree, SEPARATOR};
use crate::resolver::NameResolver;

impl Tree {
    /// Resolve the declared dependency names of every module and
    /// repository into node ids, caching the result per node.
    ///
    /// Selection is intentionally not enforced: the closure runs before
    /// module filtering, and an unselected dependency must still resolve
    /// so it can be pulled into the selection.
    pub fn resolve_dependencies(&mut self) -> Result<()> {
        let candidates: Vec<NodeId> = self
            .descendants(self.root)
            .into_iter()
            .filter(|&id| {
                matches!(
                    self.node(id).node_type(),
                    NodeType::Module | NodeType::Repository
                ) && self.node(id).resolved_dependencies.is_none()
            })
            .collect();

        for id in candidates {
            let resolved = self.resolve_dependency_names(id)?;
            self.node_mut(id).resolved_dependencies = Some(resolved);
        }
        Ok(())
    }

    /// The resolved dependencies of a node, from the cache or on demand.
    pub fn dependencies(&self, id: NodeId) -> Result<Vec<NodeId>> {
        match &self.node(id).resolved_dependencies {
            Some(resolved) => Ok(resolved.clone()),
            None => self.resolve_dependency_names(id),
        }
    }

    fn resolve_dependency_names(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let resolver = NameResolver::any_selection(self, id, NodeType::Module);
        let mut resolved = Vec::new();
        for name in &self.node(id).dependency_names {
            if !name.contains(SEPARATOR) {
                continue;
            }
            let dependency =
                resolver
                    .get(name)
                    .map_err(|error| Error::UnresolvedDependency {
                        module: self.node(id).fullname.clone(),
                        query: name.clone(),
                        message: error.to_string(),
                    })?;
            if !resolved.contains(&dependency) {
                resolved.push(dependency);
            }
        }
        Ok(resolved)
    }

    /// Compute the dependency closure of the requested modules and mark
    /// the selection flags across the whole tree.
    ///
    /// `max_depth` bounds how many dependency hops beyond the requested
    /// set are followed; `None` follows them all. Returns every module
    /// in the closure.
    pub fn resolve_selection(
        &mut self,
        requested: &[NodeId],
        max_depth: Option<usize>,
    ) -> Result<Vec<NodeId>> {
        self.resolve_dependencies()?;

        let mut selected: Vec<NodeId> = Vec::new();
        for &id in requested {
            if !selected.contains(&id) {
                selected.push(id);
            }
        }

        let mut frontier = selected.clone();
        let mut remaining = max_depth.unwrap_or(usize::MAX);
        while remaining > 0 && !frontier.is_empty() {
            let mut additional = Vec::new();
            for &module in &frontier {
                for dependency in self.dependencies(module)? {
                    if !selected.contains(&dependency) && !additional.contains(&dependency) {
                        additional.push(dependency);
                    }
                }
            }
            if additional.is_empty() {
                break;
            }
            selected.extend(additional.iter().copied());
            frontier = additional;
            remaining -= 1;
        }

        for module in self.all_of_type(NodeType::Module, true) {
            self.set_selected(module, selected.contains(&module));
        }
        self.update();
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;

    fn module(tree: &mut Tree, parent: NodeId, name: &str, depends: &[&str]) -> NodeId {
        let id = tree.add_child(parent, name, NodeKind::Module).unwrap();
        tree.set_available(id, true);
        tree.add_dependency_names(id, depends.iter().map(|d| d.to_string()));
        id
    }

    fn chain_tree() -> (Tree, NodeId, NodeId, NodeId) {
        let mut tree = Tree::new("modbuild");
        let repo = tree
            .add_child(tree.root, "repo", NodeKind::Repository)
            .unwrap();
        let a = module(&mut tree, repo, "a", &["repo:b"]);
        let b = module(&mut tree, repo, "b", &["repo:c"]);
        let c = module(&mut tree, repo, "c", &[]);
        tree.update();
        (tree, a, b, c)
    }

    #[test]
    fn test_resolve_dependencies_caches() {
        let (mut tree, a, b, _) = chain_tree();
        tree.resolve_dependencies().unwrap();
        assert_eq!(tree.dependencies(a).unwrap(), vec![b]);
        // second resolution pass is a no-op
        tree.resolve_dependencies().unwrap();
        assert_eq!(tree.dependencies(a).unwrap(), vec![b]);
    }

    #[test]
    fn test_bare_names_are_skipped() {
        let mut tree = Tree::new("modbuild");
        let repo = tree
            .add_child(tree.root, "repo", NodeKind::Repository)
            .unwrap();
        let a = module(&mut tree, repo, "a", &["value1"]);
        tree.update();
        tree.resolve_dependencies().unwrap();
        assert!(tree.dependencies(a).unwrap().is_empty());
    }

    #[test]
    fn test_unresolved_dependency_names_module_and_query() {
        let mut tree = Tree::new("modbuild");
        let repo = tree
            .add_child(tree.root, "repo", NodeKind::Repository)
            .unwrap();
        module(&mut tree, repo, "a", &["repo:missing"]);
        tree.update();

        let error = tree.resolve_dependencies().unwrap_err();
        match error {
            Error::UnresolvedDependency { module, query, .. } => {
                assert_eq!(module, "repo:a");
                assert_eq!(query, "repo:missing");
            }
            other => panic!("expected unresolved dependency, got {other:?}"),
        }
    }

    #[test]
    fn test_full_closure() {
        let (mut tree, a, b, c) = chain_tree();
        let selected = tree.resolve_selection(&[a], None).unwrap();
        assert_eq!(selected, vec![a, b, c]);
        assert!(tree.node(b).selected);
        assert!(tree.node(c).selected);
    }

    #[test]
    fn test_max_depth_limits_closure() {
        let (mut tree, a, b, c) = chain_tree();
        let selected = tree.resolve_selection(&[a], Some(1)).unwrap();
        assert_eq!(selected, vec![a, b]);
        assert!(!tree.node(c).selected);
    }

    #[test]
    fn test_closure_is_idempotent() {
        let (mut tree, a, _, _) = chain_tree();
        let first = tree.resolve_selection(&[a], None).unwrap();
        let second = tree.resolve_selection(&first, None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unrequested_modules_are_deselected() {
        let (mut tree, a, _, c) = chain_tree();
        // select everything first, then narrow to c only
        tree.resolve_selection(&[a], None).unwrap();
        let selected = tree.resolve_selection(&[c], None).unwrap();
        assert_eq!(selected, vec![c]);
        assert!(!tree.node(a).selected);
    }

    #[test]
    fn test_dependency_cycle_terminates() {
        let mut tree = Tree::new("modbuild");
        let repo = tree
            .add_child(tree.root, "repo", NodeKind::Repository)
            .unwrap();
        let a = module(&mut tree, repo, "a", &["repo:b"]);
        let b = module(&mut tree, repo, "b", &["repo:a"]);
        tree.update();

        let selected = tree.resolve_selection(&[a], None).unwrap();
        assert_eq!(selected, vec![a, b]);
    }
}
