//! # Name Resolution
//!
//! Queries against the namespace tree are colon-separated paths. A
//! segment that is empty or `*` matches any single node at that level; a
//! literal trailing `**` matches the node and all of its descendants;
//! every other segment must match a node name exactly.
//!
//! Resolution happens in two attempts:
//!
//! 1. the query is treated as a rooted glob against the whole tree; if
//!    that yields exactly one match, it wins.
//! 2. otherwise the query is treated as **partial**: missing or empty
//!    leading segments are filled in from the corresponding segments of
//!    the scope node's own fullname, so that a bare option name resolves
//!    relative to "where I am", and the glob runs again.
//!
//! When both attempts produce candidates the less ambiguous (fewer
//! candidates) result is preferred. No candidates at all is a no-match
//! error; more than one surviving candidate is an ambiguity error that
//! enumerates every candidate's fullname.
//!
//! The partial-fill step is implemented as a pure function over string
//! segments ([`fill_partial_name`]) because it is the most behaviorally
//! subtle part of the resolver.

use log::warn;

use crate::error::{Error, Result};
use crate::node::{NodeId, NodeType, Tree, SEPARATOR};
use crate::option::Value;
use crate::suggestions;

/// Fill the empty segments of a partial name from a scope fullname.
///
/// A single-segment name is interpreted as a leaf next to the scope node
/// itself, so the scope's full path is prepended first. The scope path is
/// then truncated to the length of the partial name, and every empty
/// segment is replaced by the scope segment at the same position.
pub fn fill_partial_name(partial: &[String], scope_parts: &[String]) -> Vec<String> {
    let mut partial: Vec<String> = partial.to_vec();
    if partial.len() == 1 {
        let mut prefixed: Vec<String> = scope_parts.to_vec();
        prefixed.append(&mut partial);
        partial = prefixed;
    }

    let depth = partial.len();
    let scope = &scope_parts[..scope_parts.len().min(depth)];

    partial
        .iter()
        .enumerate()
        .map(|(index, part)| {
            if part.is_empty() {
                scope.get(index).cloned().unwrap_or_default()
            } else {
                part.clone()
            }
        })
        .collect()
}

impl Tree {
    /// Resolve a query as a rooted glob. Returns every matching node.
    pub fn resolve(&self, query: &str) -> Vec<NodeId> {
        let segments: Vec<&str> = query
            .trim()
            .split(SEPARATOR)
            .map(|part| {
                let part = part.trim();
                if part.is_empty() {
                    "*"
                } else {
                    part
                }
            })
            .collect();

        let (path, recursive) = match segments.split_last() {
            Some((&"**", rest)) => (rest, true),
            _ => (&segments[..], false),
        };

        let mut candidates = vec![self.root];
        for segment in path {
            let mut next = Vec::new();
            for &candidate in &candidates {
                for &child in self.children(candidate) {
                    if *segment == "*" || self.node(child).name == *segment {
                        next.push(child);
                    }
                }
            }
            candidates = next;
        }

        if recursive {
            let mut expanded = Vec::new();
            for candidate in candidates {
                if candidate != self.root {
                    expanded.push(candidate);
                }
                expanded.extend(self.descendants(candidate));
            }
            candidates = expanded;
        }
        candidates.retain(|&id| id != self.root);
        candidates
    }

    /// Two-attempt partial resolution from a scope node (see module docs).
    pub fn resolve_partial(&self, scope: NodeId, query: &str) -> Vec<NodeId> {
        let direct = self.resolve(query);
        if direct.len() == 1 {
            return direct;
        }

        // wildcard segments count as "fill me in" for the second attempt
        let parts: Vec<String> = query
            .trim()
            .split(SEPARATOR)
            .map(|part| {
                let part = part.trim();
                if part == "*" {
                    String::new()
                } else {
                    part.to_string()
                }
            })
            .collect();
        let scope_parts = self.scope_parts(scope);
        let filled = fill_partial_name(&parts, &scope_parts).join(":");
        let second = self.resolve(&filled);

        match (direct.is_empty(), second.is_empty()) {
            (true, true) => Vec::new(),
            (false, true) => direct,
            (true, false) => second,
            // both found something: prefer the less ambiguous result
            (false, false) => {
                if second.len() < direct.len() {
                    second
                } else {
                    direct
                }
            }
        }
    }

    /// Resolve a query to exactly one node, or fail.
    pub fn resolve_unique(&self, scope: NodeId, query: &str) -> Result<NodeId> {
        let nodes = self.resolve_partial(scope, query);
        match nodes.len() {
            0 => Err(Error::NoMatch {
                query: query.to_string(),
                scope: self.node(scope).fullname.clone(),
                hint: self.suggest(query),
            }),
            1 => Ok(nodes[0]),
            _ => Err(Error::AmbiguousMatch {
                query: query.to_string(),
                candidates: nodes
                    .iter()
                    .map(|&id| self.node(id).fullname.clone())
                    .collect(),
            }),
        }
    }

    /// The scope segments used for partial filling. The synthetic root
    /// node is not part of any fullname and contributes nothing.
    fn scope_parts(&self, scope: NodeId) -> Vec<String> {
        if scope == self.root {
            return Vec::new();
        }
        self.node(scope)
            .fullname
            .split(SEPARATOR)
            .map(str::to_string)
            .collect()
    }

    /// A "did you mean" hint for an unresolved query.
    fn suggest(&self, query: &str) -> Option<String> {
        let leaf = query.rsplit(SEPARATOR).next().unwrap_or(query);
        let names: Vec<String> = self
            .descendants(self.root)
            .into_iter()
            .map(|id| self.node(id).name.clone())
            .collect();
        let candidates: Vec<&str> = names.iter().map(String::as_str).collect();
        suggestions::find_similar(leaf, &candidates).map(|similar| {
            let matches: Vec<String> = self
                .descendants(self.root)
                .into_iter()
                .filter(|&id| self.node(id).name == similar)
                .map(|id| self.node(id).fullname.clone())
                .collect();
            format!("Did you mean '{}'?", matches.join("', '"))
        })
    }
}

/// Typed resolver view over the tree.
///
/// Wraps the raw resolution algorithm with the checks every lookup has
/// to pass: the node must be available, must be selected (unless the
/// resolver explicitly allows unselected nodes) and must be of the
/// requested type. Each violation is a distinct error.
pub struct NameResolver<'a> {
    tree: &'a Tree,
    scope: NodeId,
    node_type: NodeType,
    enforce_selected: bool,
}

impl<'a> NameResolver<'a> {
    pub fn new(tree: &'a Tree, scope: NodeId, node_type: NodeType) -> Self {
        NameResolver {
            tree,
            scope,
            node_type,
            enforce_selected: true,
        }
    }

    /// A resolver that also returns unselected nodes.
    pub fn any_selection(tree: &'a Tree, scope: NodeId, node_type: NodeType) -> Self {
        NameResolver {
            tree,
            scope,
            node_type,
            enforce_selected: false,
        }
    }

    /// Resolve and check a query.
    pub fn get(&self, query: &str) -> Result<NodeId> {
        let id = self.tree.resolve_unique(self.scope, query)?;
        let node = self.tree.node(id);

        if !node.available {
            return Err(Error::NotAvailable {
                kind: self.node_type.to_string(),
                fullname: node.fullname.clone(),
            });
        }
        if self.enforce_selected && !node.selected {
            return Err(Error::NotSelected {
                kind: self.node_type.to_string(),
                fullname: node.fullname.clone(),
            });
        }
        if node.node_type() != self.node_type {
            return Err(Error::WrongType {
                fullname: node.fullname.clone(),
                actual: node.node_type().to_string(),
                requested: self.node_type.to_string(),
            });
        }

        self.warn_undeclared_dependency(id);
        Ok(id)
    }

    /// Resolve an option and return its converted value.
    pub fn value(&self, query: &str) -> Result<Value> {
        let id = self.get(query)?;
        let option = self.tree.option_data(id)?;
        option.value().cloned().ok_or_else(|| Error::Config {
            message: format!(
                "Option '{}' is required but has no value",
                self.tree.node(id).fullname
            ),
            hint: Some(format!("Set it with -D {}=VALUE", self.tree.node(id).fullname)),
        })
    }

    /// Whether a query resolves cleanly.
    pub fn contains(&self, query: &str) -> bool {
        self.get(query).is_ok()
    }

    /// Warn when a module reads an option/query/collector of a module it
    /// does not declare as a dependency. Non-fatal: it encourages
    /// explicit dependency declarations without breaking builds.
    fn warn_undeclared_dependency(&self, id: NodeId) {
        if !matches!(
            self.node_type,
            NodeType::Option | NodeType::Query | NodeType::Collector
        ) {
            return;
        }
        let Some(owner) = self.tree.owning_module(id) else {
            return;
        };
        let Some(requester) = self.tree.owning_module(self.scope) else {
            return;
        };
        if owner == requester || self.tree.is_ancestor_or_self(owner, self.scope) {
            return;
        }
        // repository-level options are readable by everyone
        if self.tree.node(owner).node_type() == NodeType::Repository {
            return;
        }
        let declared = self
            .tree
            .node(requester)
            .dependency_names
            .iter()
            .any(|name| {
                self.tree
                    .resolve_partial(requester, name)
                    .contains(&owner)
            });
        if !declared {
            warn!(
                "Module '{}' accesses '{}' without depending on module '{}'",
                self.tree.node(requester).fullname,
                self.tree.node(id).fullname,
                self.tree.node(owner).fullname,
            );
        }
    }
}
