//! # The Namespace Tree
//!
//! All repositories, modules, options, collectors and queries live in one
//! tree whose paths are colon-delimited names (`repo:module:option`). The
//! tree is stored as an arena: nodes are addressed by [`NodeId`] and own
//! their children through id lists, with an explicit [`NodeType`] tag per
//! node instead of any dynamic attribute lookup.
//!
//! ## Flags
//!
//! Every node carries two pairs of flags:
//!
//! - `available`: whether the node's preconditions allow it to exist in
//!   the current build. Everything defaults to available except modules,
//!   which stay unavailable until their prepare step proves otherwise.
//! - `selected`: whether the node is part of the requested build, set by
//!   dependency resolution.
//!
//! Both flags inherit downward: a node's effective flag is the AND of its
//! own flag and all its ancestors' flags, recomputed by the tree-wide
//! [`Tree::update`] pass.

use std::fmt;
use std::path::PathBuf;

use crate::collector::CollectorData;
use crate::error::{Error, Result};
use crate::option::OptionData;
use crate::query::QueryData;

/// Path separator in fullnames.
pub const SEPARATOR: char = ':';

/// Index of a node in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// The type tag of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Config,
    Repository,
    Module,
    Option,
    Collector,
    Query,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeType::Config => "config",
            NodeType::Repository => "repository",
            NodeType::Module => "module",
            NodeType::Option => "option",
            NodeType::Collector => "collector",
            NodeType::Query => "query",
        };
        f.write_str(name)
    }
}

/// Tagged node variant: the type plus its payload.
#[derive(Debug)]
pub enum NodeKind {
    Config,
    Repository,
    Module,
    Option(OptionData),
    Collector(CollectorData),
    Query(QueryData),
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Config => NodeType::Config,
            NodeKind::Repository => NodeType::Repository,
            NodeKind::Module => NodeType::Module,
            NodeKind::Option(_) => NodeType::Option,
            NodeKind::Collector(_) => NodeType::Collector,
            NodeKind::Query(_) => NodeType::Query,
        }
    }
}

/// Renders a node's long description. Receives fullname and raw
/// description text.
pub type DescriptionFormatter = fn(&str, &str) -> String;

fn default_format_description(fullname: &str, description: &str) -> String {
    if description.is_empty() {
        format!(">> {fullname}")
    } else {
        format!(">> {fullname}\n\n{description}")
    }
}

/// One node of the namespace tree.
#[derive(Debug)]
pub struct NodeData {
    /// Leaf identifier; never contains `:` or `*`.
    pub name: String,
    /// Colon-joined path from the tree root; immutable once attached.
    pub fullname: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub kind: NodeKind,
    pub description: String,
    /// Path of the descriptor file that defined this node.
    pub filename: Option<PathBuf>,
    /// Names of nodes this node depends on; possibly partial paths.
    pub dependency_names: Vec<String>,
    /// Resolved dependency cache, invalidated when a name is added.
    pub(crate) resolved_dependencies: Option<Vec<NodeId>>,
    /// Per-node description formatter override; inherited from the
    /// nearest ancestor that customized it.
    pub format_description: Option<DescriptionFormatter>,

    available_self: bool,
    selected_self: bool,
    /// Effective flags, recomputed by [`Tree::update`].
    pub available: bool,
    pub selected: bool,
}

impl NodeData {
    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    /// Directory of the descriptor file, used to relocate relative paths.
    pub fn filepath(&self) -> Option<PathBuf> {
        self.filename
            .as_ref()
            .and_then(|f| f.parent().map(|p| p.to_path_buf()))
    }
}

/// The namespace tree arena.
#[derive(Debug)]
pub struct Tree {
    nodes: Vec<NodeData>,
    pub root: NodeId,
}

impl Tree {
    /// A new tree with a config-typed root node.
    pub fn new(project: impl Into<String>) -> Self {
        let name = project.into();
        let root = NodeData {
            fullname: name.clone(),
            name,
            parent: None,
            children: Vec::new(),
            kind: NodeKind::Config,
            description: String::new(),
            filename: None,
            dependency_names: Vec::new(),
            resolved_dependencies: None,
            format_description: None,
            available_self: true,
            selected_self: true,
            available: true,
            selected: true,
        };
        Tree {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    pub fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.0]
    }

    /// Attach a new child node under `parent`.
    ///
    /// The fullname is assigned here and never changes afterwards. A
    /// sibling with the same name is a duplicate error; names must not
    /// contain the path separator or wildcard characters.
    pub fn add_child(&mut self, parent: NodeId, name: &str, kind: NodeKind) -> Result<NodeId> {
        if name.is_empty() || name.contains(SEPARATOR) || name.contains('*') {
            return Err(Error::construction(format!(
                "Node name '{name}' must not be empty or contain ':' or '*'!"
            )));
        }
        if self
            .children(parent)
            .iter()
            .any(|&child| self.node(child).name == name)
        {
            return Err(Error::DuplicateName {
                name: name.to_string(),
                parent: self.node(parent).fullname.clone(),
            });
        }

        let fullname = if parent == self.root {
            name.to_string()
        } else {
            format!("{}{}{}", self.node(parent).fullname, SEPARATOR, name)
        };
        // Modules are unavailable until their prepare step proves
        // otherwise; everything else starts available.
        let available = !matches!(kind, NodeKind::Module);
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            name: name.to_string(),
            fullname,
            parent: Some(parent),
            children: Vec::new(),
            kind,
            description: String::new(),
            filename: None,
            dependency_names: Vec::new(),
            resolved_dependencies: None,
            format_description: None,
            available_self: available,
            selected_self: true,
            available,
            selected: true,
        });
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// All descendants of `id` in preorder, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            result.push(node);
            stack.extend(self.children(node).iter().rev());
        }
        result
    }

    /// All node ids including the root.
    pub fn all_nodes(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Depth of a node; the root has depth 0, repositories depth 1.
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = id;
        while let Some(parent) = self.node(current).parent {
            depth += 1;
            current = parent;
        }
        depth
    }

    /// The nearest ancestor (or the node itself) that is a module or
    /// repository, i.e. the unit that owns options and collectors.
    pub fn owning_module(&self, id: NodeId) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if matches!(
                self.node(node).node_type(),
                NodeType::Module | NodeType::Repository
            ) {
                return Some(node);
            }
            current = self.node(node).parent;
        }
        None
    }

    /// Whether `ancestor` is on the parent chain of `id` (or equal).
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.node(node).parent;
        }
        false
    }

    /// Set a node's own availability flag. Effective flags are stale
    /// until the next [`Tree::update`].
    pub fn set_available(&mut self, id: NodeId, available: bool) {
        self.node_mut(id).available_self = available;
    }

    /// Set a node's own selection flag.
    pub fn set_selected(&mut self, id: NodeId, selected: bool) {
        self.node_mut(id).selected_self = selected;
    }

    /// Tree-wide flag propagation pass.
    ///
    /// Recomputes every node's effective `available`/`selected` as the
    /// AND of its own flag and its ancestors'. Safe to run repeatedly.
    pub fn update(&mut self) {
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let (available, selected) = match self.node(id).parent {
                Some(parent) => {
                    let parent = self.node(parent);
                    (parent.available, parent.selected)
                }
                None => (true, true),
            };
            let node = self.node_mut(id);
            node.available = node.available_self && available;
            node.selected = node.selected_self && selected;
            stack.extend(self.children(id).iter().copied());
        }
    }

    /// Register a dependency name; invalidates the resolved cache.
    pub fn add_dependency_names<I, S>(&mut self, id: NodeId, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let node = self.node_mut(id);
        for name in names {
            node.dependency_names.push(name.into());
        }
        node.resolved_dependencies = None;
    }

    /// All nodes of one type that are effectively available (and, unless
    /// `include_unselected`, selected), in preorder.
    pub fn all_of_type(&self, node_type: NodeType, include_unselected: bool) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|&id| {
                let node = self.node(id);
                node.node_type() == node_type
                    && node.available
                    && (include_unselected || node.selected)
            })
            .collect()
    }

    /// Shorthand for all available, selected modules.
    pub fn all_modules(&self) -> Vec<NodeId> {
        self.all_of_type(NodeType::Module, false)
    }

    /// The long description of a node, rendered through the nearest
    /// customized formatter on its ancestor chain.
    pub fn description(&self, id: NodeId) -> String {
        let node = self.node(id);
        let mut current = Some(id);
        let formatter = loop {
            match current {
                Some(walk) => {
                    if let Some(formatter) = self.node(walk).format_description {
                        break formatter;
                    }
                    current = self.node(walk).parent;
                }
                None => break default_format_description as DescriptionFormatter,
            }
        };
        formatter(&node.fullname, &node.description)
    }

    /// First line of the raw description.
    pub fn short_description(&self, id: NodeId) -> String {
        self.node(id)
            .description
            .lines()
            .next()
            .unwrap_or_default()
            .to_string()
    }

    /// Assign a raw value to an option node.
    ///
    /// Dependency names extracted by the option's handler are appended to
    /// the owning module, invalidating its resolved-dependency cache.
    /// This is the only way option values feed back into dependency
    /// resolution.
    pub fn set_option_value(&mut self, id: NodeId, raw: &str) -> Result<()> {
        let fullname = self.node(id).fullname.clone();
        let actual = self.node(id).node_type().to_string();
        let extracted = match &mut self.node_mut(id).kind {
            NodeKind::Option(option) => option.set(&fullname, raw)?,
            _ => {
                return Err(Error::WrongType {
                    fullname,
                    actual,
                    requested: NodeType::Option.to_string(),
                })
            }
        };
        if !extracted.is_empty() {
            if let Some(owner) = self.owning_module(id) {
                self.add_dependency_names(owner, extracted);
            }
        }
        Ok(())
    }

    /// Borrow the option payload of a node.
    pub fn option_data(&self, id: NodeId) -> Result<&OptionData> {
        match &self.node(id).kind {
            NodeKind::Option(option) => Ok(option),
            _ => Err(Error::WrongType {
                fullname: self.node(id).fullname.clone(),
                actual: self.node(id).node_type().to_string(),
                requested: NodeType::Option.to_string(),
            }),
        }
    }

    /// Borrow the collector payload of a node.
    pub fn collector_data(&self, id: NodeId) -> Result<&CollectorData> {
        match &self.node(id).kind {
            NodeKind::Collector(collector) => Ok(collector),
            _ => Err(Error::WrongType {
                fullname: self.node(id).fullname.clone(),
                actual: self.node(id).node_type().to_string(),
                requested: NodeType::Collector.to_string(),
            }),
        }
    }

    /// Borrow the query payload of a node.
    pub fn query_data(&self, id: NodeId) -> Result<&QueryData> {
        match &self.node(id).kind {
            NodeKind::Query(query) => Ok(query),
            _ => Err(Error::WrongType {
                fullname: self.node(id).fullname.clone(),
                actual: self.node(id).node_type().to_string(),
                requested: NodeType::Query.to_string(),
            }),
        }
    }

    pub fn collector_data_mut(&mut self, id: NodeId) -> Result<&mut CollectorData> {
        let fullname = self.node(id).fullname.clone();
        let actual = self.node(id).node_type().to_string();
        match &mut self.node_mut(id).kind {
            NodeKind::Collector(collector) => Ok(collector),
            _ => Err(Error::WrongType {
                fullname,
                actual,
                requested: NodeType::Collector.to_string(),
            }),
        }
    }
}
