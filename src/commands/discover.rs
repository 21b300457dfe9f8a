//! # Discover Command Implementation
//!
//! This module implements the `discover` subcommand, which displays the
//! namespace tree of all loaded repositories and modules in a
//! hierarchical format.
//!
//! ## Functionality
//!
//! - **Namespace Visualization**: Displays repositories, modules and
//!   submodules as a tree.
//! - **Depth Control**: Supports `--depth` to limit tree depth.
//! - **Full Listing**: `--all` additionally shows options, collectors
//!   and queries.
//!
//! This command is a safe, read-only operation that does not modify any
//! files.

use anyhow::Result;
use clap::Args;
use ptree::{print_tree, TreeItem};

use modbuild::node::{NodeId, NodeType, Tree};
use modbuild::output::{emoji, OutputConfig};

use super::Context;

/// Display the namespace tree
#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Only show the subtree below this name query.
    #[arg(long, value_name = "QUERY")]
    pub name: Option<String>,

    /// Maximum depth to display in the tree.
    #[arg(long, value_name = "NUM")]
    pub depth: Option<usize>,

    /// Also show options, collectors and queries.
    #[arg(long)]
    pub all: bool,
}

/// Execute the `discover` command.
pub fn execute(args: DiscoverArgs, context: &Context) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(&context.color);
    let mut builder = context.builder()?;
    builder.discover()?;
    let tree = builder.tree();

    println!(
        "{} Namespace of: {}",
        emoji(&out, "🌳", "[TREE]"),
        context.config.display()
    );

    let roots: Vec<NodeId> = match &args.name {
        Some(query) => vec![tree.resolve_unique(tree.root, query)?],
        None => tree.children(tree.root).to_vec(),
    };
    let max_depth = args.depth.unwrap_or(usize::MAX);
    for root in roots {
        let node = build_tree_node(tree, root, max_depth, 0, args.all);
        print_tree(&node)?;
    }
    Ok(())
}

fn build_tree_node(
    tree: &Tree,
    id: NodeId,
    max_depth: usize,
    current_depth: usize,
    all: bool,
) -> TreeNode {
    let node = tree.node(id);
    let mut label = format!("{} [{}]", node.name, node.node_type());
    if !node.available {
        label.push_str(" (unavailable)");
    }
    let short = tree.short_description(id);
    if !short.is_empty() {
        label.push_str("  ");
        label.push_str(&short);
    }

    let children = if current_depth >= max_depth {
        vec![]
    } else {
        tree.children(id)
            .iter()
            .filter(|&&child| {
                all || matches!(
                    tree.node(child).node_type(),
                    NodeType::Repository | NodeType::Module
                )
            })
            .map(|&child| build_tree_node(tree, child, max_depth, current_depth + 1, all))
            .collect()
    };
    TreeNode { label, children }
}

/// Tree node structure for ptree visualization
#[derive(Clone)]
struct TreeNode {
    label: String,
    children: Vec<TreeNode>,
}

impl TreeItem for TreeNode {
    type Child = TreeNode;

    fn write_self<W: std::io::Write>(
        &self,
        f: &mut W,
        _style: &ptree::Style,
    ) -> std::io::Result<()> {
        write!(f, "{}", self.label)
    }

    fn children(&self) -> std::borrow::Cow<'_, [Self::Child]> {
        std::borrow::Cow::Borrowed(&self.children)
    }
}
