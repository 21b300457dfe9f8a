//! # Dependencies Command Implementation
//!
//! This module implements the `dependencies` subcommand, which emits the
//! module dependency graph in Graphviz dot format, suitable for piping
//! into `dot -Tsvg`.
//!
//! The graph starts from the requested root modules (defaulting to all
//! available modules) and follows resolved dependencies up to an
//! optional depth limit. Output is sorted so the same graph always
//! renders to the same text.

use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use modbuild::node::{NodeId, NodeType};

use super::Context;

/// Emit the module dependency graph in Graphviz format
#[derive(Args, Debug)]
pub struct DependenciesArgs {
    /// Root modules of the graph; defaults to all available modules.
    #[arg(short = 'm', long = "module", value_name = "QUERY")]
    pub modules: Vec<String>,

    /// Maximum dependency depth to follow from the roots.
    #[arg(long, value_name = "NUM")]
    pub depth: Option<usize>,

    /// Write the graph to a file instead of stdout.
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Execute the `dependencies` command.
pub fn execute(args: DependenciesArgs, context: &Context) -> Result<()> {
    let mut builder = context.builder()?;
    builder.discover()?;
    let tree = builder.tree();

    let mut roots: Vec<NodeId> = Vec::new();
    if args.modules.is_empty() {
        roots = tree.all_of_type(NodeType::Module, true);
    } else {
        for query in &args.modules {
            let mut matched = false;
            for id in tree.resolve_partial(tree.root, query) {
                if tree.node(id).node_type() == NodeType::Module {
                    matched = true;
                    if !roots.contains(&id) {
                        roots.push(id);
                    }
                }
            }
            // every query must name at least one module
            if !matched {
                anyhow::bail!("Cannot resolve module '{query}'");
            }
        }
    }

    // breadth-first over resolved dependencies
    let mut edges: Vec<(String, String)> = Vec::new();
    let mut visited = roots.clone();
    let mut frontier = roots;
    let mut remaining = args.depth.unwrap_or(usize::MAX);
    while remaining > 0 && !frontier.is_empty() {
        let mut next = Vec::new();
        for &module in &frontier {
            for dependency in tree.dependencies(module)? {
                edges.push((
                    tree.node(module).fullname.clone(),
                    tree.node(dependency).fullname.clone(),
                ));
                if !visited.contains(&dependency) {
                    visited.push(dependency);
                    next.push(dependency);
                }
            }
        }
        frontier = next;
        remaining -= 1;
    }

    let mut names: Vec<String> = visited
        .iter()
        .map(|&id| tree.node(id).fullname.clone())
        .collect();
    names.sort_unstable();
    edges.sort_unstable();
    edges.dedup();

    let mut dot = String::from("digraph dependencies {\n");
    dot.push_str("    rankdir=LR;\n");
    for name in &names {
        dot.push_str(&format!("    \"{name}\";\n"));
    }
    for (from, to) in &edges {
        dot.push_str(&format!("    \"{from}\" -> \"{to}\";\n"));
    }
    dot.push_str("}\n");

    match &args.output {
        Some(path) => fs::write(path, dot)?,
        None => print!("{dot}"),
    }
    Ok(())
}
