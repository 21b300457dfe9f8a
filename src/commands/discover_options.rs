//! # Discover-Options Command Implementation
//!
//! This module implements the `discover-options` subcommand, which lists
//! every option of the loaded repositories and modules together with its
//! current value, default and accepted inputs.
//!
//! This command is a safe, read-only operation that does not modify any
//! files.

use anyhow::Result;
use clap::Args;

use modbuild::node::{NodeId, NodeType};
use modbuild::output::{emoji, OutputConfig};

use super::Context;

/// List options with their values and descriptions
#[derive(Args, Debug)]
pub struct DiscoverOptionsArgs {
    /// Only show options below this name query.
    #[arg(long, value_name = "QUERY")]
    pub name: Option<String>,

    /// Also show options of unavailable modules.
    #[arg(long)]
    pub all: bool,
}

/// Execute the `discover-options` command.
pub fn execute(args: DiscoverOptionsArgs, context: &Context) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(&context.color);
    let mut builder = context.builder()?;
    builder.discover()?;
    let tree = builder.tree();

    let scope: Vec<NodeId> = match &args.name {
        Some(query) => {
            let root = tree.resolve_unique(tree.root, query)?;
            let mut nodes = vec![root];
            nodes.extend(tree.descendants(root));
            nodes
        }
        None => tree.descendants(tree.root),
    };

    let mut shown = 0;
    for id in scope {
        let node = tree.node(id);
        if node.node_type() != NodeType::Option {
            continue;
        }
        if !node.available && !args.all {
            continue;
        }
        let option = tree.option_data(id)?;

        let marker = if option.value().is_some() && !option.is_default() {
            emoji(&out, "✏️ ", "[SET]")
        } else {
            emoji(&out, "  ", "     ")
        };
        println!("{} {} = {}", marker, node.fullname, option.format_value());
        if let Some(default) = &option.default {
            println!("    default: {default}");
        }
        println!("    values: {}", option.kind.format_values());
        let short = tree.short_description(id);
        if !short.is_empty() {
            println!("    {short}");
        }
        shown += 1;
    }

    if shown == 0 {
        println!("No options found.");
    }
    Ok(())
}
