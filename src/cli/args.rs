//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueHint};

use crate::domain::{ActionKind, NodeId, UnitType};

/// Hierarchical tree engine for org charts and permission modules
#[derive(Parser, Debug)]
#[command(name = "orgtree")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Log verbosity: -d info, -dd debug, -ddd trace
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub debug: u8,

    /// Snapshot file (default: data_file from config)
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub file: Option<PathBuf>,

    /// Local config file (default: ./.orgtree.toml)
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Fail unless the stored tree is still at this version
    #[arg(long, global = true)]
    pub expect_version: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create an empty tree file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the forest or one subtree
    Show {
        /// Subtree root
        root: Option<NodeId>,
        /// Print the snapshot as JSON instead
        #[arg(long)]
        json: bool,
    },

    /// Add an organizational unit
    AddUnit {
        name: String,
        code: String,
        /// company, division, department or team
        #[arg(short = 't', long = "type")]
        unit_type: UnitType,
        #[arg(short, long)]
        parent: Option<NodeId>,
        /// Insert right after the sibling with this order (default: append)
        #[arg(long)]
        after: Option<i64>,
        /// Employee to attach (repeatable)
        #[arg(short, long = "employee")]
        employees: Vec<String>,
    },

    /// Add a permission module
    AddModule {
        name: String,
        #[arg(short, long)]
        parent: Option<NodeId>,
        #[arg(long)]
        after: Option<i64>,
        /// Granted actions, comma separated (default: none, i.e. disabled)
        #[arg(short, long, value_delimiter = ',')]
        actions: Vec<ActionKind>,
        #[arg(long)]
        href: Option<String>,
    },

    /// Change name, code, type or link of a node
    Update {
        node: NodeId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        code: Option<String>,
        #[arg(short = 't', long = "type")]
        unit_type: Option<UnitType>,
        #[arg(long, conflicts_with = "clear_href")]
        href: Option<String>,
        #[arg(long)]
        clear_href: bool,
    },

    /// Reparent a node (appended as last child)
    Move { node: NodeId, new_parent: NodeId },

    /// Swap the positions of two siblings
    Reorder { a: NodeId, b: NodeId },

    /// Toggle a module, or a single action on it
    Toggle {
        module: NodeId,
        #[arg(short, long)]
        action: Option<ActionKind>,
    },

    /// Activate or deactivate an org unit
    Activate {
        unit: NodeId,
        /// Deactivate instead
        #[arg(long)]
        off: bool,
        /// Apply to every descendant too
        #[arg(long)]
        subtree: bool,
    },

    /// Attach an employee to a unit (moves it from any previous unit)
    Assign { unit: NodeId, employee: String },

    /// Detach an employee into the unassigned pool
    Unassign { employee: String },

    /// Show what deleting a node would remove
    Impact { node: NodeId },

    /// Delete a node and its subtree
    Delete {
        node: NodeId,
        /// Must repeat the node's name exactly
        #[arg(long)]
        confirm: String,
    },

    /// Compute a layered layout as JSON
    Layout {
        root: NodeId,
        /// Expanded node ids, comma separated
        #[arg(short, long, value_delimiter = ',')]
        expand: Vec<NodeId>,
        /// Expand every node
        #[arg(long)]
        all: bool,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show,

    /// Show config paths
    Path,

    /// Print a commented config template
    Template,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_add_module_with_action_list() {
        let cli = Cli::try_parse_from(["orgtree", "add-module", "Reports", "-a", "view,export"]).unwrap();
        match cli.command {
            Commands::AddModule { actions, .. } => {
                assert_eq!(actions, vec![ActionKind::View, ActionKind::Export])
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_repeated_debug_flag_counts() {
        let cli = Cli::try_parse_from(["orgtree", "-dd", "show"]).unwrap();
        assert_eq!(cli.debug, 2);
    }
}
