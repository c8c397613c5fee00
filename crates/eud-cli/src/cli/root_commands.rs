use clap::{Args, Subcommand};

use crate::cli::subcommands::{ArtCommands, CatalogCommands, ProfileCommands, TreeCommands};

/// Top-level command tree.
#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Player profiles and resources.
    Profile {
        #[command(subcommand)]
        action: ProfileCommands,
    },
    /// Taxonomies, arts and catalog import.
    Catalog {
        #[command(subcommand)]
        action: CatalogCommands,
    },
    /// Discovery, practice and mastery.
    Art {
        #[command(subcommand)]
        action: ArtCommands,
    },
    /// Tech tree progress and unlocks.
    Tree {
        #[command(subcommand)]
        action: TreeCommands,
    },
    /// Query the audit trail.
    Audit(AuditArgs),
}

/// Arguments for `eud audit`.
#[derive(Clone, Debug, Args)]
pub struct AuditArgs {
    /// Entity type filter (e.g. `mastery`, `tech_tree_progress`).
    #[arg(long)]
    pub entity: Option<String>,
    /// Entity ID filter.
    #[arg(long)]
    pub id: Option<String>,
    /// Action filter (e.g. `unlocked`, `practiced`).
    #[arg(long)]
    pub action: Option<String>,
    /// Include entries from every user instead of only `--user`.
    #[arg(long)]
    pub all_users: bool,
}
