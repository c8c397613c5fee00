use std::path::PathBuf;

use clap::Subcommand;

/// Catalog commands.
#[derive(Clone, Debug, Subcommand)]
pub enum CatalogCommands {
    /// Import taxonomies, arts and tech tree nodes from a TOML file.
    Import { file: PathBuf },
    /// List arts, optionally filtered.
    Arts {
        /// Only arts improving this virtue, strongest first.
        #[arg(long, conflicts_with_all = ["taxonomy", "related", "featured"])]
        virtue: Option<String>,
        /// Only arts under this taxonomy (ID or name), including descendants.
        #[arg(long, conflicts_with_all = ["related", "featured"])]
        taxonomy: Option<String>,
        /// Arts related to this art (ID or name).
        #[arg(long, conflicts_with = "featured")]
        related: Option<String>,
        /// Only arts unlocked by default.
        #[arg(long)]
        featured: bool,
    },
    /// Show one art with its parts and stages.
    Art { art: String },
    /// Show the taxonomy tree, or one taxonomy with its children and arts.
    Taxonomy {
        /// Taxonomy ID or name.
        taxonomy: Option<String>,
        /// Per-category mastery stats for `--user`.
        #[arg(long, conflicts_with = "taxonomy")]
        stats: bool,
    },
}
