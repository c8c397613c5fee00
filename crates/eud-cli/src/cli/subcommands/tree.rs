use clap::Subcommand;

/// Tech tree commands. Nodes accept an ID or a name.
#[derive(Clone, Debug, Subcommand)]
pub enum TreeCommands {
    /// List all nodes.
    List,
    /// Show one node with its ancestors and descendants.
    Show { node: String },
    /// Re-evaluate a node and cascade unlocks.
    UpdateProgress { node: String },
    /// Per-prerequisite status of a node.
    Prerequisites { node: String },
    /// Nodes whose prerequisites are all met.
    Available,
    /// Nodes grouped by level.
    Levels,
    /// Unlock counts and progress.
    Stats,
    /// Locked nodes closest to unlocking.
    Recommend {
        #[arg(long, default_value_t = 3)]
        count: u32,
    },
}
