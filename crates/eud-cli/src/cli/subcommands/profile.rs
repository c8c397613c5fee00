use clap::Subcommand;

/// Player profile commands. All act on the global `--user`.
#[derive(Clone, Debug, Subcommand)]
pub enum ProfileCommands {
    /// Create a profile.
    Create {
        /// Player rank, 1..=4.
        #[arg(long, default_value_t = 1)]
        rank: u8,
        /// Economic layer: port, laws, republic.
        #[arg(long, default_value = "port")]
        layer: String,
    },
    /// Show the profile with virtues and resources.
    Show,
    /// Change rank or economic layer.
    Update {
        #[arg(long)]
        rank: Option<u8>,
        #[arg(long)]
        layer: Option<String>,
    },
    /// Set a resource amount.
    SetResource { resource: String, amount: i64 },
    /// Recent virtue changes, newest first.
    Virtues,
}
