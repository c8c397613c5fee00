use clap::Subcommand;

/// Mastery commands. Arts and parts accept an ID or a name.
#[derive(Clone, Debug, Subcommand)]
pub enum ArtCommands {
    /// Discover an art.
    Discover {
        art: String,
        /// Part to point at first.
        #[arg(long)]
        part: Option<String>,
    },
    /// Log a practice session for one part.
    Practice {
        art: String,
        part: String,
        #[arg(long)]
        minutes: u32,
        #[arg(long)]
        notes: Option<String>,
        /// Mark the part completed.
        #[arg(long)]
        complete: bool,
        /// Self-rating, 1..=5.
        #[arg(long)]
        rating: Option<u8>,
        /// RFC 3339 timestamp (defaults to now).
        #[arg(long)]
        at: Option<String>,
    },
    /// Validate a practice session.
    Validate { session: String },
    /// Mastery record, stage progress and part status for one art.
    Show { art: String },
    /// Practice statistics over a trailing window.
    Stats {
        #[arg(long)]
        art: Option<String>,
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
    /// Arts the user may discover.
    Available {
        /// Also list arts already discovered.
        #[arg(long)]
        include_discovered: bool,
    },
    /// Overall mastery summary.
    Summary,
    /// Practice sessions, newest first.
    History {
        #[arg(long)]
        art: Option<String>,
    },
}
