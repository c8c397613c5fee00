use clap::Parser;

pub mod global;
pub mod root_commands;
pub mod subcommands;

pub use global::{GlobalFlags, OutputFormat};
pub use root_commands::Commands;

/// Top-level CLI parser for the `eud` binary.
#[derive(Debug, Parser)]
#[command(name = "eud", version, about = "Eudaimonia - art mastery and tech tree progression")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: json, raw
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Max results to return
    #[arg(short, long, global = true)]
    pub limit: Option<u32>,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Database path (overrides `database.path`)
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// Acting user ID (overrides `general.default_user`)
    #[arg(short, long, global = true)]
    pub user: Option<String>,
}

impl Cli {
    /// Extract ergonomic global flags struct for command handlers.
    #[must_use]
    pub fn global_flags(&self) -> GlobalFlags {
        GlobalFlags {
            format: self.format,
            limit: self.limit,
            quiet: self.quiet,
            verbose: self.verbose,
            db: self.db.clone(),
            user: self.user.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::subcommands::{ArtCommands, CatalogCommands, TreeCommands};
    use super::{Cli, Commands, GlobalFlags, OutputFormat};

    #[test]
    fn clap_command_tree_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_before_subcommand() {
        let cli = Cli::try_parse_from([
            "eud", "--format", "raw", "--limit", "10", "--verbose", "--user", "u1", "tree", "levels",
        ])
        .expect("cli should parse");
        assert_eq!(cli.format, OutputFormat::Raw);
        assert_eq!(cli.limit, Some(10));
        assert!(cli.verbose);
        assert_eq!(cli.user.as_deref(), Some("u1"));
        assert!(matches!(
            cli.command,
            Commands::Tree {
                action: TreeCommands::Levels
            }
        ));
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from(["eud", "art", "summary", "--format", "raw", "--quiet"])
            .expect("cli should parse");
        assert_eq!(cli.format, OutputFormat::Raw);
        assert!(cli.quiet);
        assert!(matches!(
            cli.command,
            Commands::Art {
                action: ArtCommands::Summary
            }
        ));
    }

    #[test]
    fn output_format_rejects_invalid_value() {
        let parsed = Cli::try_parse_from(["eud", "--format", "xml", "art", "summary"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn practice_parses_minutes_and_completion() {
        let cli = Cli::try_parse_from([
            "eud", "art", "practice", "Violin", "Bow hold", "--minutes", "45", "--complete",
        ])
        .expect("cli should parse");
        let Commands::Art {
            action:
                ArtCommands::Practice {
                    art,
                    part,
                    minutes,
                    complete,
                    ..
                },
        } = cli.command
        else {
            panic!("expected art practice");
        };
        assert_eq!(art, "Violin");
        assert_eq!(part, "Bow hold");
        assert_eq!(minutes, 45);
        assert!(complete);
    }

    #[test]
    fn practice_requires_minutes() {
        let parsed = Cli::try_parse_from(["eud", "art", "practice", "Violin", "Bow hold"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn catalog_import_takes_a_path() {
        let cli = Cli::try_parse_from(["eud", "catalog", "import", "demos/catalog.toml"])
            .expect("cli should parse");
        assert!(matches!(
            cli.command,
            Commands::Catalog {
                action: CatalogCommands::Import { .. }
            }
        ));
    }

    #[test]
    fn global_flags_extraction_copies_values() {
        let cli = Cli::try_parse_from(["eud", "--db", "/tmp/eud.db", "tree", "stats"])
            .expect("cli should parse");
        let flags: GlobalFlags = cli.global_flags();
        assert_eq!(flags.db.as_deref(), Some("/tmp/eud.db"));
        assert!(flags.user.is_none());
    }
}
