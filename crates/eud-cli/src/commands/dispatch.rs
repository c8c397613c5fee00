use crate::cli::GlobalFlags;
use crate::cli::root_commands::Commands;
use crate::commands;
use crate::context::AppContext;

/// Dispatch a parsed command to the corresponding handler module.
pub async fn dispatch(command: Commands, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    match command {
        Commands::Profile { action } => commands::profile::handle(&action, ctx, flags).await,
        Commands::Catalog { action } => commands::catalog::handle(&action, ctx, flags).await,
        Commands::Art { action } => commands::art::handle(&action, ctx, flags).await,
        Commands::Tree { action } => commands::tree::handle(&action, ctx, flags).await,
        Commands::Audit(args) => commands::audit::handle(&args, ctx, flags).await,
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use eud_config::EudConfig;
    use pretty_assertions::assert_eq;

    use super::dispatch;
    use crate::cli::Cli;
    use crate::context::AppContext;

    const DEMO_CATALOG: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../demos/catalog.toml");

    async fn memory_context() -> AppContext {
        let mut config = EudConfig::default();
        config.database.path = ":memory:".into();
        AppContext::init(config).await.unwrap()
    }

    async fn run(ctx: &AppContext, args: &[&str]) -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(std::iter::once("eud").chain(args.iter().copied()))?;
        let flags = cli.global_flags();
        dispatch(cli.command, ctx, &flags).await
    }

    #[tokio::test]
    async fn demo_catalog_drives_an_unlock() {
        let ctx = memory_context().await;
        run(&ctx, &["catalog", "import", DEMO_CATALOG]).await.unwrap();
        run(&ctx, &["--user", "u1", "profile", "create"]).await.unwrap();

        for part in ["Bow hold", "Scales", "Music theory", "First recital"] {
            run(
                &ctx,
                &["--user", "u1", "art", "practice", "Violin", part, "--minutes", "30", "--complete"],
            )
            .await
            .unwrap();
        }
        run(&ctx, &["--user", "u1", "tree", "update-progress", "Strings I"])
            .await
            .unwrap();

        let violin = ctx.service.art_by_name("Violin").await.unwrap();
        assert_eq!(ctx.service.get_mastery("u1", &violin.id).await.unwrap().mastery_level, 100);

        let node = ctx.service.node_by_name("Strings I").await.unwrap();
        assert!(ctx.service.get_progress("u1", &node.id).await.unwrap().is_unlocked);

        let viola = ctx.service.art_by_name("Viola").await.unwrap();
        assert!(ctx.service.find_mastery("u1", &viola.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn read_commands_run_against_imported_catalog() {
        let ctx = memory_context().await;
        run(&ctx, &["catalog", "import", DEMO_CATALOG]).await.unwrap();
        run(&ctx, &["--user", "u1", "profile", "create", "--rank", "2", "--layer", "laws"])
            .await
            .unwrap();

        for args in [
            &["catalog", "arts", "--virtue", "beauty"][..],
            &["catalog", "arts", "--taxonomy", "Music"],
            &["catalog", "art", "Violin"],
            &["catalog", "taxonomy"],
            &["catalog", "taxonomy", "Strings"],
            &["--user", "u1", "catalog", "taxonomy", "--stats"],
            &["--user", "u1", "art", "available"],
            &["--user", "u1", "tree", "levels"],
            &["--user", "u1", "tree", "recommend"],
            &["tree", "show", "Chamber Music"],
            &["--user", "u1", "audit"],
        ] {
            run(&ctx, args)
                .await
                .unwrap_or_else(|e| panic!("{args:?} failed: {e:#}"));
        }
    }

    #[tokio::test]
    async fn unknown_names_and_missing_user_are_errors() {
        let ctx = memory_context().await;
        run(&ctx, &["catalog", "import", DEMO_CATALOG]).await.unwrap();

        let err = run(&ctx, &["art", "summary"]).await.expect_err("no user");
        assert!(err.to_string().contains("--user"));

        assert!(run(&ctx, &["catalog", "art", "Cello"]).await.is_err());
        assert!(
            run(&ctx, &["--user", "u1", "art", "practice", "Violin", "Spiccato", "--minutes", "5"])
                .await
                .is_err()
        );
    }
}
