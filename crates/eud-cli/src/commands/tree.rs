use serde_json::json;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::TreeCommands;
use crate::context::AppContext;
use crate::output::output;

/// Handle `eud tree`.
pub async fn handle(action: &TreeCommands, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    match action {
        TreeCommands::List => output(&ctx.service.list_nodes().await?, flags.format),
        TreeCommands::Show { node } => {
            let node = ctx.node(node).await?;
            let ancestors = ctx.service.ancestors(&node.id).await?;
            let descendants = ctx.service.descendants(&node.id).await?;
            output(
                &json!({
                    "node": node,
                    "ancestors": ancestors,
                    "descendants": descendants,
                }),
                flags.format,
            )
        }
        TreeCommands::UpdateProgress { node } => {
            let user = ctx.user(flags)?;
            let node = ctx.node(node).await?;
            let update = ctx.service.update_progress(&user, &node.id).await?;
            output(&update, flags.format)
        }
        TreeCommands::Prerequisites { node } => {
            let user = ctx.user(flags)?;
            let node = ctx.node(node).await?;
            let check = ctx.service.check_prerequisites(&user, &node.id).await?;
            output(&check, flags.format)
        }
        TreeCommands::Available => {
            let user = ctx.user(flags)?;
            output(&ctx.service.available_nodes(&user).await?, flags.format)
        }
        TreeCommands::Levels => {
            let user = ctx.user(flags)?;
            output(&ctx.service.tree_levels(&user).await?, flags.format)
        }
        TreeCommands::Stats => {
            let user = ctx.user(flags)?;
            output(&ctx.service.tech_tree_stats(&user).await?, flags.format)
        }
        TreeCommands::Recommend { count } => {
            let user = ctx.user(flags)?;
            output(&ctx.service.recommended_nodes(&user, *count).await?, flags.format)
        }
    }
}
