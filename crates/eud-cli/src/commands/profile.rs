use eud_core::enums::EconomicLayer;
use serde_json::json;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::ProfileCommands;
use crate::commands::shared::parse_enum;
use crate::context::AppContext;
use crate::output::output;

/// Handle `eud profile`.
pub async fn handle(action: &ProfileCommands, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let user = ctx.user(flags)?;
    match action {
        ProfileCommands::Create { rank, layer } => {
            let layer: EconomicLayer = parse_enum(layer, "layer")?;
            let profile = ctx.service.create_profile(&user, *rank, layer).await?;
            output(&profile, flags.format)
        }
        ProfileCommands::Show => {
            let profile = ctx.service.get_profile(&user).await?;
            output(
                &json!({
                    "profile": profile,
                    "happiness": profile.happiness.happiness(),
                }),
                flags.format,
            )
        }
        ProfileCommands::Update { rank, layer } => {
            let layer = layer
                .as_deref()
                .map(|value| parse_enum::<EconomicLayer>(value, "layer"))
                .transpose()?;
            let profile = ctx.service.update_profile(&user, *rank, layer).await?;
            output(&profile, flags.format)
        }
        ProfileCommands::SetResource { resource, amount } => {
            let profile = ctx.service.set_resource(&user, resource, *amount).await?;
            output(&profile.resources, flags.format)
        }
        ProfileCommands::Virtues => {
            let history = ctx.service.virtue_history(&user, ctx.limit(flags)).await?;
            output(&history, flags.format)
        }
    }
}
