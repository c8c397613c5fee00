use eud_core::enums::{AuditAction, EntityType};
use eud_db::repos::audit::AuditFilter;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::AuditArgs;
use crate::commands::shared::parse_enum;
use crate::context::AppContext;
use crate::output::output;

/// Handle `eud audit`.
pub async fn handle(args: &AuditArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let user_id = if args.all_users {
        None
    } else {
        Some(ctx.user(flags)?)
    };
    let filter = AuditFilter {
        user_id,
        entity_type: args
            .entity
            .as_deref()
            .map(|value| parse_enum::<EntityType>(value, "entity"))
            .transpose()?,
        entity_id: args.id.clone(),
        action: args
            .action
            .as_deref()
            .map(|value| parse_enum::<AuditAction>(value, "action"))
            .transpose()?,
        limit: Some(ctx.limit(flags)),
    };
    output(&ctx.service.query_audit(&filter).await?, flags.format)
}
