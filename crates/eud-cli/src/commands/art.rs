use chrono::Utc;
use eud_db::repos::mastery::PracticeRequest;
use serde_json::json;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::ArtCommands;
use crate::commands::shared::parse_timestamp;
use crate::context::AppContext;
use crate::output::output;

/// Handle `eud art`.
pub async fn handle(action: &ArtCommands, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let user = ctx.user(flags)?;
    match action {
        ArtCommands::Discover { art, part } => {
            let art = ctx.art(art).await?;
            let part_id = match part {
                Some(key) => Some(ctx.part(&art, key).await?.id),
                None => None,
            };
            let outcome = ctx.service.discover_art(&user, &art.id, part_id.as_deref()).await?;
            output(&outcome, flags.format)
        }
        ArtCommands::Practice {
            art,
            part,
            minutes,
            notes,
            complete,
            rating,
            at,
        } => {
            let art = ctx.art(art).await?;
            let part = ctx.part(&art, part).await?;
            let mut request = PracticeRequest::new(&user, &art.id, &part.id, *minutes);
            request.notes.clone_from(notes);
            request.rating = *rating;
            request.mark_completed = *complete;
            if let Some(at) = at {
                request = request.at(parse_timestamp(at)?);
            }
            let outcome = ctx.service.log_practice(&request).await?;
            output(&outcome, flags.format)
        }
        ArtCommands::Validate { session } => {
            let outcome = ctx.service.validate_session(session).await?;
            output(&outcome, flags.format)
        }
        ArtCommands::Show { art } => {
            let art = ctx.art(art).await?;
            let mastery = ctx.service.get_mastery(&user, &art.id).await?;
            let stages = ctx.service.stage_progress(&user, Some(&art.id)).await?;
            let completed = ctx.service.completed_parts(&user, &art.id).await?;
            let started = ctx.service.started_parts(&user, &art.id).await?;
            let stale = mastery.is_stale(Utc::now());
            output(
                &json!({
                    "art": art.name,
                    "mastery": mastery,
                    "stale": stale,
                    "stages": stages,
                    "completed_parts": completed,
                    "started_parts": started,
                }),
                flags.format,
            )
        }
        ArtCommands::Stats { art, days } => {
            let art_id = match art {
                Some(key) => Some(ctx.art(key).await?.id),
                None => None,
            };
            let stats = ctx.service.practice_stats(&user, art_id.as_deref(), *days).await?;
            output(&stats, flags.format)
        }
        ArtCommands::Available { include_discovered } => {
            let arts = ctx.service.available_arts(&user, *include_discovered).await?;
            output(&arts, flags.format)
        }
        ArtCommands::Summary => output(&ctx.service.mastery_summary(&user).await?, flags.format),
        ArtCommands::History { art } => {
            let art_id = match art {
                Some(key) => Some(ctx.art(key).await?.id),
                None => None,
            };
            let sessions = ctx
                .service
                .practice_history(&user, art_id.as_deref(), ctx.limit(flags))
                .await?;
            output(&sessions, flags.format)
        }
    }
}
