use std::path::Path;

use anyhow::Context;
use eud_core::catalog_file::CatalogFile;
use eud_core::enums::Virtue;
use serde_json::json;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::CatalogCommands;
use crate::commands::shared::parse_enum;
use crate::context::AppContext;
use crate::output::output;

/// Handle `eud catalog`.
pub async fn handle(action: &CatalogCommands, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    match action {
        CatalogCommands::Import { file } => import(file, ctx, flags).await,
        CatalogCommands::Arts {
            virtue,
            taxonomy,
            related,
            featured,
        } => {
            let limit = ctx.limit(flags);
            let arts = if let Some(virtue) = virtue {
                let virtue: Virtue = parse_enum(virtue, "virtue")?;
                ctx.service.arts_by_virtue(virtue, limit).await?
            } else if let Some(taxonomy) = taxonomy {
                let taxonomy = ctx.taxonomy(taxonomy).await?;
                ctx.service.arts_under_taxonomy(&taxonomy.id).await?
            } else if let Some(related) = related {
                let art = ctx.art(related).await?;
                ctx.service.related_arts(&art.id, limit).await?
            } else if *featured {
                ctx.service.featured_arts(limit).await?
            } else {
                ctx.service.list_arts().await?
            };
            output(&arts, flags.format)
        }
        CatalogCommands::Art { art } => {
            let art = ctx.art(art).await?;
            let parts = ctx.service.list_parts(&art.id).await?;
            let stages = ctx.service.list_stages(&art.id).await?;
            let taxonomy = match &art.taxonomy_id {
                Some(id) => Some(ctx.service.full_path_display(id).await?),
                None => None,
            };
            output(
                &json!({
                    "art": art,
                    "taxonomy": taxonomy,
                    "parts": parts,
                    "stages": stages,
                }),
                flags.format,
            )
        }
        CatalogCommands::Taxonomy { taxonomy, stats } => {
            if *stats {
                let user = ctx.user(flags)?;
                return output(&ctx.service.taxonomy_stats(&user).await?, flags.format);
            }
            match taxonomy {
                Some(key) => {
                    let taxonomy = ctx.taxonomy(key).await?;
                    let path = ctx.service.full_path_display(&taxonomy.id).await?;
                    let children = ctx.service.taxonomy_children(&taxonomy.id).await?;
                    let arts = ctx.service.arts_under_taxonomy(&taxonomy.id).await?;
                    output(
                        &json!({
                            "taxonomy": taxonomy,
                            "full_path": path,
                            "children": children,
                            "arts": arts,
                        }),
                        flags.format,
                    )
                }
                None => {
                    let tree = ctx.service.taxonomy_tree().await?;
                    let rows: Vec<_> = ctx
                        .service
                        .list_taxonomies()
                        .await?
                        .into_iter()
                        .map(|t| {
                            let full_path = tree.full_path_display(&t.id);
                            json!({ "taxonomy": t, "full_path": full_path })
                        })
                        .collect();
                    output(&rows, flags.format)
                }
            }
        }
    }
}

async fn import(file: &Path, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let catalog = read_catalog(file)?;
    let summary = ctx.service.import_catalog(&catalog).await?;
    tracing::info!(file = %file.display(), arts = summary.arts, "catalog imported");
    output(&summary, flags.format)
}

fn read_catalog(file: &Path) -> anyhow::Result<CatalogFile> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read catalog file {}", file.display()))?;
    toml::from_str(&raw).with_context(|| format!("failed to parse catalog file {}", file.display()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::read_catalog;

    #[test]
    fn reads_catalog_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[[taxonomy]]
name = "Music"

[[art]]
name = "Violin"
taxonomy = "Music"

[[art.parts]]
name = "Bow hold"
"#
        )
        .unwrap();
        let catalog = read_catalog(file.path()).unwrap();
        assert_eq!(catalog.taxonomies.len(), 1);
        assert_eq!(catalog.arts[0].parts[0].name, "Bow hold");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[[art]]\nname = \"Violin\"\ncolour = \"red\"").unwrap();
        let err = read_catalog(file.path()).expect_err("should fail");
        assert!(format!("{err:#}").contains("failed to parse"));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = read_catalog(std::path::Path::new("/nonexistent/catalog.toml")).expect_err("should fail");
        assert!(err.to_string().contains("failed to read"));
    }
}
