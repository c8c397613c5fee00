use anyhow::Context;
use eud_config::EudConfig;
use eud_core::entities::{Art, ArtPart, ArtTaxonomy, TechTreeNode};
use eud_db::error::DatabaseError;
use eud_db::service::EudService;

use crate::cli::GlobalFlags;

/// Shared application resources initialized once at startup.
pub struct AppContext {
    pub service: EudService,
    pub config: EudConfig,
}

/// Load layered configuration, then apply `--db`.
pub fn load_config(flags: &GlobalFlags) -> anyhow::Result<EudConfig> {
    let mut config = EudConfig::load_with_dotenv().context("failed to load configuration")?;
    if let Some(db) = &flags.db {
        config.database.path.clone_from(db);
    }
    Ok(config)
}

impl AppContext {
    pub async fn init(config: EudConfig) -> anyhow::Result<Self> {
        let service = EudService::from_config(&config)
            .await
            .with_context(|| format!("failed to open database at {}", config.database.path))?;
        tracing::debug!(path = %config.database.path, "service ready");
        Ok(Self { service, config })
    }

    /// Acting user: `--user`, else `general.default_user`.
    pub fn user(&self, flags: &GlobalFlags) -> anyhow::Result<String> {
        resolve_user(flags.user.as_deref(), &self.config.general.default_user)
    }

    /// Look an art up by ID, then by name.
    pub async fn art(&self, key: &str) -> anyhow::Result<Art> {
        match self.service.get_art(key).await {
            Err(DatabaseError::NotFound { .. }) => Ok(self.service.art_by_name(key).await?),
            other => Ok(other?),
        }
    }

    /// Look a part of `art` up by ID, then by name.
    pub async fn part(&self, art: &Art, key: &str) -> anyhow::Result<ArtPart> {
        self.service
            .list_parts(&art.id)
            .await?
            .into_iter()
            .find(|p| p.id == key || p.name == key)
            .with_context(|| format!("art '{}' has no part '{key}'", art.name))
    }

    pub async fn node(&self, key: &str) -> anyhow::Result<TechTreeNode> {
        match self.service.get_node(key).await {
            Err(DatabaseError::NotFound { .. }) => Ok(self.service.node_by_name(key).await?),
            other => Ok(other?),
        }
    }

    pub async fn taxonomy(&self, key: &str) -> anyhow::Result<ArtTaxonomy> {
        self.service
            .list_taxonomies()
            .await?
            .into_iter()
            .find(|t| t.id == key || t.name == key)
            .with_context(|| format!("taxonomy not found: {key}"))
    }

    /// `--limit`, else `general.default_limit`.
    pub fn limit(&self, flags: &GlobalFlags) -> u32 {
        flags.limit.unwrap_or(self.config.general.default_limit)
    }
}

fn resolve_user(flag: Option<&str>, default_user: &str) -> anyhow::Result<String> {
    match flag {
        Some(user) if !user.trim().is_empty() => Ok(user.to_string()),
        _ if !default_user.is_empty() => Ok(default_user.to_string()),
        _ => anyhow::bail!("no user given: pass --user or set general.default_user"),
    }
}
