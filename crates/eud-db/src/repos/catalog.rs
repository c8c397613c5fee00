//! Catalog repository: taxonomies, arts, parts and stages.
//!
//! Catalog writes carry no user; their audit rows and trail lines are
//! attributed to the catalog stream.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use eud_core::entities::{Art, ArtPart, ArtStage, ArtTaxonomy};
use eud_core::enums::{
    AuditAction, Difficulty, EconomicLayer, EntityType, PracticeMethod, TaxonomyLevel, TrailOp,
    ValidationMethod, Virtue,
};
use eud_core::graph::TaxonomyTree;
use eud_core::ids::{PREFIX_ART, PREFIX_PART, PREFIX_STAGE, PREFIX_TAXONOMY};
use eud_core::responses::TaxonomyStat;
use eud_core::virtues::VirtueMap;

use crate::error::DatabaseError;
use crate::helpers::{get_bool, get_int, get_opt_string, parse_datetime, parse_enum, parse_json, to_json, to_value};
use crate::service::{EudService, Mutation};

const TAXONOMY_COLS: &str = "id, name, description, parent_id, level, path, created_at";

const ART_COLS: &str = "id, name, description, difficulty, taxonomy_id, required_virtues,
    improved_virtues, rank_required, economic_layer_required, is_unlocked_default,
    average_mastery_time_days, created_at";

const PART_COLS: &str =
    "id, art_id, name, description, order_index, practice_method, validation_method, estimated_hours";

const STAGE_COLS: &str = "id, art_id, name, description, order_index, mastery_threshold, virtue_bonuses";

/// Input for [`EudService::create_art`].
#[derive(Debug, Clone)]
pub struct NewArt {
    pub name: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub taxonomy_id: Option<String>,
    pub required_virtues: VirtueMap,
    pub improved_virtues: VirtueMap,
    pub rank_required: u8,
    pub economic_layer_required: EconomicLayer,
    pub is_unlocked_default: bool,
    pub average_mastery_time_days: u32,
}

impl NewArt {
    /// A beginner art open to everyone, with no virtues attached.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            difficulty: Difficulty::Beginner,
            taxonomy_id: None,
            required_virtues: VirtueMap::new(),
            improved_virtues: VirtueMap::new(),
            rank_required: 1,
            economic_layer_required: EconomicLayer::Port,
            is_unlocked_default: true,
            average_mastery_time_days: 30,
        }
    }
}

/// Input for [`EudService::add_art_part`].
#[derive(Debug, Clone)]
pub struct NewPart {
    pub name: String,
    pub description: Option<String>,
    pub practice_method: PracticeMethod,
    pub validation_method: ValidationMethod,
    pub estimated_hours: u32,
}

impl NewPart {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            practice_method: PracticeMethod::Practice,
            validation_method: ValidationMethod::SelfCheck,
            estimated_hours: 1,
        }
    }
}

/// Input for [`EudService::add_art_stage`].
#[derive(Debug, Clone)]
pub struct NewStage {
    pub name: String,
    pub description: Option<String>,
    pub mastery_threshold: u8,
    pub virtue_bonuses: VirtueMap,
}

impl NewStage {
    #[must_use]
    pub fn new(name: impl Into<String>, mastery_threshold: u8) -> Self {
        Self {
            name: name.into(),
            description: None,
            mastery_threshold,
            virtue_bonuses: VirtueMap::new(),
        }
    }
}

fn row_to_taxonomy(row: &libsql::Row) -> Result<ArtTaxonomy, DatabaseError> {
    Ok(ArtTaxonomy {
        id: row.get::<String>(0)?,
        name: row.get::<String>(1)?,
        description: get_opt_string(row, 2)?,
        parent_id: get_opt_string(row, 3)?,
        level: parse_enum(&row.get::<String>(4)?)?,
        path: row.get::<String>(5)?,
        created_at: parse_datetime(&row.get::<String>(6)?)?,
    })
}

pub(crate) fn row_to_art(row: &libsql::Row) -> Result<Art, DatabaseError> {
    Ok(Art {
        id: row.get::<String>(0)?,
        name: row.get::<String>(1)?,
        description: row.get::<String>(2)?,
        difficulty: parse_enum(&row.get::<String>(3)?)?,
        taxonomy_id: get_opt_string(row, 4)?,
        required_virtues: parse_json(&row.get::<String>(5)?)?,
        improved_virtues: parse_json(&row.get::<String>(6)?)?,
        rank_required: get_int(row, 7)?,
        economic_layer_required: parse_enum(&row.get::<String>(8)?)?,
        is_unlocked_default: get_bool(row, 9)?,
        average_mastery_time_days: get_int(row, 10)?,
        created_at: parse_datetime(&row.get::<String>(11)?)?,
    })
}

fn row_to_part(row: &libsql::Row) -> Result<ArtPart, DatabaseError> {
    Ok(ArtPart {
        id: row.get::<String>(0)?,
        art_id: row.get::<String>(1)?,
        name: row.get::<String>(2)?,
        description: get_opt_string(row, 3)?,
        order_index: get_int(row, 4)?,
        practice_method: parse_enum(&row.get::<String>(5)?)?,
        validation_method: parse_enum(&row.get::<String>(6)?)?,
        estimated_hours: get_int(row, 7)?,
    })
}

fn row_to_stage(row: &libsql::Row) -> Result<ArtStage, DatabaseError> {
    Ok(ArtStage {
        id: row.get::<String>(0)?,
        art_id: row.get::<String>(1)?,
        name: row.get::<String>(2)?,
        description: get_opt_string(row, 3)?,
        order_index: get_int(row, 4)?,
        mastery_threshold: get_int(row, 5)?,
        virtue_bonuses: parse_json(&row.get::<String>(6)?)?,
    })
}

impl EudService {
    // -----------------------------------------------------------------------
    // Taxonomies
    // -----------------------------------------------------------------------

    /// Create a taxonomy node. The level is derived from the parent.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown parent, `Validation` for an empty or
    /// duplicate name.
    pub async fn create_taxonomy(
        &self,
        name: &str,
        description: Option<&str>,
        parent_id: Option<&str>,
    ) -> Result<ArtTaxonomy, DatabaseError> {
        self.write(|| self.create_taxonomy_in(name, description, parent_id, None))
            .await
    }

    pub(crate) async fn create_taxonomy_in(
        &self,
        name: &str,
        description: Option<&str>,
        parent_id: Option<&str>,
        level: Option<TaxonomyLevel>,
    ) -> Result<ArtTaxonomy, DatabaseError> {
        if name.trim().is_empty() {
            return Err(DatabaseError::Validation("taxonomy name must not be empty".into()));
        }
        if self.find_by_name("art_taxonomies", name).await?.is_some() {
            return Err(DatabaseError::Validation(format!("taxonomy '{name}' already exists")));
        }
        let parent = match parent_id {
            Some(pid) => Some(self.get_taxonomy(pid).await?),
            None => None,
        };
        let id = self.db().generate_id(PREFIX_TAXONOMY).await?;
        let level = level.unwrap_or_else(|| {
            parent
                .as_ref()
                .map_or(TaxonomyLevel::Category, |p| p.level.child())
        });
        let path = parent
            .as_ref()
            .map_or_else(|| id.clone(), |p| format!("{}/{id}", p.path));

        self.conn()
            .execute(
                "INSERT INTO art_taxonomies (id, name, description, parent_id, level, path, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                libsql::params![
                    id.as_str(),
                    name,
                    description,
                    parent_id,
                    level.as_str(),
                    path.as_str(),
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;
        let taxonomy = self.get_taxonomy(&id).await?;
        self.record(Mutation {
            user: None,
            entity: EntityType::Taxonomy,
            id: &id,
            action: AuditAction::Created,
            op: TrailOp::Create,
            data: to_value(&taxonomy)?,
            detail: None,
        })
        .await?;
        Ok(taxonomy)
    }

    /// # Errors
    ///
    /// `NotFound` if no taxonomy has this id.
    pub async fn get_taxonomy(&self, id: &str) -> Result<ArtTaxonomy, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {TAXONOMY_COLS} FROM art_taxonomies WHERE id = ?1"),
                [id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => row_to_taxonomy(&row),
            None => Err(DatabaseError::not_found("taxonomy", id)),
        }
    }

    /// All taxonomies ordered by path.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn list_taxonomies(&self) -> Result<Vec<ArtTaxonomy>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(&format!("SELECT {TAXONOMY_COLS} FROM art_taxonomies ORDER BY path"), ())
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_taxonomy(&row)?);
        }
        Ok(out)
    }

    /// The whole taxonomy hierarchy in memory.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn taxonomy_tree(&self) -> Result<TaxonomyTree, DatabaseError> {
        Ok(TaxonomyTree::new(self.list_taxonomies().await?))
    }

    /// Direct children of a taxonomy, ordered by name.
    ///
    /// # Errors
    ///
    /// `NotFound` if the taxonomy does not exist.
    pub async fn taxonomy_children(&self, id: &str) -> Result<Vec<ArtTaxonomy>, DatabaseError> {
        self.get_taxonomy(id).await?;
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {TAXONOMY_COLS} FROM art_taxonomies WHERE parent_id = ?1 ORDER BY name"),
                [id],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_taxonomy(&row)?);
        }
        Ok(out)
    }

    /// Every taxonomy below `id`, excluding `id` itself.
    ///
    /// # Errors
    ///
    /// `NotFound` if the taxonomy does not exist.
    pub async fn taxonomy_descendants(&self, id: &str) -> Result<Vec<ArtTaxonomy>, DatabaseError> {
        let tree = self.taxonomy_tree().await?;
        if tree.get(id).is_none() {
            return Err(DatabaseError::not_found("taxonomy", id));
        }
        Ok(tree
            .descendants(id)
            .iter()
            .filter_map(|d| tree.get(d).cloned())
            .collect())
    }

    /// Names from the root category down to `id`, e.g. `"Arts > Music > Strings"`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the taxonomy does not exist.
    pub async fn full_path_display(&self, id: &str) -> Result<String, DatabaseError> {
        self.taxonomy_tree()
            .await?
            .full_path_display(id)
            .ok_or_else(|| DatabaseError::not_found("taxonomy", id))
    }

    /// Arts filed under `id` or any of its descendants.
    ///
    /// # Errors
    ///
    /// `NotFound` if the taxonomy does not exist.
    pub async fn arts_under_taxonomy(&self, id: &str) -> Result<Vec<Art>, DatabaseError> {
        let tree = self.taxonomy_tree().await?;
        if tree.get(id).is_none() {
            return Err(DatabaseError::not_found("taxonomy", id));
        }
        let subtree: HashSet<String> = tree.subtree(id).into_iter().collect();
        Ok(self
            .list_arts()
            .await?
            .into_iter()
            .filter(|a| a.taxonomy_id.as_ref().is_some_and(|t| subtree.contains(t)))
            .collect())
    }

    /// Per top-level category: art count, arts discovered by `user_id` and
    /// their average mastery.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if a query fails.
    pub async fn taxonomy_stats(&self, user_id: &str) -> Result<Vec<TaxonomyStat>, DatabaseError> {
        let tree = self.taxonomy_tree().await?;
        let arts = self.list_arts().await?;
        let levels: HashMap<String, u8> = self
            .list_masteries(user_id)
            .await?
            .into_iter()
            .map(|m| (m.art_id, m.mastery_level))
            .collect();

        let mut stats = Vec::new();
        for root in tree.roots() {
            let subtree: HashSet<String> = tree.subtree(&root.id).into_iter().collect();
            let in_root: Vec<&Art> = arts
                .iter()
                .filter(|a| a.taxonomy_id.as_ref().is_some_and(|t| subtree.contains(t)))
                .collect();
            let discovered: Vec<u8> = in_root.iter().filter_map(|a| levels.get(&a.id).copied()).collect();
            #[allow(clippy::cast_precision_loss)]
            let average_mastery = if discovered.is_empty() {
                0.0
            } else {
                discovered.iter().map(|l| f64::from(*l)).sum::<f64>() / discovered.len() as f64
            };
            stats.push(TaxonomyStat {
                taxonomy_id: root.id.clone(),
                name: root.name.clone(),
                arts: u32::try_from(in_root.len()).unwrap_or(u32::MAX),
                discovered: u32::try_from(discovered.len()).unwrap_or(u32::MAX),
                average_mastery,
            });
        }
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(stats)
    }

    // -----------------------------------------------------------------------
    // Arts
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// `Validation` for an empty or duplicate name or a rank outside 1..=4,
    /// `NotFound` for an unknown taxonomy.
    pub async fn create_art(&self, art: &NewArt) -> Result<Art, DatabaseError> {
        self.write(|| self.create_art_in(art)).await
    }

    pub(crate) async fn create_art_in(&self, art: &NewArt) -> Result<Art, DatabaseError> {
        if art.name.trim().is_empty() {
            return Err(DatabaseError::Validation("art name must not be empty".into()));
        }
        if !(1..=4).contains(&art.rank_required) {
            return Err(DatabaseError::Validation(format!(
                "rank_required must be 1..=4, got {}",
                art.rank_required
            )));
        }
        if self.find_by_name("arts", &art.name).await?.is_some() {
            return Err(DatabaseError::Validation(format!("art '{}' already exists", art.name)));
        }
        if let Some(tid) = &art.taxonomy_id {
            self.get_taxonomy(tid).await?;
        }

        let id = self.db().generate_id(PREFIX_ART).await?;
        self.conn()
            .execute(
                "INSERT INTO arts (id, name, description, difficulty, taxonomy_id, required_virtues,
                     improved_virtues, rank_required, economic_layer_required, is_unlocked_default,
                     average_mastery_time_days, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                libsql::params![
                    id.as_str(),
                    art.name.as_str(),
                    art.description.as_str(),
                    art.difficulty.as_str(),
                    art.taxonomy_id.as_deref(),
                    to_json(&art.required_virtues)?,
                    to_json(&art.improved_virtues)?,
                    art.rank_required,
                    art.economic_layer_required.as_str(),
                    art.is_unlocked_default,
                    art.average_mastery_time_days,
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;
        let created = self.get_art(&id).await?;
        self.record(Mutation {
            user: None,
            entity: EntityType::Art,
            id: &id,
            action: AuditAction::Created,
            op: TrailOp::Create,
            data: to_value(&created)?,
            detail: None,
        })
        .await?;
        tracing::debug!(art_id = %id, name = %created.name, "art created");
        Ok(created)
    }

    /// # Errors
    ///
    /// `NotFound` if no art has this id.
    pub async fn get_art(&self, id: &str) -> Result<Art, DatabaseError> {
        let mut rows = self
            .conn()
            .query(&format!("SELECT {ART_COLS} FROM arts WHERE id = ?1"), [id])
            .await?;
        match rows.next().await? {
            Some(row) => row_to_art(&row),
            None => Err(DatabaseError::not_found("art", id)),
        }
    }

    /// All arts ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn list_arts(&self) -> Result<Vec<Art>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(&format!("SELECT {ART_COLS} FROM arts ORDER BY name"), ())
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_art(&row)?);
        }
        Ok(out)
    }

    /// Arts that improve `virtue`, strongest improvement first.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn arts_by_virtue(&self, virtue: Virtue, limit: u32) -> Result<Vec<Art>, DatabaseError> {
        let mut arts: Vec<Art> = self
            .list_arts()
            .await?
            .into_iter()
            .filter(|a| a.improved_virtues.get(&virtue).is_some_and(|v| *v > 0.0))
            .collect();
        arts.sort_by(|a, b| {
            let av = a.improved_virtues.get(&virtue).copied().unwrap_or_default();
            let bv = b.improved_virtues.get(&virtue).copied().unwrap_or_default();
            bv.total_cmp(&av).then_with(|| a.name.cmp(&b.name))
        });
        arts.truncate(limit as usize);
        Ok(arts)
    }

    /// Arts similar to `art_id`: same taxonomy first, then the same primary
    /// virtue, then a difficulty one step away.
    ///
    /// # Errors
    ///
    /// `NotFound` if the art does not exist.
    pub async fn related_arts(&self, art_id: &str, limit: u32) -> Result<Vec<Art>, DatabaseError> {
        let art = self.get_art(art_id).await?;
        let others: Vec<Art> = self
            .list_arts()
            .await?
            .into_iter()
            .filter(|a| a.id != art.id)
            .collect();
        let primary = art.primary_virtue();
        let difficulty = i16::from(art.difficulty.level());

        let tiers: [&dyn Fn(&Art) -> bool; 3] = [
            &|a: &Art| art.taxonomy_id.is_some() && a.taxonomy_id == art.taxonomy_id,
            &|a: &Art| primary.is_some() && a.primary_virtue() == primary,
            &|a: &Art| (i16::from(a.difficulty.level()) - difficulty).abs() <= 1,
        ];

        let limit = limit as usize;
        let mut picked: Vec<Art> = Vec::new();
        for matches in tiers {
            for candidate in &others {
                if picked.len() >= limit {
                    return Ok(picked);
                }
                if matches(candidate) && !picked.iter().any(|p| p.id == candidate.id) {
                    picked.push(candidate.clone());
                }
            }
        }
        Ok(picked)
    }

    /// Arts open to every player without a tech tree unlock.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn featured_arts(&self, limit: u32) -> Result<Vec<Art>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ART_COLS} FROM arts WHERE is_unlocked_default = 1 ORDER BY name LIMIT ?1"),
                [limit],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_art(&row)?);
        }
        Ok(out)
    }

    /// Arts the player's rank and economic layer give access to.
    ///
    /// With `include_discovered = false`, arts the player already has a
    /// mastery record for are left out.
    ///
    /// # Errors
    ///
    /// `NotFound` if the player has no profile.
    pub async fn available_arts(
        &self,
        user_id: &str,
        include_discovered: bool,
    ) -> Result<Vec<Art>, DatabaseError> {
        let profile = self.get_profile(user_id).await?;
        let discovered: HashSet<String> = if include_discovered {
            HashSet::new()
        } else {
            self.list_masteries(user_id)
                .await?
                .into_iter()
                .map(|m| m.art_id)
                .collect()
        };
        Ok(self
            .list_arts()
            .await?
            .into_iter()
            .filter(|a| a.rank_required <= profile.rank)
            .filter(|a| profile.economic_layer.grants(a.economic_layer_required))
            .filter(|a| !discovered.contains(&a.id))
            .collect())
    }

    // -----------------------------------------------------------------------
    // Parts and stages
    // -----------------------------------------------------------------------

    /// Append a part at the next order index.
    ///
    /// # Errors
    ///
    /// `NotFound` if the art does not exist, `Validation` for an empty name.
    pub async fn add_art_part(&self, art_id: &str, part: &NewPart) -> Result<ArtPart, DatabaseError> {
        self.write(|| self.add_art_part_in(art_id, part)).await
    }

    pub(crate) async fn add_art_part_in(&self, art_id: &str, part: &NewPart) -> Result<ArtPart, DatabaseError> {
        if part.name.trim().is_empty() {
            return Err(DatabaseError::Validation("part name must not be empty".into()));
        }
        self.get_art(art_id).await?;
        let order_index = self.next_order_index("art_parts", art_id).await?;
        let id = self.db().generate_id(PREFIX_PART).await?;
        self.conn()
            .execute(
                "INSERT INTO art_parts (id, art_id, name, description, order_index, practice_method,
                     validation_method, estimated_hours)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                libsql::params![
                    id.as_str(),
                    art_id,
                    part.name.as_str(),
                    part.description.as_deref(),
                    order_index,
                    part.practice_method.as_str(),
                    part.validation_method.as_str(),
                    part.estimated_hours
                ],
            )
            .await?;
        let created = self.get_part(&id).await?;
        self.record(Mutation {
            user: None,
            entity: EntityType::ArtPart,
            id: &id,
            action: AuditAction::Created,
            op: TrailOp::Create,
            data: to_value(&created)?,
            detail: None,
        })
        .await?;
        Ok(created)
    }

    /// # Errors
    ///
    /// `NotFound` if no part has this id.
    pub async fn get_part(&self, id: &str) -> Result<ArtPart, DatabaseError> {
        let mut rows = self
            .conn()
            .query(&format!("SELECT {PART_COLS} FROM art_parts WHERE id = ?1"), [id])
            .await?;
        match rows.next().await? {
            Some(row) => row_to_part(&row),
            None => Err(DatabaseError::not_found("art_part", id)),
        }
    }

    /// Parts of an art in order.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn list_parts(&self, art_id: &str) -> Result<Vec<ArtPart>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PART_COLS} FROM art_parts WHERE art_id = ?1 ORDER BY order_index"),
                [art_id],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_part(&row)?);
        }
        Ok(out)
    }

    /// Append a stage at the next order index.
    ///
    /// # Errors
    ///
    /// `NotFound` if the art does not exist. `Validation` if the threshold
    /// exceeds 100 or is not greater than the previous stage's.
    pub async fn add_art_stage(&self, art_id: &str, stage: &NewStage) -> Result<ArtStage, DatabaseError> {
        self.write(|| self.add_art_stage_in(art_id, stage)).await
    }

    pub(crate) async fn add_art_stage_in(&self, art_id: &str, stage: &NewStage) -> Result<ArtStage, DatabaseError> {
        if stage.name.trim().is_empty() {
            return Err(DatabaseError::Validation("stage name must not be empty".into()));
        }
        if stage.mastery_threshold > 100 {
            return Err(DatabaseError::Validation(format!(
                "mastery_threshold must be 0..=100, got {}",
                stage.mastery_threshold
            )));
        }
        self.get_art(art_id).await?;
        let existing = self.list_stages(art_id).await?;
        if let Some(last) = existing.last() {
            if stage.mastery_threshold <= last.mastery_threshold {
                return Err(DatabaseError::Validation(format!(
                    "mastery_threshold {} must be greater than the previous stage's {}",
                    stage.mastery_threshold, last.mastery_threshold
                )));
            }
        }
        let order_index = u32::try_from(existing.len()).unwrap_or(u32::MAX);
        let id = self.db().generate_id(PREFIX_STAGE).await?;
        self.conn()
            .execute(
                "INSERT INTO art_stages (id, art_id, name, description, order_index, mastery_threshold, virtue_bonuses)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                libsql::params![
                    id.as_str(),
                    art_id,
                    stage.name.as_str(),
                    stage.description.as_deref(),
                    order_index,
                    stage.mastery_threshold,
                    to_json(&stage.virtue_bonuses)?
                ],
            )
            .await?;
        let created = self.get_stage(&id).await?;
        self.record(Mutation {
            user: None,
            entity: EntityType::ArtStage,
            id: &id,
            action: AuditAction::Created,
            op: TrailOp::Create,
            data: to_value(&created)?,
            detail: None,
        })
        .await?;
        Ok(created)
    }

    /// # Errors
    ///
    /// `NotFound` if no stage has this id.
    pub async fn get_stage(&self, id: &str) -> Result<ArtStage, DatabaseError> {
        let mut rows = self
            .conn()
            .query(&format!("SELECT {STAGE_COLS} FROM art_stages WHERE id = ?1"), [id])
            .await?;
        match rows.next().await? {
            Some(row) => row_to_stage(&row),
            None => Err(DatabaseError::not_found("art_stage", id)),
        }
    }

    /// Stages of an art in order.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn list_stages(&self, art_id: &str) -> Result<Vec<ArtStage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {STAGE_COLS} FROM art_stages WHERE art_id = ?1 ORDER BY order_index"),
                [art_id],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_stage(&row)?);
        }
        Ok(out)
    }

    /// Look up a row id by its unique name. `table` is always a literal.
    pub(crate) async fn find_by_name(&self, table: &str, name: &str) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(&format!("SELECT id FROM {table} WHERE name = ?1"), [name])
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<String>(0)?)),
            None => Ok(None),
        }
    }

    async fn next_order_index(&self, table: &str, art_id: &str) -> Result<u32, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT COALESCE(MAX(order_index) + 1, 0) FROM {table} WHERE art_id = ?1"),
                [art_id],
            )
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        get_int(&row, 0)
    }

    /// Name lookup for arts, used by catalog import and the CLI.
    ///
    /// # Errors
    ///
    /// `NotFound` if no art has this name.
    pub async fn art_by_name(&self, name: &str) -> Result<Art, DatabaseError> {
        match self.find_by_name("arts", name).await? {
            Some(id) => self.get_art(&id).await,
            None => Err(DatabaseError::not_found("art", name)),
        }
    }

    /// Arts keyed by id, for callers resolving many references at once.
    pub(crate) async fn arts_by_id(&self) -> Result<BTreeMap<String, Art>, DatabaseError> {
        Ok(self
            .list_arts()
            .await?
            .into_iter()
            .map(|a| (a.id.clone(), a))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::mastery::PracticeRequest;
    use crate::test_support::helpers::{seed_art, seed_profile, test_service};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn taxonomy_levels_and_paths() {
        let svc = test_service().await;
        let arts = svc.create_taxonomy("Arts", None, None).await.unwrap();
        let music = svc.create_taxonomy("Music", None, Some(&arts.id)).await.unwrap();
        let strings = svc.create_taxonomy("Strings", Some("bowed"), Some(&music.id)).await.unwrap();

        assert_eq!(arts.level, TaxonomyLevel::Category);
        assert_eq!(music.level, TaxonomyLevel::Subcategory);
        assert_eq!(strings.level, TaxonomyLevel::Specialty);
        assert_eq!(strings.path, format!("{}/{}/{}", arts.id, music.id, strings.id));
        assert_eq!(svc.full_path_display(&strings.id).await.unwrap(), "Arts > Music > Strings");

        let children = svc.taxonomy_children(&arts.id).await.unwrap();
        assert_eq!(children.len(), 1);
        let below = svc.taxonomy_descendants(&arts.id).await.unwrap();
        assert_eq!(below.len(), 2);
    }

    #[tokio::test]
    async fn duplicate_taxonomy_name_rejected() {
        let svc = test_service().await;
        svc.create_taxonomy("Arts", None, None).await.unwrap();
        let err = svc.create_taxonomy("Arts", None, None).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_parent_is_not_found() {
        let svc = test_service().await;
        let err = svc.create_taxonomy("Music", None, Some("tax-missing")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn parts_get_contiguous_order() {
        let svc = test_service().await;
        let art = seed_art(&svc, "Violin", 3, &[]).await;
        let parts = svc.list_parts(&art.id).await.unwrap();
        let order: Vec<u32> = parts.iter().map(|p| p.order_index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn stage_thresholds_must_increase() {
        let svc = test_service().await;
        let art = seed_art(&svc, "Violin", 1, &[0, 40]).await;
        let err = svc.add_art_stage(&art.id, &NewStage::new("Again", 40)).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Validation(_)));
        let stage = svc.add_art_stage(&art.id, &NewStage::new("Expert", 80)).await.unwrap();
        assert_eq!(stage.order_index, 2);
    }

    #[tokio::test]
    async fn arts_under_taxonomy_include_descendants() {
        let svc = test_service().await;
        let arts = svc.create_taxonomy("Arts", None, None).await.unwrap();
        let music = svc.create_taxonomy("Music", None, Some(&arts.id)).await.unwrap();
        let mut violin = NewArt::new("Violin");
        violin.taxonomy_id = Some(music.id.clone());
        svc.create_art(&violin).await.unwrap();
        svc.create_art(&NewArt::new("Loose")).await.unwrap();

        let under = svc.arts_under_taxonomy(&arts.id).await.unwrap();
        let names: Vec<&str> = under.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Violin"]);
    }

    #[tokio::test]
    async fn taxonomy_stats_average_discovered_arts_per_root() {
        let svc = test_service().await;
        seed_profile(&svc, "u1").await;
        let arts = svc.create_taxonomy("Arts", None, None).await.unwrap();
        let music = svc.create_taxonomy("Music", None, Some(&arts.id)).await.unwrap();
        svc.create_taxonomy("Body", None, None).await.unwrap();
        let mut ids = Vec::new();
        for (name, parts) in [("Violin", 2), ("Cello", 4), ("Harp", 1)] {
            let mut new = NewArt::new(name);
            new.taxonomy_id = Some(music.id.clone());
            let art = svc.create_art(&new).await.unwrap();
            for i in 0..parts {
                svc.add_art_part(&art.id, &NewPart::new(format!("P{i}"))).await.unwrap();
            }
            ids.push(art.id);
        }
        let violin_part = svc.list_parts(&ids[0]).await.unwrap().remove(0);
        svc.log_practice(&PracticeRequest::new("u1", &ids[0], &violin_part.id, 20).completed())
            .await
            .unwrap();
        svc.discover_art("u1", &ids[1], None).await.unwrap();

        let stats = svc.taxonomy_stats("u1").await.unwrap();
        let names: Vec<&str> = stats.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Arts", "Body"]);
        assert_eq!(stats[0].arts, 3);
        assert_eq!(stats[0].discovered, 2);
        assert!((stats[0].average_mastery - 25.0).abs() < f64::EPSILON);
        assert_eq!(stats[1].discovered, 0);
        assert!(stats[1].average_mastery.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn virtue_and_related_queries() {
        let svc = test_service().await;
        let tax = svc.create_taxonomy("Music", None, None).await.unwrap();

        let mut violin = NewArt::new("Violin");
        violin.taxonomy_id = Some(tax.id.clone());
        violin.improved_virtues = VirtueMap::from([(Virtue::Beauty, 5.0)]);
        let violin = svc.create_art(&violin).await.unwrap();

        let mut cello = NewArt::new("Cello");
        cello.taxonomy_id = Some(tax.id.clone());
        cello.improved_virtues = VirtueMap::from([(Virtue::Beauty, 8.0)]);
        svc.create_art(&cello).await.unwrap();

        let mut running = NewArt::new("Running");
        running.improved_virtues = VirtueMap::from([(Virtue::Endurance, 9.0)]);
        running.difficulty = Difficulty::Master;
        running.is_unlocked_default = false;
        svc.create_art(&running).await.unwrap();

        let beauty: Vec<String> = svc
            .arts_by_virtue(Virtue::Beauty, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(beauty, vec!["Cello", "Violin"]);

        let related: Vec<String> = svc
            .related_arts(&violin.id, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(related, vec!["Cello"]);

        let featured = svc.featured_arts(10).await.unwrap();
        assert_eq!(featured.len(), 2);
    }

    #[tokio::test]
    async fn available_arts_respect_rank_and_layer() {
        let svc = test_service().await;
        svc.create_profile("u1", 2, EconomicLayer::Laws).await.unwrap();

        svc.create_art(&NewArt::new("Open")).await.unwrap();
        let mut senior = NewArt::new("Senior");
        senior.rank_required = 3;
        svc.create_art(&senior).await.unwrap();
        let mut republic = NewArt::new("Statecraft");
        republic.economic_layer_required = EconomicLayer::Republic;
        svc.create_art(&republic).await.unwrap();
        let mut laws = NewArt::new("Contracts");
        laws.economic_layer_required = EconomicLayer::Laws;
        svc.create_art(&laws).await.unwrap();

        let names: Vec<String> = svc
            .available_arts("u1", true)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["Contracts", "Open"]);

        let err = svc.available_arts("ghost", true).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
