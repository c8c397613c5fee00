//! Catalog import: a whole [`CatalogFile`] written in one transaction.
//!
//! Names in the file are resolved to generated ids in file order. Any
//! failure (including a name already present in the database) rolls the
//! whole import back.

use std::collections::HashMap;

use eud_core::catalog_file::{CatalogFile, parse_virtues};
use eud_core::responses::ImportSummary;

use crate::error::DatabaseError;
use crate::repos::catalog::{NewArt, NewPart, NewStage};
use crate::repos::tech_tree::NewNode;
use crate::service::EudService;

fn resolve(ids: &HashMap<String, String>, kind: &str, name: &str) -> Result<String, DatabaseError> {
    ids.get(name)
        .cloned()
        .ok_or_else(|| DatabaseError::not_found(kind, name))
}

fn resolve_all(names: &[String], ids: &HashMap<String, String>, kind: &str) -> Result<Vec<String>, DatabaseError> {
    names.iter().map(|n| resolve(ids, kind, n)).collect()
}

impl EudService {
    /// Validate and import a catalog file.
    ///
    /// # Errors
    ///
    /// `Validation` for a malformed file or a name that already exists;
    /// nothing is written in that case.
    pub async fn import_catalog(&self, file: &CatalogFile) -> Result<ImportSummary, DatabaseError> {
        file.validate()?;
        self.write(|| async {
            let mut summary = ImportSummary::default();
            let mut taxonomy_ids: HashMap<String, String> = HashMap::new();
            let mut art_ids: HashMap<String, String> = HashMap::new();
            let mut node_ids: HashMap<String, String> = HashMap::new();

            for def in &file.taxonomies {
                let parent = match &def.parent {
                    Some(name) => Some(resolve(&taxonomy_ids, "taxonomy", name)?),
                    None => None,
                };
                let created = self
                    .create_taxonomy_in(&def.name, def.description.as_deref(), parent.as_deref(), def.level)
                    .await?;
                taxonomy_ids.insert(def.name.clone(), created.id);
                summary.taxonomies += 1;
            }

            for def in &file.arts {
                let taxonomy_id = match &def.taxonomy {
                    Some(name) => Some(resolve(&taxonomy_ids, "taxonomy", name)?),
                    None => None,
                };
                let art = self
                    .create_art_in(&NewArt {
                        name: def.name.clone(),
                        description: def.description.clone(),
                        difficulty: def.difficulty,
                        taxonomy_id,
                        required_virtues: parse_virtues(&def.required_virtues)?,
                        improved_virtues: parse_virtues(&def.improved_virtues)?,
                        rank_required: def.rank_required,
                        economic_layer_required: def.economic_layer_required,
                        is_unlocked_default: def.is_unlocked_default,
                        average_mastery_time_days: def.average_mastery_time_days,
                    })
                    .await?;
                for part in &def.parts {
                    self.add_art_part_in(
                        &art.id,
                        &NewPart {
                            name: part.name.clone(),
                            description: part.description.clone(),
                            practice_method: part.practice_method,
                            validation_method: part.validation_method,
                            estimated_hours: part.estimated_hours,
                        },
                    )
                    .await?;
                    summary.parts += 1;
                }
                for stage in &def.stages {
                    self.add_art_stage_in(
                        &art.id,
                        &NewStage {
                            name: stage.name.clone(),
                            description: stage.description.clone(),
                            mastery_threshold: stage.mastery_threshold,
                            virtue_bonuses: parse_virtues(&stage.virtue_bonuses)?,
                        },
                    )
                    .await?;
                    summary.stages += 1;
                }
                art_ids.insert(def.name.clone(), art.id);
                summary.arts += 1;
            }

            for def in &file.nodes {
                let node = self
                    .create_node_in(&NewNode {
                        name: def.name.clone(),
                        description: def.description.clone(),
                        level: def.level,
                        prerequisites: resolve_all(&def.prerequisites, &node_ids, "tech_tree_node")?,
                        required_arts: resolve_all(&def.required_arts, &art_ids, "art")?,
                        unlocks_arts: resolve_all(&def.unlocks_arts, &art_ids, "art")?,
                        required_rank: def.required_rank,
                        zone_type_filter: def.zone_type_filter,
                        required_resources: def.required_resources.clone(),
                        achievement_bonus: def.achievement_bonus()?,
                        unlock_message: def.unlock_message.clone(),
                    })
                    .await?;
                node_ids.insert(def.name.clone(), node.id);
                summary.nodes += 1;
            }

            tracing::info!(
                taxonomies = summary.taxonomies,
                arts = summary.arts,
                nodes = summary.nodes,
                "catalog imported"
            );
            Ok(summary)
        })
        .await
    }
}
