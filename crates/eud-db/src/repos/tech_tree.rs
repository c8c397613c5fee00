//! Tech tree resolver: nodes, prerequisite edges, per-user progress and the
//! unlock cascade.
//!
//! An unlock is a conditional `UPDATE ... WHERE is_unlocked = 0`; the bonus
//! and the cascade only run when that update changed exactly one row. The
//! cascade is an explicit breadth-first walk over dependent nodes bounded by
//! `max_cascade_depth`, and every step is returned as a [`CascadeEffect`].

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use chrono::Utc;
use eud_core::audit_detail::{ProgressDetail, VirtueGainDetail};
use eud_core::cascade::CascadeEffect;
use eud_core::entities::{
    AchievementBonus, ArtShortfall, MissingRequirements, PlayerProfile, PrerequisiteStatus, RankShortfall,
    ResourceShortfall, TechTreeNode, TechTreeProgress,
};
use eud_core::enums::{AuditAction, EntityType, TrailOp, ZoneType};
use eud_core::graph::TechGraph;
use eud_core::ids::{PREFIX_NODE, PREFIX_NODE_PROGRESS};
use eud_core::progression::{art_completion_fraction, average_percentage};
use eud_core::responses::{NodeStatus, PrerequisiteCheck, ProgressUpdate, TechTreeStats, TreeLevel};

use crate::error::DatabaseError;
use crate::helpers::{
    get_bool, get_int, get_opt_string, parse_datetime, parse_json, parse_optional_datetime, to_json, to_value,
};
use crate::service::{EudService, Mutation};

const NODE_COLS: &str = "id, name, description, level, required_rank, zone_type_filter,
    required_resources, achievement_bonus, unlock_message";

const PROGRESS_COLS: &str =
    "id, user_id, node_id, progress_percentage, is_unlocked, unlocked_at, missing, updated_at";

/// Input for [`EudService::create_node`].
#[derive(Debug, Clone)]
pub struct NewNode {
    pub name: String,
    pub description: Option<String>,
    pub level: u32,
    pub prerequisites: Vec<String>,
    pub required_arts: Vec<String>,
    pub unlocks_arts: Vec<String>,
    pub required_rank: u8,
    pub zone_type_filter: ZoneType,
    pub required_resources: BTreeMap<String, i64>,
    pub achievement_bonus: AchievementBonus,
    pub unlock_message: Option<String>,
}

impl NewNode {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            level: 0,
            prerequisites: Vec::new(),
            required_arts: Vec::new(),
            unlocks_arts: Vec::new(),
            required_rank: 1,
            zone_type_filter: ZoneType::Any,
            required_resources: BTreeMap::new(),
            achievement_bonus: AchievementBonus::default(),
            unlock_message: None,
        }
    }
}

fn row_to_node(row: &libsql::Row) -> Result<TechTreeNode, DatabaseError> {
    Ok(TechTreeNode {
        id: row.get::<String>(0)?,
        name: row.get::<String>(1)?,
        description: get_opt_string(row, 2)?,
        level: get_int(row, 3)?,
        prerequisites: Vec::new(),
        required_arts: Vec::new(),
        unlocks_arts: Vec::new(),
        required_rank: get_int(row, 4)?,
        zone_type_filter: crate::helpers::parse_enum(&row.get::<String>(5)?)?,
        required_resources: parse_json(&row.get::<String>(6)?)?,
        achievement_bonus: parse_json(&row.get::<String>(7)?)?,
        unlock_message: get_opt_string(row, 8)?,
    })
}

fn row_to_progress(row: &libsql::Row) -> Result<TechTreeProgress, DatabaseError> {
    Ok(TechTreeProgress {
        id: row.get::<String>(0)?,
        user_id: row.get::<String>(1)?,
        node_id: row.get::<String>(2)?,
        progress_percentage: get_int(row, 3)?,
        is_unlocked: get_bool(row, 4)?,
        unlocked_at: parse_optional_datetime(get_opt_string(row, 5)?.as_deref())?,
        missing: parse_json(&row.get::<String>(6)?)?,
        updated_at: parse_datetime(&row.get::<String>(7)?)?,
    })
}

impl EudService {
    // -----------------------------------------------------------------------
    // Nodes and edges
    // -----------------------------------------------------------------------

    /// Create a node with its prerequisite edges and art links.
    ///
    /// Prerequisites and required arts must exist. Arts in `unlocks_arts`
    /// may be added to the catalog later.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty or duplicate name or a bad rank,
    /// `NotFound` for an unknown prerequisite or required art.
    pub async fn create_node(&self, node: &NewNode) -> Result<TechTreeNode, DatabaseError> {
        self.write(|| self.create_node_in(node)).await
    }

    pub(crate) async fn create_node_in(&self, node: &NewNode) -> Result<TechTreeNode, DatabaseError> {
        if node.name.trim().is_empty() {
            return Err(DatabaseError::Validation("node name must not be empty".into()));
        }
        if !(1..=4).contains(&node.required_rank) {
            return Err(DatabaseError::Validation(format!(
                "required_rank must be 1..=4, got {}",
                node.required_rank
            )));
        }
        if self.find_by_name("tech_tree_nodes", &node.name).await?.is_some() {
            return Err(DatabaseError::Validation(format!("node '{}' already exists", node.name)));
        }
        for art_id in &node.required_arts {
            self.get_art(art_id).await?;
        }

        let id = self.db().generate_id(PREFIX_NODE).await?;
        let mut graph = self.tech_graph().await?;
        for prereq in &node.prerequisites {
            if !graph.contains(prereq) {
                return Err(DatabaseError::not_found("tech_tree_node", prereq));
            }
        }
        graph.try_insert(&id, &node.prerequisites)?;

        self.conn()
            .execute(
                "INSERT INTO tech_tree_nodes (id, name, description, level, required_rank, zone_type_filter,
                     required_resources, achievement_bonus, unlock_message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                libsql::params![
                    id.as_str(),
                    node.name.as_str(),
                    node.description.as_deref(),
                    node.level,
                    node.required_rank,
                    node.zone_type_filter.as_str(),
                    to_json(&node.required_resources)?,
                    to_json(&node.achievement_bonus)?,
                    node.unlock_message.as_deref(),
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;
        self.insert_edges_in(&id, &node.prerequisites).await?;
        self.insert_node_arts_in(&id, &node.required_arts, "required").await?;
        self.insert_node_arts_in(&id, &node.unlocks_arts, "unlocks").await?;

        let created = self.get_node(&id).await?;
        self.record(Mutation {
            user: None,
            entity: EntityType::TechTreeNode,
            id: &id,
            action: AuditAction::Created,
            op: TrailOp::Create,
            data: to_value(&created)?,
            detail: None,
        })
        .await?;
        Ok(created)
    }

    /// Replace a node's prerequisites.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown node or prerequisite, `Cycle` when the new
    /// edges would make the node depend on itself.
    pub async fn set_prerequisites(
        &self,
        node_id: &str,
        prerequisites: &[String],
    ) -> Result<TechTreeNode, DatabaseError> {
        self.write(|| async {
            let graph = self.tech_graph().await?;
            if !graph.contains(node_id) {
                return Err(DatabaseError::not_found("tech_tree_node", node_id));
            }
            for prereq in prerequisites {
                if !graph.contains(prereq) {
                    return Err(DatabaseError::not_found("tech_tree_node", prereq));
                }
            }
            if graph.would_create_cycle(node_id, prerequisites) {
                return Err(DatabaseError::Cycle {
                    node_id: node_id.to_string(),
                });
            }
            self.conn()
                .execute("DELETE FROM tech_tree_prerequisites WHERE node_id = ?1", [node_id])
                .await?;
            self.insert_edges_in(node_id, prerequisites).await?;

            let node = self.get_node(node_id).await?;
            self.record(Mutation {
                user: None,
                entity: EntityType::TechTreeNode,
                id: node_id,
                action: AuditAction::Updated,
                op: TrailOp::Update,
                data: serde_json::json!({"prerequisites": node.prerequisites}),
                detail: None,
            })
            .await?;
            Ok(node)
        })
        .await
    }

    async fn insert_edges_in(&self, node_id: &str, prerequisites: &[String]) -> Result<(), DatabaseError> {
        for (position, prereq) in prerequisites.iter().enumerate() {
            self.conn()
                .execute(
                    "INSERT OR IGNORE INTO tech_tree_prerequisites (node_id, prerequisite_id, position)
                     VALUES (?1, ?2, ?3)",
                    libsql::params![node_id, prereq.as_str(), i64::try_from(position).unwrap_or(i64::MAX)],
                )
                .await?;
        }
        Ok(())
    }

    async fn insert_node_arts_in(&self, node_id: &str, art_ids: &[String], role: &str) -> Result<(), DatabaseError> {
        for (position, art_id) in art_ids.iter().enumerate() {
            self.conn()
                .execute(
                    "INSERT OR IGNORE INTO tech_tree_node_arts (node_id, art_id, role, position)
                     VALUES (?1, ?2, ?3, ?4)",
                    libsql::params![node_id, art_id.as_str(), role, i64::try_from(position).unwrap_or(i64::MAX)],
                )
                .await?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// `NotFound` if no node has this id.
    pub async fn get_node(&self, id: &str) -> Result<TechTreeNode, DatabaseError> {
        self.list_nodes()
            .await?
            .into_iter()
            .find(|n| n.id == id)
            .ok_or_else(|| DatabaseError::not_found("tech_tree_node", id))
    }

    /// # Errors
    ///
    /// `NotFound` if no node has this name.
    pub async fn node_by_name(&self, name: &str) -> Result<TechTreeNode, DatabaseError> {
        self.list_nodes()
            .await?
            .into_iter()
            .find(|n| n.name == name)
            .ok_or_else(|| DatabaseError::not_found("tech_tree_node", name))
    }

    /// All nodes with their edges and art links, ordered by level and name.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if a query fails.
    pub async fn list_nodes(&self) -> Result<Vec<TechTreeNode>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(&format!("SELECT {NODE_COLS} FROM tech_tree_nodes ORDER BY level, name"), ())
            .await?;
        let mut nodes = Vec::new();
        while let Some(row) = rows.next().await? {
            nodes.push(row_to_node(&row)?);
        }

        let mut prereqs: HashMap<String, Vec<String>> = HashMap::new();
        let mut rows = self
            .conn()
            .query(
                "SELECT node_id, prerequisite_id FROM tech_tree_prerequisites ORDER BY node_id, position",
                (),
            )
            .await?;
        while let Some(row) = rows.next().await? {
            prereqs
                .entry(row.get::<String>(0)?)
                .or_default()
                .push(row.get::<String>(1)?);
        }

        let mut required: HashMap<String, Vec<String>> = HashMap::new();
        let mut unlocks: HashMap<String, Vec<String>> = HashMap::new();
        let mut rows = self
            .conn()
            .query(
                "SELECT node_id, art_id, role FROM tech_tree_node_arts ORDER BY node_id, role, position",
                (),
            )
            .await?;
        while let Some(row) = rows.next().await? {
            let target = if row.get::<String>(2)? == "required" {
                &mut required
            } else {
                &mut unlocks
            };
            target
                .entry(row.get::<String>(0)?)
                .or_default()
                .push(row.get::<String>(1)?);
        }

        for node in &mut nodes {
            node.prerequisites = prereqs.remove(&node.id).unwrap_or_default();
            node.required_arts = required.remove(&node.id).unwrap_or_default();
            node.unlocks_arts = unlocks.remove(&node.id).unwrap_or_default();
        }
        Ok(nodes)
    }

    /// The prerequisite graph over every node.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if a query fails.
    pub async fn tech_graph(&self) -> Result<TechGraph, DatabaseError> {
        Ok(TechGraph::new(&self.list_nodes().await?))
    }

    /// Every node `node_id` transitively depends on.
    ///
    /// # Errors
    ///
    /// `NotFound` if the node does not exist.
    pub async fn ancestors(&self, node_id: &str) -> Result<Vec<TechTreeNode>, DatabaseError> {
        self.related_nodes(node_id, TechGraph::ancestors).await
    }

    /// Every node that transitively depends on `node_id`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the node does not exist.
    pub async fn descendants(&self, node_id: &str) -> Result<Vec<TechTreeNode>, DatabaseError> {
        self.related_nodes(node_id, TechGraph::descendants).await
    }

    async fn related_nodes(
        &self,
        node_id: &str,
        walk: fn(&TechGraph, &str) -> Vec<String>,
    ) -> Result<Vec<TechTreeNode>, DatabaseError> {
        let nodes = self.list_nodes().await?;
        let graph = TechGraph::new(&nodes);
        if !graph.contains(node_id) {
            return Err(DatabaseError::not_found("tech_tree_node", node_id));
        }
        let ids: HashSet<String> = walk(&graph, node_id).into_iter().collect();
        Ok(nodes.into_iter().filter(|n| ids.contains(&n.id)).collect())
    }

    // -----------------------------------------------------------------------
    // Progress
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// `NotFound` if the user has no progress record for the node.
    pub async fn get_progress(&self, user_id: &str, node_id: &str) -> Result<TechTreeProgress, DatabaseError> {
        self.find_progress(user_id, node_id)
            .await?
            .ok_or_else(|| DatabaseError::not_found("tech_tree_progress", &format!("{user_id}/{node_id}")))
    }

    async fn find_progress(&self, user_id: &str, node_id: &str) -> Result<Option<TechTreeProgress>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PROGRESS_COLS} FROM tech_tree_progress WHERE user_id = ?1 AND node_id = ?2"),
                [user_id, node_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_progress(&row)?)),
            None => Ok(None),
        }
    }

    /// Progress records of a user keyed by node id.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn progress_by_node(&self, user_id: &str) -> Result<HashMap<String, TechTreeProgress>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PROGRESS_COLS} FROM tech_tree_progress WHERE user_id = ?1"),
                [user_id],
            )
            .await?;
        let mut out = HashMap::new();
        while let Some(row) = rows.next().await? {
            let progress = row_to_progress(&row)?;
            out.insert(progress.node_id.clone(), progress);
        }
        Ok(out)
    }

    /// Status of each direct prerequisite of a node.
    ///
    /// A prerequisite counts as met only when the user's progress record for
    /// it exists and is unlocked. A node without prerequisites is always met.
    /// When the user has a profile, their progress record for the node is
    /// created on first check.
    ///
    /// # Errors
    ///
    /// `NotFound` if the node does not exist.
    pub async fn check_prerequisites(&self, user_id: &str, node_id: &str) -> Result<PrerequisiteCheck, DatabaseError> {
        self.write(|| async {
            let nodes = self.list_nodes().await?;
            let node = nodes
                .iter()
                .find(|n| n.id == node_id)
                .ok_or_else(|| DatabaseError::not_found("tech_tree_node", node_id))?;
            if self.find_profile(user_id).await?.is_some() {
                self.ensure_progress_in(user_id, node_id).await?;
            }
            let progress = self.progress_by_node(user_id).await?;
            let names: HashMap<&str, &str> = nodes.iter().map(|n| (n.id.as_str(), n.name.as_str())).collect();

            let prerequisites: Vec<PrerequisiteStatus> = node
                .prerequisites
                .iter()
                .map(|p| PrerequisiteStatus {
                    node_id: p.clone(),
                    name: names.get(p.as_str()).copied().unwrap_or_default().to_string(),
                    unlocked: progress.get(p).is_some_and(|pr| pr.is_unlocked),
                })
                .collect();
            Ok(PrerequisiteCheck {
                node_id: node_id.to_string(),
                all_met: prerequisites.iter().all(|p| p.unlocked),
                prerequisites,
            })
        })
        .await
    }

    /// The user's progress record for a node, inserted at zero when absent.
    /// Must run inside a write.
    async fn ensure_progress_in(&self, user_id: &str, node_id: &str) -> Result<TechTreeProgress, DatabaseError> {
        if let Some(existing) = self.find_progress(user_id, node_id).await? {
            return Ok(existing);
        }
        let id = self.db().generate_id(PREFIX_NODE_PROGRESS).await?;
        self.conn()
            .execute(
                "INSERT INTO tech_tree_progress (id, user_id, node_id, progress_percentage, is_unlocked,
                     missing, updated_at)
                 VALUES (?1, ?2, ?3, 0, 0, ?4, ?5)",
                libsql::params![
                    id.as_str(),
                    user_id,
                    node_id,
                    to_json(&MissingRequirements::default())?,
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;
        let progress = self.get_progress(user_id, node_id).await?;
        self.record(Mutation {
            user: Some(user_id),
            entity: EntityType::TechTreeProgress,
            id: &progress.id,
            action: AuditAction::Created,
            op: TrailOp::Create,
            data: to_value(&progress)?,
            detail: None,
        })
        .await?;
        Ok(progress)
    }

    /// Recompute a user's progress toward a node and unlock it when every
    /// requirement is met, cascading into dependent nodes.
    ///
    /// # Errors
    ///
    /// `NotFound` if the profile or node does not exist.
    pub async fn update_progress(&self, user_id: &str, node_id: &str) -> Result<ProgressUpdate, DatabaseError> {
        self.write(|| async {
            let profile = self.get_profile(user_id).await?;
            let nodes = self.list_nodes().await?;
            if !nodes.iter().any(|n| n.id == node_id) {
                return Err(DatabaseError::not_found("tech_tree_node", node_id));
            }
            let graph = TechGraph::new(&nodes);
            let by_id: HashMap<&str, &TechTreeNode> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();
            let max_depth = self.progression().max_cascade_depth;

            let mut effects = Vec::new();
            let mut target: Option<(TechTreeProgress, bool)> = None;
            let mut queue = VecDeque::from([(node_id.to_string(), 0_u32)]);
            let mut visited = HashSet::new();

            while let Some((current, depth)) = queue.pop_front() {
                if !visited.insert(current.clone()) {
                    continue;
                }
                let Some(node) = by_id.get(current.as_str()) else {
                    continue;
                };
                let (progress, unlocked_now) = self.evaluate_node_in(&profile, node, depth, &mut effects).await?;
                if depth > 0 {
                    effects.push(CascadeEffect::Reevaluated {
                        node_id: current.clone(),
                        depth,
                        progress_percentage: progress.progress_percentage,
                        unlocked: progress.is_unlocked,
                    });
                }
                if unlocked_now && depth < max_depth {
                    for child in graph.children_of(&current) {
                        queue.push_back((child, depth + 1));
                    }
                }
                if depth == 0 {
                    target = Some((progress, unlocked_now));
                }
            }

            let (progress, newly_unlocked) = target.ok_or(DatabaseError::NoResult)?;
            Ok(ProgressUpdate {
                progress,
                newly_unlocked,
                effects,
            })
        })
        .await
    }

    /// Evaluate, persist and possibly unlock one node. Must run inside a write.
    ///
    /// Returns the stored progress and whether this call unlocked the node.
    async fn evaluate_node_in(
        &self,
        profile: &PlayerProfile,
        node: &TechTreeNode,
        depth: u32,
        effects: &mut Vec<CascadeEffect>,
    ) -> Result<(TechTreeProgress, bool), DatabaseError> {
        let user_id = profile.user_id.as_str();
        let (percentage, missing) = self.measure_node(profile, node).await?;
        let now = Utc::now().to_rfc3339();

        let progress_id = self.ensure_progress_in(user_id, &node.id).await?.id;
        self.conn()
            .execute(
                "UPDATE tech_tree_progress SET progress_percentage = ?1, missing = ?2, updated_at = ?3
                 WHERE id = ?4",
                libsql::params![percentage, to_json(&missing)?, now.as_str(), progress_id.as_str()],
            )
            .await?;

        let mut unlocked_now = false;
        if percentage == 100 && missing.is_empty() {
            let changed = self
                .conn()
                .execute(
                    "UPDATE tech_tree_progress SET is_unlocked = 1, unlocked_at = ?1
                     WHERE id = ?2 AND is_unlocked = 0",
                    libsql::params![now.as_str(), progress_id.as_str()],
                )
                .await?;
            unlocked_now = changed == 1;
        }

        let progress = self.get_progress(user_id, &node.id).await?;
        let detail = ProgressDetail {
            node_id: node.id.clone(),
            progress_percentage: progress.progress_percentage,
            is_unlocked: progress.is_unlocked,
        };
        self.record(Mutation {
            user: Some(user_id),
            entity: EntityType::TechTreeProgress,
            id: &progress.id,
            action: AuditAction::ProgressUpdated,
            op: TrailOp::Update,
            data: to_value(&progress)?,
            detail: Some(to_value(&detail)?),
        })
        .await?;

        if unlocked_now {
            self.apply_unlock_in(user_id, node, &progress, depth, effects).await?;
        }
        Ok((progress, unlocked_now))
    }

    /// One-time unlock side effects: bonus and art discovery.
    async fn apply_unlock_in(
        &self,
        user_id: &str,
        node: &TechTreeNode,
        progress: &TechTreeProgress,
        depth: u32,
        effects: &mut Vec<CascadeEffect>,
    ) -> Result<(), DatabaseError> {
        effects.push(CascadeEffect::Unlocked {
            node_id: node.id.clone(),
            depth,
        });
        self.record(Mutation {
            user: Some(user_id),
            entity: EntityType::TechTreeProgress,
            id: &progress.id,
            action: AuditAction::Unlocked,
            op: TrailOp::Transition,
            data: serde_json::json!({"node_id": node.id, "unlock_message": node.unlock_message}),
            detail: Some(to_value(&ProgressDetail {
                node_id: node.id.clone(),
                progress_percentage: progress.progress_percentage,
                is_unlocked: true,
            })?),
        })
        .await?;
        tracing::info!(user_id, node_id = %node.id, depth, "tech tree node unlocked");

        let bonus = &node.achievement_bonus;
        if !bonus.is_empty() {
            self.grant_xp_in(user_id, bonus.xp).await?;
            let virtues = self
                .raise_virtues_in(user_id, &bonus.virtues, &format!("node:{}", node.id), bonus.xp)
                .await?;
            let detail = VirtueGainDetail {
                source: format!("node:{}", node.id),
                xp: bonus.xp,
                virtues: virtues.clone(),
            };
            self.record(Mutation {
                user: Some(user_id),
                entity: EntityType::Profile,
                id: user_id,
                action: AuditAction::BonusGranted,
                op: TrailOp::Update,
                data: to_value(&detail)?,
                detail: Some(to_value(&detail)?),
            })
            .await?;
            effects.push(CascadeEffect::BonusGranted {
                node_id: node.id.clone(),
                xp: bonus.xp,
                virtues,
            });
        }

        for art_id in &node.unlocks_arts {
            match self.get_art(art_id).await {
                Ok(_) => {
                    let outcome = self.discover_art_in(user_id, art_id, None).await?;
                    if outcome.created {
                        effects.push(CascadeEffect::ArtDiscovered {
                            node_id: node.id.clone(),
                            art_id: art_id.clone(),
                        });
                    }
                }
                Err(e) if e.is_not_found() => {
                    tracing::warn!(node_id = %node.id, art_id, "unlocked art is not in the catalog");
                    effects.push(CascadeEffect::ArtMissing {
                        node_id: node.id.clone(),
                        art_id: art_id.clone(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Progress percentage and missing requirements of a node for a player.
    async fn measure_node(
        &self,
        profile: &PlayerProfile,
        node: &TechTreeNode,
    ) -> Result<(u8, MissingRequirements), DatabaseError> {
        let ceiling = self.progression().mastery_ceiling;
        let progress = self.progress_by_node(&profile.user_id).await?;
        let mut missing = MissingRequirements {
            prerequisites: node
                .prerequisites
                .iter()
                .filter(|p| !progress.get(*p).is_some_and(|pr| pr.is_unlocked))
                .cloned()
                .collect(),
            ..Default::default()
        };

        let mut fractions = Vec::with_capacity(node.required_arts.len());
        for art_id in &node.required_arts {
            let level = self
                .find_mastery(&profile.user_id, art_id)
                .await?
                .map_or(0, |m| m.mastery_level);
            fractions.push(art_completion_fraction(level, ceiling));
            if level < ceiling {
                let art_name = match self.get_art(art_id).await {
                    Ok(art) => art.name,
                    Err(e) if e.is_not_found() => String::new(),
                    Err(e) => return Err(e),
                };
                missing.arts.push(ArtShortfall {
                    art_id: art_id.clone(),
                    art_name,
                    mastery_level: level,
                    required_level: ceiling,
                });
            }
        }

        if profile.rank < node.required_rank {
            missing.rank = Some(RankShortfall {
                required: node.required_rank,
                current: profile.rank,
            });
        }
        if !profile
            .economic_layer
            .permitted_zone_types()
            .contains(&node.zone_type_filter)
        {
            missing.zone_type = Some(node.zone_type_filter);
        }
        for (resource, required) in &node.required_resources {
            let available = profile.resources.get(resource).copied().unwrap_or(0);
            if available < *required {
                missing.resources.push(ResourceShortfall {
                    resource: resource.clone(),
                    required: *required,
                    available,
                });
            }
        }

        Ok((average_percentage(&fractions), missing))
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    async fn node_statuses(&self, user_id: &str) -> Result<(Vec<NodeStatus>, TechGraph), DatabaseError> {
        let nodes = self.list_nodes().await?;
        let graph = TechGraph::new(&nodes);
        let progress = self.progress_by_node(user_id).await?;
        let unlocked = |id: &str| progress.get(id).is_some_and(|p| p.is_unlocked);
        let statuses = nodes
            .into_iter()
            .map(|node| {
                let record = progress.get(&node.id);
                NodeStatus {
                    progress_percentage: record.map_or(0, |p| p.progress_percentage),
                    is_unlocked: record.is_some_and(|p| p.is_unlocked),
                    prerequisites_met: node.prerequisites.iter().all(|p| unlocked(p)),
                    node,
                }
            })
            .collect();
        Ok((statuses, graph))
    }

    /// Locked nodes whose prerequisites are all unlocked.
    ///
    /// # Errors
    ///
    /// `NotFound` if the user has no profile.
    pub async fn available_nodes(&self, user_id: &str) -> Result<Vec<NodeStatus>, DatabaseError> {
        self.get_profile(user_id).await?;
        let (statuses, _) = self.node_statuses(user_id).await?;
        Ok(statuses
            .into_iter()
            .filter(|s| !s.is_unlocked && s.prerequisites_met)
            .collect())
    }

    /// Nodes grouped in breadth-first layers from the roots.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if a query fails.
    pub async fn tree_levels(&self, user_id: &str) -> Result<Vec<TreeLevel>, DatabaseError> {
        let (statuses, graph) = self.node_statuses(user_id).await?;
        let mut by_id: HashMap<String, NodeStatus> =
            statuses.into_iter().map(|s| (s.node.id.clone(), s)).collect();
        Ok(graph
            .levels()
            .into_iter()
            .enumerate()
            .map(|(depth, ids)| TreeLevel {
                depth: u32::try_from(depth).unwrap_or(u32::MAX),
                nodes: ids.iter().filter_map(|id| by_id.remove(id)).collect(),
            })
            .collect())
    }

    /// # Errors
    ///
    /// `NotFound` if the user has no profile.
    pub async fn tech_tree_stats(&self, user_id: &str) -> Result<TechTreeStats, DatabaseError> {
        self.get_profile(user_id).await?;
        let (statuses, _) = self.node_statuses(user_id).await?;
        let total = statuses.len();
        let unlocked = statuses.iter().filter(|s| s.is_unlocked).count();
        let in_progress = statuses
            .iter()
            .filter(|s| !s.is_unlocked && s.progress_percentage > 0)
            .count();
        let available = statuses
            .iter()
            .filter(|s| !s.is_unlocked && s.prerequisites_met)
            .count();
        #[allow(clippy::cast_precision_loss)]
        let completion_percentage = if total == 0 {
            0.0
        } else {
            unlocked as f64 * 100.0 / total as f64
        };
        let count = |n: usize| u32::try_from(n).unwrap_or(u32::MAX);
        Ok(TechTreeStats {
            user_id: user_id.to_string(),
            total_nodes: count(total),
            unlocked: count(unlocked),
            in_progress: count(in_progress),
            available: count(available),
            completion_percentage,
        })
    }

    /// Available nodes closest to unlocking: highest progress first, then
    /// lowest level.
    ///
    /// # Errors
    ///
    /// `NotFound` if the user has no profile.
    pub async fn recommended_nodes(&self, user_id: &str, count: u32) -> Result<Vec<NodeStatus>, DatabaseError> {
        let mut nodes = self.available_nodes(user_id).await?;
        nodes.sort_by(|a, b| {
            b.progress_percentage
                .cmp(&a.progress_percentage)
                .then_with(|| a.node.level.cmp(&b.node.level))
                .then_with(|| a.node.name.cmp(&b.node.name))
        });
        nodes.truncate(count as usize);
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::mastery::PracticeRequest;
    use crate::test_support::helpers::{seed_art, seed_profile, test_service};
    use eud_core::enums::{EconomicLayer, Virtue};
    use eud_core::virtues::VirtueMap;
    use pretty_assertions::assert_eq;

    fn node_with(name: &str, prerequisites: &[&str], required_arts: &[&str]) -> NewNode {
        let mut node = NewNode::new(name);
        node.prerequisites = prerequisites.iter().map(ToString::to_string).collect();
        node.required_arts = required_arts.iter().map(ToString::to_string).collect();
        node
    }

    #[tokio::test]
    async fn node_without_prerequisites_is_trivially_met() {
        let svc = test_service().await;
        let n = svc.create_node(&NewNode::new("Root")).await.unwrap();
        let check = svc.check_prerequisites("anyone", &n.id).await.unwrap();
        assert!(check.all_met);
        assert!(check.prerequisites.is_empty());
        assert!(svc.progress_by_node("anyone").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn first_check_creates_progress_record() {
        let svc = test_service().await;
        seed_profile(&svc, "u1").await;
        let n = svc.create_node(&NewNode::new("Root")).await.unwrap();
        assert!(svc.get_progress("u1", &n.id).await.unwrap_err().is_not_found());

        svc.check_prerequisites("u1", &n.id).await.unwrap();
        let progress = svc.get_progress("u1", &n.id).await.unwrap();
        assert_eq!(progress.progress_percentage, 0);
        assert!(!progress.is_unlocked);

        svc.check_prerequisites("u1", &n.id).await.unwrap();
        assert_eq!(svc.progress_by_node("u1").await.unwrap().len(), 1);
        assert_eq!(svc.get_progress("u1", &n.id).await.unwrap().id, progress.id);
    }

    #[tokio::test]
    async fn node_lookup_by_name() {
        let svc = test_service().await;
        let n = svc.create_node(&NewNode::new("Strings I")).await.unwrap();
        assert_eq!(svc.node_by_name("Strings I").await.unwrap().id, n.id);
        assert!(matches!(
            svc.node_by_name("Strings II").await,
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn absent_or_locked_prerequisite_is_not_met() {
        let svc = test_service().await;
        seed_profile(&svc, "u1").await;
        let art = seed_art(&svc, "A", 1, &[]).await;
        let n1 = svc.create_node(&node_with("N1", &[], &[&art.id])).await.unwrap();
        let n2 = svc.create_node(&node_with("N2", &[&n1.id], &[])).await.unwrap();

        let check = svc.check_prerequisites("u1", &n2.id).await.unwrap();
        assert!(!check.all_met);

        // Record exists but locked.
        svc.update_progress("u1", &n1.id).await.unwrap();
        let check = svc.check_prerequisites("u1", &n2.id).await.unwrap();
        assert!(!check.all_met);
        assert_eq!(check.prerequisites[0].name, "N1");
    }

    #[tokio::test]
    async fn node_with_partial_art_mastery() {
        let svc = test_service().await;
        seed_profile(&svc, "u1").await;
        let gate = svc.create_node(&NewNode::new("N1")).await.unwrap();
        let unlocked = svc.update_progress("u1", &gate.id).await.unwrap();
        assert!(unlocked.newly_unlocked);

        let art = seed_art(&svc, "A", 5, &[]).await;
        let parts = svc.list_parts(&art.id).await.unwrap();
        for part in &parts[..3] {
            svc.log_practice(&PracticeRequest::new("u1", &art.id, &part.id, 20).completed())
                .await
                .unwrap();
        }
        assert_eq!(svc.get_mastery("u1", &art.id).await.unwrap().mastery_level, 60);

        let n2 = svc.create_node(&node_with("N2", &[&gate.id], &[&art.id])).await.unwrap();
        let update = svc.update_progress("u1", &n2.id).await.unwrap();
        assert_eq!(update.progress.progress_percentage, 60);
        assert!(!update.progress.is_unlocked);
        assert!(!update.newly_unlocked);
        assert_eq!(update.progress.missing.arts.len(), 1);
        assert_eq!(update.progress.missing.arts[0].mastery_level, 60);
        assert!(update.progress.missing.prerequisites.is_empty());
    }

    #[tokio::test]
    async fn unlock_is_monotonic_and_bonus_granted_once() {
        let svc = test_service().await;
        seed_profile(&svc, "u1").await;
        let art = seed_art(&svc, "A", 1, &[]).await;
        let part = svc.list_parts(&art.id).await.unwrap().remove(0);
        svc.log_practice(&PracticeRequest::new("u1", &art.id, &part.id, 20).completed())
            .await
            .unwrap();

        let mut node = node_with("N", &[], &[&art.id]);
        node.achievement_bonus = AchievementBonus {
            xp: 40,
            virtues: VirtueMap::from([(Virtue::Courage, 3.0)]),
        };
        let node = svc.create_node(&node).await.unwrap();

        let xp_before = svc.get_profile("u1").await.unwrap().experience_points;
        let first = svc.update_progress("u1", &node.id).await.unwrap();
        assert!(first.newly_unlocked);
        assert!(first.effects.iter().any(CascadeEffect::is_unlock));

        // Grow the art so its level drops below the ceiling.
        svc.add_art_part(&art.id, &crate::repos::catalog::NewPart::new("late"))
            .await
            .unwrap();
        svc.log_practice(&PracticeRequest::new("u1", &art.id, &part.id, 20))
            .await
            .unwrap();

        let second = svc.update_progress("u1", &node.id).await.unwrap();
        assert!(second.progress.is_unlocked);
        assert!(!second.newly_unlocked);
        assert!(second.effects.is_empty());

        let profile = svc.get_profile("u1").await.unwrap();
        assert_eq!(profile.experience_points, xp_before + 40);
        assert!((profile.happiness.courage - 3.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn unlock_cascades_discovery_and_children() {
        let svc = test_service().await;
        seed_profile(&svc, "u1").await;
        let reward = seed_art(&svc, "Reward", 1, &[]).await;

        let mut root = NewNode::new("Root");
        root.unlocks_arts = vec![reward.id.clone(), "art-missing".into()];
        let root = svc.create_node(&root).await.unwrap();
        let child = svc.create_node(&node_with("Child", &[&root.id], &[])).await.unwrap();
        let grandchild = svc.create_node(&node_with("Grandchild", &[&child.id], &[])).await.unwrap();

        let update = svc.update_progress("u1", &root.id).await.unwrap();
        assert_eq!(
            update.effects,
            vec![
                CascadeEffect::Unlocked { node_id: root.id.clone(), depth: 0 },
                CascadeEffect::ArtDiscovered { node_id: root.id.clone(), art_id: reward.id.clone() },
                CascadeEffect::ArtMissing { node_id: root.id.clone(), art_id: "art-missing".into() },
                CascadeEffect::Unlocked { node_id: child.id.clone(), depth: 1 },
                CascadeEffect::Reevaluated {
                    node_id: child.id.clone(),
                    depth: 1,
                    progress_percentage: 100,
                    unlocked: true,
                },
                CascadeEffect::Unlocked { node_id: grandchild.id.clone(), depth: 2 },
                CascadeEffect::Reevaluated {
                    node_id: grandchild.id.clone(),
                    depth: 2,
                    progress_percentage: 100,
                    unlocked: true,
                },
            ]
        );
        assert!(svc.find_mastery("u1", &reward.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn cascade_stops_at_depth_bound() {
        let svc = crate::test_support::helpers::test_service_with(eud_config::ProgressionConfig {
            max_cascade_depth: 1,
            ..Default::default()
        })
        .await;
        seed_profile(&svc, "u1").await;
        let a = svc.create_node(&NewNode::new("A")).await.unwrap();
        let b = svc.create_node(&node_with("B", &[&a.id], &[])).await.unwrap();
        let c = svc.create_node(&node_with("C", &[&b.id], &[])).await.unwrap();

        svc.update_progress("u1", &a.id).await.unwrap();
        assert!(svc.get_progress("u1", &b.id).await.unwrap().is_unlocked);
        assert!(svc.get_progress("u1", &c.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn rank_zone_and_resources_block_unlock() {
        let svc = test_service().await;
        seed_profile(&svc, "u1").await;
        let mut node = NewNode::new("Guild");
        node.required_rank = 2;
        node.zone_type_filter = ZoneType::Governance;
        node.required_resources = BTreeMap::from([("charter".to_string(), 1)]);
        let node = svc.create_node(&node).await.unwrap();

        let update = svc.update_progress("u1", &node.id).await.unwrap();
        assert_eq!(update.progress.progress_percentage, 100);
        assert!(!update.progress.is_unlocked);
        let missing = &update.progress.missing;
        assert_eq!(missing.rank, Some(RankShortfall { required: 2, current: 1 }));
        assert_eq!(missing.zone_type, Some(ZoneType::Governance));
        assert_eq!(missing.resources.len(), 1);

        svc.update_profile("u1", Some(2), Some(EconomicLayer::Laws)).await.unwrap();
        svc.set_resource("u1", "charter", 1).await.unwrap();
        let update = svc.update_progress("u1", &node.id).await.unwrap();
        assert!(update.newly_unlocked);
    }

    #[tokio::test]
    async fn cycles_are_rejected() {
        let svc = test_service().await;
        let a = svc.create_node(&NewNode::new("A")).await.unwrap();
        let b = svc.create_node(&node_with("B", &[&a.id], &[])).await.unwrap();

        let err = svc.set_prerequisites(&a.id, &[b.id.clone()]).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Cycle { .. }));
        let err = svc.set_prerequisites(&a.id, &[a.id.clone()]).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Cycle { .. }));

        let ancestors = svc.ancestors(&b.id).await.unwrap();
        assert_eq!(ancestors.len(), 1);
        let descendants = svc.descendants(&a.id).await.unwrap();
        assert_eq!(descendants[0].id, b.id);
    }

    #[tokio::test]
    async fn levels_stats_and_recommendations() {
        let svc = test_service().await;
        seed_profile(&svc, "u1").await;
        let a = svc.create_node(&NewNode::new("A")).await.unwrap();
        let b = svc.create_node(&node_with("B", &[&a.id], &[])).await.unwrap();
        let art = seed_art(&svc, "Art", 2, &[]).await;
        svc.create_node(&node_with("C", &[], &[&art.id])).await.unwrap();

        let levels = svc.tree_levels("u1").await.unwrap();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[1].nodes[0].node.id, b.id);

        let stats = svc.tech_tree_stats("u1").await.unwrap();
        assert_eq!((stats.total_nodes, stats.unlocked, stats.available), (3, 0, 2));

        svc.update_progress("u1", &a.id).await.unwrap();
        let stats = svc.tech_tree_stats("u1").await.unwrap();
        assert_eq!(stats.unlocked, 2);
        assert!((stats.completion_percentage - 200.0 / 3.0).abs() < 1e-9);

        let recommended = svc.recommended_nodes("u1", 5).await.unwrap();
        let names: Vec<&str> = recommended.iter().map(|s| s.node.name.as_str()).collect();
        assert_eq!(names, vec!["C"]);
    }
}
