//! Result types returned by the engine and printed as JSON by `eud` commands.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::cascade::CascadeEffect;
use crate::entities::{Mastery, PracticeSession, PrerequisiteStatus, TechTreeNode, TechTreeProgress};
use crate::virtues::VirtueMap;

/// Result of `discover_art`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct DiscoverOutcome {
    pub mastery: Mastery,
    /// False when the art was already discovered.
    pub created: bool,
    pub xp_gained: u32,
}

/// A stage switch caused by a mastery recompute.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct StageAdvance {
    pub from_stage_id: Option<String>,
    pub to_stage_id: Option<String>,
    pub to_stage_name: Option<String>,
}

/// Rewards and state changes from one mastery recompute.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RecomputeReport {
    pub previous_level: u8,
    pub mastery_level: u8,
    pub stage_advance: Option<StageAdvance>,
    pub milestones: Vec<u8>,
    pub xp_gained: u32,
    /// Virtue gains actually applied after capping.
    pub virtues_gained: VirtueMap,
}

/// Result of `log_practice` and `validate_session`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PracticeOutcome {
    pub session: PracticeSession,
    pub mastery: Mastery,
    /// True when this call created the mastery record.
    pub discovered: bool,
    pub report: RecomputeReport,
}

/// Art reference used in summaries.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ArtRef {
    pub art_id: String,
    pub art_name: String,
    pub mastery_level: u8,
    pub sessions: u32,
}

/// Average mastery of a user under one top-level taxonomy.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TaxonomyStat {
    pub taxonomy_id: String,
    pub name: String,
    /// Arts in the category and all its subcategories.
    pub arts: u32,
    pub discovered: u32,
    /// Mean mastery level over discovered arts, 0 when none.
    pub average_mastery: f64,
}

/// Result of `mastery_summary`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct MasterySummary {
    pub user_id: String,
    pub total_arts: u32,
    pub completed_arts: u32,
    pub in_progress_arts: u32,
    pub average_mastery: f64,
    pub most_practiced: Option<ArtRef>,
    pub highest_mastery: Option<ArtRef>,
    pub by_taxonomy: Vec<TaxonomyStat>,
}

/// Result of `practice_stats`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PracticeStats {
    pub user_id: String,
    pub art_id: Option<String>,
    pub days: u32,
    pub total_sessions: u32,
    pub total_minutes: u64,
    pub average_minutes: f64,
    pub longest_minutes: u32,
    pub shortest_minutes: u32,
    pub last_practice: Option<DateTime<Utc>>,
    pub minutes_by_art: BTreeMap<String, u64>,
    pub sessions_by_method: BTreeMap<String, u32>,
    /// `YYYY-MM-DD` -> session count.
    pub sessions_by_day: BTreeMap<String, u32>,
    /// Consecutive days ending today with at least one session.
    pub streak_days: u32,
}

/// Result of `check_prerequisites`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct PrerequisiteCheck {
    pub node_id: String,
    pub all_met: bool,
    pub prerequisites: Vec<PrerequisiteStatus>,
}

/// Result of `update_progress`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ProgressUpdate {
    pub progress: TechTreeProgress,
    /// True only for the call that flipped the node to unlocked.
    pub newly_unlocked: bool,
    pub effects: Vec<CascadeEffect>,
}

/// A node with the user's state, for listings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct NodeStatus {
    pub node: TechTreeNode,
    pub progress_percentage: u8,
    pub is_unlocked: bool,
    pub prerequisites_met: bool,
}

/// One BFS layer of the tech tree.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TreeLevel {
    pub depth: u32,
    pub nodes: Vec<NodeStatus>,
}

/// Result of `tech_tree_stats`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TechTreeStats {
    pub user_id: String,
    pub total_nodes: u32,
    pub unlocked: u32,
    /// Not unlocked, with some progress recorded.
    pub in_progress: u32,
    /// Not unlocked, all prerequisites met.
    pub available: u32,
    pub completion_percentage: f64,
}

/// Result of `eud catalog import`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ImportSummary {
    pub taxonomies: u32,
    pub arts: u32,
    pub parts: u32,
    pub stages: u32,
    pub nodes: u32,
}
