use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::EconomicLayer;
use crate::virtues::{HappinessMetrics, VirtueMap};

/// Identity-side record read for gating and mutated for rewards.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PlayerProfile {
    pub user_id: String,
    /// 1..=4
    pub rank: u8,
    pub experience_points: u64,
    pub economic_layer: EconomicLayer,
    pub happiness: HappinessMetrics,
    pub resources: BTreeMap<String, i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Virtue values recorded just before a happiness change.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct VirtueHistoryEntry {
    pub id: String,
    pub user_id: String,
    pub values: VirtueMap,
    pub happiness: f64,
    pub recorded_at: DateTime<Utc>,
}
