use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::ZoneType;
use crate::virtues::VirtueMap;

/// A prerequisite-gated unlock milestone. Edges point to prerequisites.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TechTreeNode {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Display tier.
    pub level: u32,
    pub prerequisites: Vec<String>,
    /// Arts whose mastery drives this node's progress percentage.
    pub required_arts: Vec<String>,
    /// Arts discovered for the user when this node unlocks.
    pub unlocks_arts: Vec<String>,
    pub required_rank: u8,
    pub zone_type_filter: ZoneType,
    pub required_resources: BTreeMap<String, i64>,
    pub achievement_bonus: AchievementBonus,
    pub unlock_message: Option<String>,
}

impl TechTreeNode {
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.prerequisites.is_empty()
    }
}

/// One-time reward granted when a node unlocks.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct AchievementBonus {
    #[serde(default)]
    pub xp: u32,
    #[serde(default)]
    pub virtues: VirtueMap,
}

impl AchievementBonus {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.xp == 0 && self.virtues.is_empty()
    }
}

/// A user's progress toward unlocking one node. Unique per (user, node).
///
/// `is_unlocked` is monotonic: once true it never reverts.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct TechTreeProgress {
    pub id: String,
    pub user_id: String,
    pub node_id: String,
    /// 0..=100
    pub progress_percentage: u8,
    pub is_unlocked: bool,
    pub unlocked_at: Option<DateTime<Utc>>,
    pub missing: MissingRequirements,
    pub updated_at: DateTime<Utc>,
}

/// Everything still standing between a user and a node unlock.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct MissingRequirements {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prerequisites: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arts: Vec<ArtShortfall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<RankShortfall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_type: Option<ZoneType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceShortfall>,
}

impl MissingRequirements {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prerequisites.is_empty()
            && self.arts.is_empty()
            && self.rank.is_none()
            && self.zone_type.is_none()
            && self.resources.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ArtShortfall {
    pub art_id: String,
    pub art_name: String,
    pub mastery_level: u8,
    pub required_level: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RankShortfall {
    pub required: u8,
    pub current: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ResourceShortfall {
    pub resource: String,
    pub required: i64,
    pub available: i64,
}

/// Status of one direct prerequisite, as returned by the prerequisite check.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct PrerequisiteStatus {
    pub node_id: String,
    pub name: String,
    pub unlocked: bool,
}
