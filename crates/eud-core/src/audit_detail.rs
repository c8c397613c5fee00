//! Typed audit detail payloads.
//!
//! Each audit action can carry a structured `detail` JSON blob. These types
//! fix the shape of the progression-related details.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::virtues::VirtueMap;

/// Detail for `AuditAction::Practiced`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct PracticedDetail {
    pub art_id: String,
    pub part_id: String,
    pub duration_minutes: u32,
    pub completed: bool,
}

/// Detail for `AuditAction::StageAdvanced`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct StageAdvancedDetail {
    pub from: Option<String>,
    pub to: Option<String>,
    pub mastery_level: u8,
}

/// Detail for `AuditAction::MilestoneReached`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct MilestoneDetail {
    pub art_id: String,
    pub milestone: u8,
    pub xp: u32,
}

/// Detail for `AuditAction::VirtuesImproved` and `AuditAction::BonusGranted`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct VirtueGainDetail {
    pub source: String,
    pub xp: u32,
    pub virtues: VirtueMap,
}

/// Detail for `AuditAction::ProgressUpdated` and `AuditAction::Unlocked`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ProgressDetail {
    pub node_id: String,
    pub progress_percentage: u8,
    pub is_unlocked: bool,
}
