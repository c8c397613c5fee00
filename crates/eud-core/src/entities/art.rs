use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::{Difficulty, EconomicLayer, PracticeMethod, ValidationMethod, Virtue};
use crate::virtues::VirtueMap;

/// A learnable practice with ordered parts and stages.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Art {
    pub id: String,
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
    pub created_at: DateTime<Utc>,
}

impl Art {
    /// The virtue with the largest improvement, if any.
    #[must_use]
    pub fn primary_virtue(&self) -> Option<Virtue> {
        self.improved_virtues
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(v, _)| *v)
    }
}

/// An atomic practiceable unit of an art. `order_index` is contiguous from 0.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ArtPart {
    pub id: String,
    pub art_id: String,
    pub name: String,
    pub description: Option<String>,
    pub order_index: u32,
    pub practice_method: PracticeMethod,
    pub validation_method: ValidationMethod,
    pub estimated_hours: u32,
}

/// A mastery-threshold milestone within an art.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ArtStage {
    pub id: String,
    pub art_id: String,
    pub name: String,
    pub description: Option<String>,
    pub order_index: u32,
    /// Mastery level (0..=100) at which this stage is reached.
    pub mastery_threshold: u8,
    /// Catalog data; reaching the stage does not apply it.
    pub virtue_bonuses: VirtueMap,
}
