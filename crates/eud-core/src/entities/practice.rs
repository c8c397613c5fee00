use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One timed practice event. Immutable once `validated` is set.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct PracticeSession {
    pub id: String,
    pub user_id: String,
    pub art_id: String,
    pub part_id: String,
    pub practiced_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub notes: Option<String>,
    /// Self-rating, 1..=5.
    pub rating: Option<u8>,
    pub validated: bool,
    pub completed: bool,
    /// Milestone XP granted by the recompute this session triggered.
    pub experience_gained: u32,
}
