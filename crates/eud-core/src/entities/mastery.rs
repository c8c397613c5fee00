use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A user's cumulative progress record for one art. Unique per (user, art).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Mastery {
    pub id: String,
    pub user_id: String,
    pub art_id: String,
    pub discovered_at: DateTime<Utc>,
    /// 0..=100
    pub mastery_level: u8,
    pub last_practiced: Option<DateTime<Utc>>,
    pub practice_streak: u32,
    pub completed_parts: BTreeSet<String>,
    /// First incomplete part in order, `None` once every part is done.
    pub current_part_id: Option<String>,
    pub practice_history: Vec<PracticeHistoryEntry>,
    /// Milestone tags already rewarded (`milestone_25`, ...).
    pub achievements: BTreeSet<String>,
    pub updated_at: DateTime<Utc>,
}

impl Mastery {
    #[must_use]
    pub fn total_practice_sessions(&self) -> usize {
        self.practice_history.len()
    }

    /// Whole days since the last practice, `None` if never practiced.
    #[must_use]
    pub fn days_since_practiced(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_practiced.map(|t| (now - t).num_days())
    }

    /// No practice for 14 days or more (or never).
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.days_since_practiced(now).is_none_or(|d| d >= 14)
    }
}

/// Summary of one practice session appended to the mastery history.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct PracticeHistoryEntry {
    pub session_id: String,
    pub part_id: String,
    pub part_name: String,
    pub practiced_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub completed: bool,
}

/// A user's progress through one stage of an art. Unique per (user, stage).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct StageProgress {
    pub id: String,
    pub user_id: String,
    pub art_id: String,
    pub stage_id: String,
    pub stage_index: u32,
    pub reached_at: DateTime<Utc>,
    pub is_current: bool,
    pub completion_percentage: u8,
}
