//! Pure progression math: mastery level, current-part pointer, stage
//! selection, milestone rewards, virtue scaling and practice streaks.
//!
//! Nothing here touches storage. The database layer loads the records,
//! calls into this module, and persists whatever changed.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::entities::{Art, ArtPart, ArtStage, Mastery, PracticeHistoryEntry};
use crate::virtues::{VirtueMap, scale};

/// Mastery levels that grant XP equal to their value, once each.
pub const MILESTONES: [u8; 4] = [25, 50, 75, 100];

/// Largest fraction of an art's improved-virtue deltas ever applied.
pub const MAX_VIRTUE_SCALE: f64 = 0.5;

/// Achievement tag recorded on the mastery once `milestone` has been rewarded.
#[must_use]
pub fn milestone_tag(milestone: u8) -> String {
    format!("milestone_{milestone}")
}

/// `min(100, round(100 * completed / total))`, or 0 for an art without parts.
#[must_use]
pub fn mastery_level(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    // Round half up in integer arithmetic.
    let level = (200 * completed + total) / (2 * total);
    u8::try_from(level.min(100)).unwrap_or(100)
}

/// Count of completed IDs that still name a part of the art.
#[must_use]
pub fn completed_count(parts: &[ArtPart], completed: &BTreeSet<String>) -> usize {
    parts.iter().filter(|p| completed.contains(&p.id)).count()
}

/// First part in order index that is not completed.
#[must_use]
pub fn first_incomplete<'a>(parts: &'a [ArtPart], completed: &BTreeSet<String>) -> Option<&'a ArtPart> {
    parts
        .iter()
        .filter(|p| !completed.contains(&p.id))
        .min_by_key(|p| p.order_index)
}

/// Where the current-part pointer goes after `just_completed` was completed.
///
/// The pointer only moves when it pointed at the completed part (or at
/// nothing). It then lands on the first uncompleted part in order, or on
/// `None` when all are done.
#[must_use]
pub fn advance_current_part(
    parts: &[ArtPart],
    completed: &BTreeSet<String>,
    current: Option<&str>,
    just_completed: &str,
) -> Option<String> {
    if let Some(current) = current {
        if current != just_completed {
            return Some(current.to_string());
        }
    }
    first_incomplete(parts, completed).map(|p| p.id.clone())
}

/// Highest-index stage whose threshold is at or below `level`.
#[must_use]
pub fn select_stage(stages: &[ArtStage], level: u8) -> Option<&ArtStage> {
    stages
        .iter()
        .filter(|s| s.mastery_threshold <= level)
        .max_by_key(|s| s.order_index)
}

/// Relative progress through the stage at `index` toward the next threshold.
#[must_use]
pub fn stage_completion(stages: &[ArtStage], index: u32, level: u8) -> u8 {
    let Some(current) = stages.iter().find(|s| s.order_index == index) else {
        return 0;
    };
    let next_threshold = stages
        .iter()
        .filter(|s| s.order_index > index)
        .min_by_key(|s| s.order_index)
        .map_or(100, |s| s.mastery_threshold);
    let floor = current.mastery_threshold;
    if next_threshold <= floor {
        return 100;
    }
    let span = u32::from(next_threshold - floor);
    let done = u32::from(level.saturating_sub(floor));
    u8::try_from((done * 100 / span).min(100)).unwrap_or(100)
}

/// Milestones at or below `level` whose tag is not yet in `achievements`.
#[must_use]
pub fn newly_reached_milestones(level: u8, achievements: &BTreeSet<String>) -> Vec<u8> {
    MILESTONES
        .into_iter()
        .filter(|m| level >= *m && !achievements.contains(&milestone_tag(*m)))
        .collect()
}

/// Fraction of the art's virtue deltas applied at `level`: `min(0.5, level / 200)`.
#[must_use]
pub fn virtue_scale(level: u8) -> f64 {
    (f64::from(level) / 200.0).min(MAX_VIRTUE_SCALE)
}

/// Streak after a practice at `at`, given the previous practice time.
///
/// A practice strictly less than `window` after the previous one extends
/// the streak; anything else (including the first practice) resets it to 1.
#[must_use]
pub fn next_streak(
    last_practiced: Option<DateTime<Utc>>,
    at: DateTime<Utc>,
    streak: u32,
    window: Duration,
) -> u32 {
    match last_practiced {
        Some(last) if (at - last).abs() < window => streak.saturating_add(1),
        _ => 1,
    }
}

/// Consecutive days with practice, counting back from `today`.
///
/// Zero when there was no practice today.
#[must_use]
pub fn calendar_streak(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let mut streak = 0;
    let mut day = today;
    while days.contains(&day) {
        streak += 1;
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => break,
        }
    }
    streak
}

/// Fraction of an art counted toward a tech tree node, on a `ceiling` scale.
#[must_use]
pub fn art_completion_fraction(level: u8, ceiling: u8) -> f64 {
    if ceiling == 0 {
        return 1.0;
    }
    f64::from(level.min(ceiling)) / f64::from(ceiling)
}

/// Average of per-art fractions as a rounded percentage. No arts means 100.
#[must_use]
pub fn average_percentage(fractions: &[f64]) -> u8 {
    if fractions.is_empty() {
        return 100;
    }
    #[allow(clippy::cast_precision_loss)]
    let avg = fractions.iter().sum::<f64>() / fractions.len() as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let pct = (avg * 100.0).round().clamp(0.0, 100.0) as u8;
    pct
}

/// Record a practice on the mastery: history, last-practiced time and streak.
pub fn record_practice(mastery: &mut Mastery, entry: PracticeHistoryEntry, window: Duration) {
    let at = entry.practiced_at;
    mastery.practice_streak = next_streak(mastery.last_practiced, at, mastery.practice_streak, window);
    mastery.last_practiced = Some(mastery.last_practiced.map_or(at, |last| last.max(at)));
    mastery.practice_history.push(entry);
}

/// Mark a part completed and move the current-part pointer.
///
/// Returns `false` when the part was already completed (nothing changes).
pub fn complete_part(mastery: &mut Mastery, parts: &[ArtPart], part_id: &str) -> bool {
    if !mastery.completed_parts.insert(part_id.to_string()) {
        return false;
    }
    mastery.current_part_id = advance_current_part(
        parts,
        &mastery.completed_parts,
        mastery.current_part_id.as_deref(),
        part_id,
    );
    true
}

/// Stage movement caused by a recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageChange {
    pub from: Option<u32>,
    pub to: Option<u32>,
}

impl StageChange {
    #[must_use]
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Result of recomputing a mastery after its completed set changed.
#[derive(Debug, Clone, PartialEq)]
pub struct Recompute {
    pub previous_level: u8,
    pub mastery_level: u8,
    pub stage: StageChange,
    /// Completion of the stage selected after the recompute.
    pub stage_completion: u8,
    pub milestones: Vec<u8>,
    pub xp: u32,
    /// Virtue increments to raise (before capping at the ceiling).
    pub virtue_increments: VirtueMap,
}

/// Recompute level, stage and rewards for a mastery.
///
/// Mutates `mastery_level` and `achievements`; each milestone tag is added
/// at most once so its XP is granted exactly once. Virtue increments are
/// produced on every recompute at or above `virtue_threshold`; the caller
/// caps them at the virtue ceiling.
pub fn recompute(
    mastery: &mut Mastery,
    art: &Art,
    parts: &[ArtPart],
    stages: &[ArtStage],
    current_stage: Option<u32>,
    virtue_threshold: u8,
) -> Recompute {
    let previous_level = mastery.mastery_level;
    let level = mastery_level(completed_count(parts, &mastery.completed_parts), parts.len());
    mastery.mastery_level = level;

    let selected = select_stage(stages, level).map(|s| s.order_index);
    let stage = StageChange {
        from: current_stage,
        to: selected,
    };
    let stage_completion = selected.map_or(0, |idx| stage_completion(stages, idx, level));

    let milestones = newly_reached_milestones(level, &mastery.achievements);
    for m in &milestones {
        mastery.achievements.insert(milestone_tag(*m));
    }
    let xp = milestones.iter().map(|m| u32::from(*m)).sum();

    let virtue_increments = if level >= virtue_threshold {
        scale(&art.improved_virtues, virtue_scale(level))
    } else {
        VirtueMap::new()
    };

    Recompute {
        previous_level,
        mastery_level: level,
        stage,
        stage_completion,
        milestones,
        xp,
        virtue_increments,
    }
}
