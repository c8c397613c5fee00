//! Virtue deltas and the player's happiness metrics.
//!
//! Virtue values live on a 0..=ceiling scale (100 by default). Rewards only
//! ever raise a virtue; they never push it past the ceiling.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::Virtue;

/// Per-virtue amounts: requirements, improvements, bonuses, or applied gains.
pub type VirtueMap = BTreeMap<Virtue, f64>;

/// Scale every entry of `deltas` by `factor`.
#[must_use]
pub fn scale(deltas: &VirtueMap, factor: f64) -> VirtueMap {
    deltas.iter().map(|(v, amount)| (*v, amount * factor)).collect()
}

/// The eight tracked virtues of a player plus derived scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HappinessMetrics {
    pub wisdom: f64,
    pub courage: f64,
    pub temperance: f64,
    pub justice: f64,
    pub strength: f64,
    pub health: f64,
    pub beauty: f64,
    pub endurance: f64,
}

impl HappinessMetrics {
    #[must_use]
    pub const fn get(&self, virtue: Virtue) -> f64 {
        match virtue {
            Virtue::Wisdom => self.wisdom,
            Virtue::Courage => self.courage,
            Virtue::Temperance => self.temperance,
            Virtue::Justice => self.justice,
            Virtue::Strength => self.strength,
            Virtue::Health => self.health,
            Virtue::Beauty => self.beauty,
            Virtue::Endurance => self.endurance,
        }
    }

    fn slot(&mut self, virtue: Virtue) -> &mut f64 {
        match virtue {
            Virtue::Wisdom => &mut self.wisdom,
            Virtue::Courage => &mut self.courage,
            Virtue::Temperance => &mut self.temperance,
            Virtue::Justice => &mut self.justice,
            Virtue::Strength => &mut self.strength,
            Virtue::Health => &mut self.health,
            Virtue::Beauty => &mut self.beauty,
            Virtue::Endurance => &mut self.endurance,
        }
    }

    /// Average of wisdom, courage, temperance and justice.
    #[must_use]
    pub fn good_score(&self) -> f64 {
        (self.wisdom + self.courage + self.temperance + self.justice) / 4.0
    }

    /// Average of strength, health, beauty and endurance.
    #[must_use]
    pub fn prosperity_score(&self) -> f64 {
        (self.strength + self.health + self.beauty + self.endurance) / 4.0
    }

    /// Overall happiness: mean of the good and prosperity scores.
    #[must_use]
    pub fn happiness(&self) -> f64 {
        (self.good_score() + self.prosperity_score()) / 2.0
    }

    /// Raise virtues by the given increments, capped at `ceiling`.
    ///
    /// Non-positive increments are ignored and a virtue already at or above
    /// the ceiling is left untouched. Returns the gains actually applied,
    /// omitting virtues that did not change.
    pub fn raise(&mut self, increments: &VirtueMap, ceiling: f64) -> VirtueMap {
        let mut applied = VirtueMap::new();
        for (virtue, amount) in increments {
            if *amount <= 0.0 {
                continue;
            }
            let slot = self.slot(*virtue);
            if *slot >= ceiling {
                continue;
            }
            let next = (*slot + amount).min(ceiling);
            let gain = next - *slot;
            if gain > 0.0 {
                *slot = next;
                applied.insert(*virtue, gain);
            }
        }
        applied
    }

    /// Snapshot of all eight virtues as a map.
    #[must_use]
    pub fn to_map(&self) -> VirtueMap {
        Virtue::ALL.into_iter().map(|v| (v, self.get(v))).collect()
    }
}
