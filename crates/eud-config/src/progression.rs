//! Tunables of the mastery tracker and tech tree resolver.

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Mastery level counted as "complete" by the tech tree progress check.
const fn default_mastery_ceiling() -> u8 {
    100
}

const fn default_streak_window_hours() -> u32 {
    48
}

const fn default_discovery_xp() -> u32 {
    10
}

const fn default_virtue_ceiling() -> f64 {
    100.0
}

const fn default_virtue_reward_threshold() -> u8 {
    50
}

const fn default_virtue_history_limit() -> u32 {
    100
}

const fn default_max_cascade_depth() -> u32 {
    4
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ProgressionConfig {
    #[serde(default = "default_mastery_ceiling")]
    pub mastery_ceiling: u8,

    /// A practice within this many hours of the previous one extends the streak.
    #[serde(default = "default_streak_window_hours")]
    pub streak_window_hours: u32,

    /// XP granted once when an art is discovered.
    #[serde(default = "default_discovery_xp")]
    pub discovery_xp: u32,

    /// Upper bound of every virtue in the happiness metrics.
    #[serde(default = "default_virtue_ceiling")]
    pub virtue_ceiling: f64,

    /// Mastery level from which milestone crossings also raise virtues.
    #[serde(default = "default_virtue_reward_threshold")]
    pub virtue_reward_threshold: u8,

    /// Virtue snapshots kept per user.
    #[serde(default = "default_virtue_history_limit")]
    pub virtue_history_limit: u32,

    /// How many levels of dependent nodes an unlock re-evaluates.
    #[serde(default = "default_max_cascade_depth")]
    pub max_cascade_depth: u32,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            mastery_ceiling: default_mastery_ceiling(),
            streak_window_hours: default_streak_window_hours(),
            discovery_xp: default_discovery_xp(),
            virtue_ceiling: default_virtue_ceiling(),
            virtue_reward_threshold: default_virtue_reward_threshold(),
            virtue_history_limit: default_virtue_history_limit(),
            max_cascade_depth: default_max_cascade_depth(),
        }
    }
}

impl ProgressionConfig {
    /// Reject values the engine cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mastery_ceiling == 0 || self.mastery_ceiling > 100 {
            return Err(ConfigError::invalid(
                "progression.mastery_ceiling",
                "must be within 1..=100",
            ));
        }
        if self.streak_window_hours == 0 {
            return Err(ConfigError::invalid(
                "progression.streak_window_hours",
                "must be positive",
            ));
        }
        if !self.virtue_ceiling.is_finite() || self.virtue_ceiling <= 0.0 {
            return Err(ConfigError::invalid(
                "progression.virtue_ceiling",
                "must be a positive number",
            ));
        }
        if self.virtue_reward_threshold > 100 {
            return Err(ConfigError::invalid(
                "progression.virtue_reward_threshold",
                "must be within 0..=100",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ProgressionConfig::default();
        assert_eq!(config.mastery_ceiling, 100);
        assert_eq!(config.streak_window_hours, 48);
        assert_eq!(config.discovery_xp, 10);
        assert_eq!(config.virtue_reward_threshold, 50);
        assert_eq!(config.virtue_history_limit, 100);
        assert_eq!(config.max_cascade_depth, 4);
        config.validate().unwrap();
    }

    #[test]
    fn zero_ceiling_is_rejected() {
        let config = ProgressionConfig {
            mastery_ceiling: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("mastery_ceiling"));
    }

    #[test]
    fn negative_virtue_ceiling_is_rejected() {
        let config = ProgressionConfig {
            virtue_ceiling: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "progression.virtue_ceiling"
        ));
    }
}
