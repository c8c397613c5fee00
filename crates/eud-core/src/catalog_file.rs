//! TOML catalog file format used by `eud catalog import`.
//!
//! The file references taxonomies, arts and nodes by **name**, so a catalog
//! can be written by hand without knowing generated IDs. The importer
//! resolves names to IDs in file order: parents before children, arts
//! before the nodes that reference them.
//!
//! ```toml
//! [[taxonomy]]
//! name = "Arts"
//!
//! [[taxonomy]]
//! name = "Music"
//! parent = "Arts"
//!
//! [[art]]
//! name = "Violin"
//! taxonomy = "Music"
//! improved_virtues = { beauty = 10.0 }
//!
//! [[art.parts]]
//! name = "Bow hold"
//!
//! [[art.stages]]
//! name = "Novice"
//! mastery_threshold = 0
//!
//! [[node]]
//! name = "Strings I"
//! required_arts = ["Violin"]
//! ```

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::entities::AchievementBonus;
use crate::enums::{Difficulty, EconomicLayer, PracticeMethod, TaxonomyLevel, ValidationMethod, Virtue, ZoneType};
use crate::errors::CoreError;
use crate::virtues::VirtueMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CatalogFile {
    #[serde(default, rename = "taxonomy")]
    pub taxonomies: Vec<TaxonomyDef>,
    #[serde(default, rename = "art")]
    pub arts: Vec<ArtDef>,
    #[serde(default, rename = "node")]
    pub nodes: Vec<NodeDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TaxonomyDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Name of the parent taxonomy.
    #[serde(default)]
    pub parent: Option<String>,
    /// Derived from the parent's level when omitted.
    #[serde(default)]
    pub level: Option<TaxonomyLevel>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ArtDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: Difficulty,
    /// Name of the taxonomy the art belongs to.
    #[serde(default)]
    pub taxonomy: Option<String>,
    #[serde(default)]
    pub required_virtues: BTreeMap<String, f64>,
    #[serde(default)]
    pub improved_virtues: BTreeMap<String, f64>,
    #[serde(default = "default_rank")]
    pub rank_required: u8,
    #[serde(default = "default_layer")]
    pub economic_layer_required: EconomicLayer,
    #[serde(default = "default_true")]
    pub is_unlocked_default: bool,
    #[serde(default = "default_mastery_days")]
    pub average_mastery_time_days: u32,
    #[serde(default)]
    pub parts: Vec<PartDef>,
    #[serde(default)]
    pub stages: Vec<StageDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PartDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_practice_method")]
    pub practice_method: PracticeMethod,
    #[serde(default = "default_validation_method")]
    pub validation_method: ValidationMethod,
    #[serde(default = "default_hours")]
    pub estimated_hours: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StageDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub mastery_threshold: u8,
    #[serde(default)]
    pub virtue_bonuses: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct NodeDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub level: u32,
    /// Names of prerequisite nodes.
    #[serde(default)]
    pub prerequisites: Vec<String>,
    /// Names of arts whose mastery drives progress.
    #[serde(default)]
    pub required_arts: Vec<String>,
    /// Names of arts discovered on unlock.
    #[serde(default)]
    pub unlocks_arts: Vec<String>,
    #[serde(default = "default_rank")]
    pub required_rank: u8,
    #[serde(default = "default_zone")]
    pub zone_type_filter: ZoneType,
    #[serde(default)]
    pub required_resources: BTreeMap<String, i64>,
    #[serde(default)]
    pub bonus_xp: u32,
    #[serde(default)]
    pub bonus_virtues: BTreeMap<String, f64>,
    #[serde(default)]
    pub unlock_message: Option<String>,
}

const fn default_difficulty() -> Difficulty {
    Difficulty::Beginner
}

const fn default_rank() -> u8 {
    1
}

const fn default_layer() -> EconomicLayer {
    EconomicLayer::Port
}

const fn default_true() -> bool {
    true
}

const fn default_mastery_days() -> u32 {
    30
}

const fn default_practice_method() -> PracticeMethod {
    PracticeMethod::Practice
}

const fn default_validation_method() -> ValidationMethod {
    ValidationMethod::SelfCheck
}

const fn default_hours() -> u32 {
    1
}

const fn default_zone() -> ZoneType {
    ZoneType::Any
}

/// Convert a name-keyed virtue table into a [`VirtueMap`].
///
/// # Errors
///
/// Returns [`CoreError::Validation`] for an unknown virtue name.
pub fn parse_virtues(raw: &BTreeMap<String, f64>) -> Result<VirtueMap, CoreError> {
    raw.iter()
        .map(|(name, amount)| {
            Virtue::parse(name)
                .map(|v| (v, *amount))
                .ok_or_else(|| CoreError::Validation(format!("unknown virtue '{name}'")))
        })
        .collect()
}

impl NodeDef {
    /// The node's achievement bonus with virtue names resolved.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] for an unknown virtue name.
    pub fn achievement_bonus(&self) -> Result<AchievementBonus, CoreError> {
        Ok(AchievementBonus {
            xp: self.bonus_xp,
            virtues: parse_virtues(&self.bonus_virtues)?,
        })
    }
}

fn check_unique<'a>(kind: &str, names: impl Iterator<Item = &'a str>) -> Result<(), CoreError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(CoreError::Validation(format!("duplicate {kind} name '{name}'")));
        }
    }
    Ok(())
}

impl CatalogFile {
    /// Check names, references and value ranges before anything is written.
    ///
    /// Parents and prerequisites must be declared earlier in the file, which
    /// also rules out cycles.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] describing the first problem found.
    pub fn validate(&self) -> Result<(), CoreError> {
        check_unique("taxonomy", self.taxonomies.iter().map(|t| t.name.as_str()))?;
        check_unique("art", self.arts.iter().map(|a| a.name.as_str()))?;
        check_unique("node", self.nodes.iter().map(|n| n.name.as_str()))?;

        let mut taxonomies = HashSet::new();
        for t in &self.taxonomies {
            if let Some(parent) = &t.parent {
                if !taxonomies.contains(parent.as_str()) {
                    return Err(CoreError::Validation(format!(
                        "taxonomy '{}' references unknown or later parent '{parent}'",
                        t.name
                    )));
                }
            }
            taxonomies.insert(t.name.as_str());
        }

        let arts: HashSet<&str> = self.arts.iter().map(|a| a.name.as_str()).collect();
        for art in &self.arts {
            if let Some(tax) = &art.taxonomy {
                if !taxonomies.contains(tax.as_str()) {
                    return Err(CoreError::Validation(format!(
                        "art '{}' references unknown taxonomy '{tax}'",
                        art.name
                    )));
                }
            }
            if !(1..=4).contains(&art.rank_required) {
                return Err(CoreError::Validation(format!(
                    "art '{}' rank_required must be 1..=4",
                    art.name
                )));
            }
            parse_virtues(&art.required_virtues)?;
            parse_virtues(&art.improved_virtues)?;
            let mut previous: Option<u8> = None;
            for stage in &art.stages {
                if stage.mastery_threshold > 100 || previous.is_some_and(|p| stage.mastery_threshold <= p) {
                    return Err(CoreError::Validation(format!(
                        "art '{}' stage '{}' threshold must increase and stay within 0..=100",
                        art.name, stage.name
                    )));
                }
                parse_virtues(&stage.virtue_bonuses)?;
                previous = Some(stage.mastery_threshold);
            }
        }

        let mut nodes = HashSet::new();
        for node in &self.nodes {
            if let Some(p) = node.prerequisites.iter().find(|p| !nodes.contains(p.as_str())) {
                return Err(CoreError::Validation(format!(
                    "node '{}' references unknown or later prerequisite '{p}'",
                    node.name
                )));
            }
            if let Some(a) = node
                .required_arts
                .iter()
                .chain(&node.unlocks_arts)
                .find(|a| !arts.contains(a.as_str()))
            {
                return Err(CoreError::Validation(format!(
                    "node '{}' references unknown art '{a}'",
                    node.name
                )));
            }
            node.achievement_bonus()?;
            nodes.insert(node.name.as_str());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
[[taxonomy]]
name = "Arts"

[[taxonomy]]
name = "Music"
parent = "Arts"

[[art]]
name = "Violin"
taxonomy = "Music"
difficulty = "intermediate"
improved_virtues = { beauty = 10.0, Endurance = 4.0 }

[[art.parts]]
name = "Bow hold"
practice_method = "theory"

[[art.parts]]
name = "Scales"

[[art.stages]]
name = "Novice"
mastery_threshold = 0

[[art.stages]]
name = "Player"
mastery_threshold = 50

[[node]]
name = "Strings I"
required_arts = ["Violin"]
bonus_xp = 40
bonus_virtues = { beauty = 2.0 }

[[node]]
name = "Strings II"
prerequisites = ["Strings I"]
zone_type_filter = "cultural"
required_resources = { rosin = 2 }
"#;

    #[test]
    fn parses_and_validates_sample() {
        let file: CatalogFile = toml::from_str(SAMPLE).unwrap();
        file.validate().unwrap();

        assert_eq!(file.taxonomies.len(), 2);
        let violin = &file.arts[0];
        assert_eq!(violin.difficulty, Difficulty::Intermediate);
        assert_eq!(violin.parts[0].practice_method, PracticeMethod::Theory);
        assert_eq!(violin.parts[1].validation_method, ValidationMethod::SelfCheck);
        assert!(violin.is_unlocked_default);

        let improved = parse_virtues(&violin.improved_virtues).unwrap();
        assert_eq!(improved.get(&Virtue::Endurance), Some(&4.0));

        let bonus = file.nodes[0].achievement_bonus().unwrap();
        assert_eq!(bonus.xp, 40);
        assert_eq!(file.nodes[1].zone_type_filter, ZoneType::Cultural);
    }

    #[test]
    fn rejects_non_increasing_stage_thresholds() {
        let mut file: CatalogFile = toml::from_str(SAMPLE).unwrap();
        file.arts[0].stages[1].mastery_threshold = 0;
        assert!(matches!(file.validate(), Err(CoreError::Validation(_))));
    }

    #[test]
    fn rejects_forward_prerequisite() {
        let mut file: CatalogFile = toml::from_str(SAMPLE).unwrap();
        file.nodes[0].prerequisites.push("Strings II".into());
        let err = file.validate().unwrap_err();
        assert!(err.to_string().contains("Strings II"));
    }

    #[test]
    fn rejects_unknown_virtue() {
        let mut file: CatalogFile = toml::from_str(SAMPLE).unwrap();
        file.arts[0].improved_virtues.insert("luck".into(), 1.0);
        assert!(matches!(file.validate(), Err(CoreError::Validation(msg)) if msg.contains("luck")));
    }

    #[test]
    fn empty_file_is_valid() {
        let file: CatalogFile = toml::from_str("").unwrap();
        file.validate().unwrap();
        assert_eq!(file, CatalogFile::default());
    }
}
