//! Enums for catalog metadata, player gating, audit actions and trail ops.
//!
//! All enums use `snake_case` serialization via `#[serde(rename_all = "snake_case")]`
//! and expose `as_str()` for SQL storage.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! impl_display {
    ($($ty:ty),* $(,)?) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }
        )*
    };
}

// ---------------------------------------------------------------------------
// TaxonomyLevel
// ---------------------------------------------------------------------------

/// Depth class of a taxonomy node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaxonomyLevel {
    Category,
    Subcategory,
    Specialty,
}

impl TaxonomyLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Subcategory => "subcategory",
            Self::Specialty => "specialty",
        }
    }

    /// Level of a child node created under this one. Specialty is the floor.
    #[must_use]
    pub const fn child(self) -> Self {
        match self {
            Self::Category => Self::Subcategory,
            Self::Subcategory | Self::Specialty => Self::Specialty,
        }
    }
}

// ---------------------------------------------------------------------------
// Difficulty
// ---------------------------------------------------------------------------

/// Difficulty of an art, 1 (beginner) through 5 (master).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
    Master,
}

impl Difficulty {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
            Self::Expert => "expert",
            Self::Master => "master",
        }
    }

    /// Numeric level, 1..=5.
    #[must_use]
    pub const fn level(self) -> u8 {
        match self {
            Self::Beginner => 1,
            Self::Intermediate => 2,
            Self::Advanced => 3,
            Self::Expert => 4,
            Self::Master => 5,
        }
    }

    #[must_use]
    pub const fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Self::Beginner),
            2 => Some(Self::Intermediate),
            3 => Some(Self::Advanced),
            4 => Some(Self::Expert),
            5 => Some(Self::Master),
            _ => None,
        }
    }

    /// Arts of difficulty 3 and above count as advanced.
    #[must_use]
    pub const fn is_advanced(self) -> bool {
        self.level() >= 3
    }
}

// ---------------------------------------------------------------------------
// EconomicLayer
// ---------------------------------------------------------------------------

/// Economic tier of a player. Ordered: each layer includes the ones below it.
///
/// ```text
/// port < laws < republic
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EconomicLayer {
    Port,
    Laws,
    Republic,
}

impl EconomicLayer {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Port => "port",
            Self::Laws => "laws",
            Self::Republic => "republic",
        }
    }

    /// Whether a player on this layer may access content gated at `required`.
    #[must_use]
    pub fn grants(self, required: Self) -> bool {
        self >= required
    }

    /// Zone types a player on this layer may work in.
    #[must_use]
    pub const fn permitted_zone_types(self) -> &'static [ZoneType] {
        match self {
            Self::Port => &[
                ZoneType::Any,
                ZoneType::Academic,
                ZoneType::Cultural,
                ZoneType::Natural,
                ZoneType::Social,
            ],
            Self::Laws => &[
                ZoneType::Any,
                ZoneType::Academic,
                ZoneType::Cultural,
                ZoneType::Natural,
                ZoneType::Social,
                ZoneType::Economic,
                ZoneType::Governance,
            ],
            Self::Republic => &[
                ZoneType::Any,
                ZoneType::Academic,
                ZoneType::Cultural,
                ZoneType::Natural,
                ZoneType::Social,
                ZoneType::Economic,
                ZoneType::Governance,
                ZoneType::Innovation,
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// PracticeMethod / ValidationMethod
// ---------------------------------------------------------------------------

/// How an art part is practiced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PracticeMethod {
    Theory,
    Practice,
    Creation,
    Reflection,
    Teaching,
}

impl PracticeMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Theory => "theory",
            Self::Practice => "practice",
            Self::Creation => "creation",
            Self::Reflection => "reflection",
            Self::Teaching => "teaching",
        }
    }
}

/// Who confirms that a part was completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMethod {
    #[serde(rename = "self")]
    SelfCheck,
    Peer,
    Mentor,
    System,
}

impl ValidationMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SelfCheck => "self",
            Self::Peer => "peer",
            Self::Mentor => "mentor",
            Self::System => "system",
        }
    }
}

// ---------------------------------------------------------------------------
// ZoneType
// ---------------------------------------------------------------------------

/// Zone type a tech tree node is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ZoneType {
    Any,
    Academic,
    Cultural,
    Natural,
    Social,
    Economic,
    Governance,
    Innovation,
}

impl ZoneType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Academic => "academic",
            Self::Cultural => "cultural",
            Self::Natural => "natural",
            Self::Social => "social",
            Self::Economic => "economic",
            Self::Governance => "governance",
            Self::Innovation => "innovation",
        }
    }
}

// ---------------------------------------------------------------------------
// Virtue
// ---------------------------------------------------------------------------

/// A named player attribute tracked in the happiness metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Virtue {
    Wisdom,
    Courage,
    Temperance,
    Justice,
    Strength,
    Health,
    Beauty,
    Endurance,
}

impl Virtue {
    pub const ALL: [Self; 8] = [
        Self::Wisdom,
        Self::Courage,
        Self::Temperance,
        Self::Justice,
        Self::Strength,
        Self::Health,
        Self::Beauty,
        Self::Endurance,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wisdom => "wisdom",
            Self::Courage => "courage",
            Self::Temperance => "temperance",
            Self::Justice => "justice",
            Self::Strength => "strength",
            Self::Health => "health",
            Self::Beauty => "beauty",
            Self::Endurance => "endurance",
        }
    }

    /// Parse a virtue name, ignoring ASCII case.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(name))
    }
}

// ---------------------------------------------------------------------------
// EntityType
// ---------------------------------------------------------------------------

/// Entity kinds referenced by the audit trail and JSONL trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Taxonomy,
    Art,
    ArtPart,
    ArtStage,
    Mastery,
    PracticeSession,
    StageProgress,
    TechTreeNode,
    TechTreeProgress,
    Profile,
}

impl EntityType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Taxonomy => "taxonomy",
            Self::Art => "art",
            Self::ArtPart => "art_part",
            Self::ArtStage => "art_stage",
            Self::Mastery => "mastery",
            Self::PracticeSession => "practice_session",
            Self::StageProgress => "stage_progress",
            Self::TechTreeNode => "tech_tree_node",
            Self::TechTreeProgress => "tech_tree_progress",
            Self::Profile => "profile",
        }
    }
}

// ---------------------------------------------------------------------------
// AuditAction
// ---------------------------------------------------------------------------

/// Action recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Updated,
    Discovered,
    Practiced,
    Validated,
    StageAdvanced,
    MilestoneReached,
    VirtuesImproved,
    ProgressUpdated,
    Unlocked,
    BonusGranted,
}

impl AuditAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Discovered => "discovered",
            Self::Practiced => "practiced",
            Self::Validated => "validated",
            Self::StageAdvanced => "stage_advanced",
            Self::MilestoneReached => "milestone_reached",
            Self::VirtuesImproved => "virtues_improved",
            Self::ProgressUpdated => "progress_updated",
            Self::Unlocked => "unlocked",
            Self::BonusGranted => "bonus_granted",
        }
    }
}

// ---------------------------------------------------------------------------
// TrailOp
// ---------------------------------------------------------------------------

/// Kind of mutation written to the JSONL trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TrailOp {
    Create,
    Update,
    Transition,
}

impl TrailOp {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Transition => "transition",
        }
    }
}

impl_display!(
    TaxonomyLevel,
    Difficulty,
    EconomicLayer,
    PracticeMethod,
    ValidationMethod,
    ZoneType,
    Virtue,
    EntityType,
    AuditAction,
    TrailOp,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn economic_layers_are_cumulative() {
        assert!(EconomicLayer::Republic.grants(EconomicLayer::Port));
        assert!(EconomicLayer::Laws.grants(EconomicLayer::Laws));
        assert!(!EconomicLayer::Port.grants(EconomicLayer::Laws));
    }

    #[test]
    fn zone_types_grow_with_layer() {
        let port = EconomicLayer::Port.permitted_zone_types();
        let republic = EconomicLayer::Republic.permitted_zone_types();
        assert!(!port.contains(&ZoneType::Governance));
        assert!(republic.contains(&ZoneType::Innovation));
        assert!(port.iter().all(|z| republic.contains(z)));
    }

    #[test]
    fn difficulty_levels_roundtrip() {
        for level in 1..=5 {
            let d = Difficulty::from_level(level).unwrap();
            assert_eq!(d.level(), level);
        }
        assert_eq!(Difficulty::from_level(0), None);
        assert_eq!(Difficulty::from_level(6), None);
        assert!(Difficulty::Advanced.is_advanced());
        assert!(!Difficulty::Intermediate.is_advanced());
    }

    #[test]
    fn as_str_matches_serde() {
        for v in Virtue::ALL {
            let json = serde_json::to_value(v).unwrap();
            assert_eq!(json, serde_json::Value::String(v.as_str().to_string()));
        }
        let json = serde_json::to_value(ValidationMethod::SelfCheck).unwrap();
        assert_eq!(json, serde_json::json!("self"));
    }

    #[test]
    fn virtue_parse_is_case_insensitive() {
        assert_eq!(Virtue::parse("Wisdom"), Some(Virtue::Wisdom));
        assert_eq!(Virtue::parse("COURAGE"), Some(Virtue::Courage));
        assert_eq!(Virtue::parse("charisma"), None);
    }
}
