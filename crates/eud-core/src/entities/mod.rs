//! Entity structs for all Eudaimonia domain objects.
//!
//! Catalog entities (taxonomy, art, part, stage, tech tree node) are shared
//! read-only reference data. Progress entities (mastery, practice session,
//! stage progress, tech tree progress, profile) are owned by a user.
//! All structs derive `Serialize`, `Deserialize`, and `JsonSchema`.

mod art;
mod audit;
mod mastery;
mod practice;
mod profile;
mod taxonomy;
mod tech_tree;

pub use art::{Art, ArtPart, ArtStage};
pub use audit::AuditEntry;
pub use mastery::{Mastery, PracticeHistoryEntry, StageProgress};
pub use practice::PracticeSession;
pub use profile::{PlayerProfile, VirtueHistoryEntry};
pub use taxonomy::ArtTaxonomy;
pub use tech_tree::{
    AchievementBonus, ArtShortfall, MissingRequirements, PrerequisiteStatus, RankShortfall,
    ResourceShortfall, TechTreeNode, TechTreeProgress,
};
