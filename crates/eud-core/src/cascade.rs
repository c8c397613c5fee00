//! Effects produced when a tech tree unlock cascades.
//!
//! An unlock never triggers further work implicitly. The resolver returns the
//! list of effects it applied, in order, so callers can log, display, or
//! assert on them.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::virtues::VirtueMap;

/// One step of an unlock cascade.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CascadeEffect {
    /// A node flipped to unlocked.
    Unlocked { node_id: String, depth: u32 },
    /// The node's one-time achievement bonus was applied.
    BonusGranted {
        node_id: String,
        xp: u32,
        /// Virtue gains after capping at the ceiling.
        virtues: VirtueMap,
    },
    /// An art listed in the node's `unlocks_arts` was discovered.
    ArtDiscovered { node_id: String, art_id: String },
    /// An art listed in `unlocks_arts` does not exist in the catalog.
    ArtMissing { node_id: String, art_id: String },
    /// A dependent node was re-evaluated after its prerequisite unlocked.
    Reevaluated {
        node_id: String,
        depth: u32,
        progress_percentage: u8,
        unlocked: bool,
    },
}

impl CascadeEffect {
    /// Node the effect belongs to.
    #[must_use]
    pub fn node_id(&self) -> &str {
        match self {
            Self::Unlocked { node_id, .. }
            | Self::BonusGranted { node_id, .. }
            | Self::ArtDiscovered { node_id, .. }
            | Self::ArtMissing { node_id, .. }
            | Self::Reevaluated { node_id, .. } => node_id,
        }
    }

    #[must_use]
    pub const fn is_unlock(&self) -> bool {
        matches!(self, Self::Unlocked { .. })
    }
}
