//! JSONL trail operation envelope.
//!
//! When a trail directory is configured, every mutation is also appended as a
//! `TrailOperation` to `{trail_dir}/{user}.jsonl`, giving each player a
//! replayable log of catalog writes, practice, and unlocks.
//!
//! Files written before the `v` field existed deserialize with `v == 1`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::{EntityType, TrailOp};

const fn default_trail_version() -> u32 {
    1
}

/// A single operation recorded in the JSONL trail.
///
/// `data` holds the full entity for `Create`, the changed fields for
/// `Update`, and a `{from, to}` style payload for `Transition`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct TrailOperation {
    #[serde(default = "default_trail_version")]
    pub v: u32,

    /// RFC 3339 timestamp of the operation.
    pub ts: String,

    /// User the operation was performed for. Catalog writes use `"catalog"`.
    pub user: String,

    pub op: TrailOp,

    pub entity: EntityType,

    /// ID of the affected entity.
    pub id: String,

    pub data: serde_json::Value,
}

/// Trail owner used for catalog (non-user) writes.
pub const CATALOG_TRAIL_USER: &str = "catalog";
