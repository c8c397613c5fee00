use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::TaxonomyLevel;

/// A node of the self-referencing art classification tree.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ArtTaxonomy {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<String>,
    pub level: TaxonomyLevel,
    /// Slash-separated ancestor IDs ending with this node's ID.
    pub path: String,
    pub created_at: DateTime<Utc>,
}
