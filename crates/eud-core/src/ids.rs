//! ID prefix constants.
//!
//! IDs are `{prefix}-{8 hex chars}`, generated by the database layer.

pub const PREFIX_TAXONOMY: &str = "tax";
pub const PREFIX_ART: &str = "art";
pub const PREFIX_PART: &str = "prt";
pub const PREFIX_STAGE: &str = "stg";
pub const PREFIX_MASTERY: &str = "mst";
pub const PREFIX_SESSION: &str = "pss";
pub const PREFIX_STAGE_PROGRESS: &str = "sgp";
pub const PREFIX_NODE: &str = "tre";
pub const PREFIX_NODE_PROGRESS: &str = "ttp";
pub const PREFIX_AUDIT: &str = "aud";
pub const PREFIX_VIRTUE_HISTORY: &str = "vhs";

pub const ALL_PREFIXES: &[&str] = &[
    PREFIX_TAXONOMY,
    PREFIX_ART,
    PREFIX_PART,
    PREFIX_STAGE,
    PREFIX_MASTERY,
    PREFIX_SESSION,
    PREFIX_STAGE_PROGRESS,
    PREFIX_NODE,
    PREFIX_NODE_PROGRESS,
    PREFIX_AUDIT,
    PREFIX_VIRTUE_HISTORY,
];
