//! Local libSQL database and JSONL trail locations.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_path() -> String {
    ".eudaimonia/eudaimonia.db".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Path of the local database file. `:memory:` keeps everything in RAM.
    #[serde(default = "default_path")]
    pub path: String,

    /// Directory for per-user JSONL trail files. Empty disables the trail.
    #[serde(default)]
    pub trail_dir: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            trail_dir: String::new(),
        }
    }
}

impl DatabaseConfig {
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.path == ":memory:"
    }

    #[must_use]
    pub fn trail_enabled(&self) -> bool {
        !self.trail_dir.is_empty()
    }

    /// Trail directory, if the trail is enabled.
    #[must_use]
    pub fn trail_path(&self) -> Option<PathBuf> {
        self.trail_enabled().then(|| PathBuf::from(&self.trail_dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_project_dir() {
        let config = DatabaseConfig::default();
        assert_eq!(config.path, ".eudaimonia/eudaimonia.db");
        assert!(!config.is_in_memory());
        assert!(config.trail_path().is_none());
    }

    #[test]
    fn trail_path_when_set() {
        let config = DatabaseConfig {
            trail_dir: ".eudaimonia/trail".into(),
            ..Default::default()
        };
        assert_eq!(config.trail_path(), Some(PathBuf::from(".eudaimonia/trail")));
    }
}
