//! # eud-config
//!
//! Layered configuration loading for Eudaimonia using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`EUDAIMONIA_*` prefix, `__` as separator)
//! 2. Project-level `.eudaimonia/config.toml`
//! 3. User-level `~/.config/eudaimonia/config.toml`
//! 4. Built-in defaults
//!
//! # Environment Variable Mapping
//!
//! Figment maps `EUDAIMONIA_DATABASE__PATH` -> `database.path`,
//! `EUDAIMONIA_PROGRESSION__MASTERY_CEILING` -> `progression.mastery_ceiling`, etc.
//!
//! # Usage
//!
//! ```no_run
//! use eud_config::EudConfig;
//!
//! let config = EudConfig::load_with_dotenv().expect("config");
//! println!("database: {}", config.database.path);
//! ```

mod database;
mod error;
mod general;
mod progression;

pub use database::DatabaseConfig;
pub use error::ConfigError;
pub use general::GeneralConfig;
pub use progression::ProgressionConfig;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "EUDAIMONIA_";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EudConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub progression: ProgressionConfig,
    #[serde(default)]
    pub general: GeneralConfig,
}

impl EudConfig {
    /// Load configuration from all sources (TOML files + environment variables).
    ///
    /// Does NOT call `dotenvy`; use [`Self::load_with_dotenv`] for `.env` support.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a source fails to parse or a value is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(&Self::figment())
    }

    /// Load configuration after reading `.env` from the current directory.
    ///
    /// # Errors
    ///
    /// Same as [`Self::load`].
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load()
    }

    /// Extract and validate a config from an arbitrary figment.
    ///
    /// # Errors
    ///
    /// Same as [`Self::load`].
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.progression.validate()?;
        Ok(config)
    }

    /// Build the figment provider chain.
    ///
    /// Public so tests can add providers on top.
    #[must_use]
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(global_path));
            }
        }

        let local_path = PathBuf::from(".eudaimonia/config.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("eudaimonia").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_loads() {
        let config = EudConfig::default();
        assert_eq!(config.database.path, ".eudaimonia/eudaimonia.db");
        assert_eq!(config.progression.mastery_ceiling, 100);
        assert_eq!(config.general.default_limit, 20);
    }

    #[test]
    fn figment_builds_without_files() {
        figment::Jail::expect_with(|_jail| {
            let config = EudConfig::from_figment(&EudConfig::figment()).expect("defaults load");
            assert_eq!(config.general.default_limit, 20);
            assert!(!config.database.trail_enabled());
            Ok(())
        });
    }
}
