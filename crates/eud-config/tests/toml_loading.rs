//! Integration tests for TOML configuration loading.
//!
//! Uses `figment::Jail` for sandboxed files and env vars.

use figment::{
    Figment, Jail,
    providers::{Env, Format, Serialized, Toml},
};
use eud_config::{ConfigError, EudConfig};
use pretty_assertions::assert_eq;

#[test]
fn loads_progression_config_from_toml() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r"
[progression]
mastery_ceiling = 5
streak_window_hours = 24
discovery_xp = 0
virtue_ceiling = 10.0
virtue_reward_threshold = 75
virtue_history_limit = 3
max_cascade_depth = 1
",
        )?;

        let config: EudConfig = Figment::from(Serialized::defaults(EudConfig::default()))
            .merge(Toml::file("config.toml"))
            .extract()?;

        assert_eq!(config.progression.mastery_ceiling, 5);
        assert_eq!(config.progression.streak_window_hours, 24);
        assert_eq!(config.progression.discovery_xp, 0);
        assert!((config.progression.virtue_ceiling - 10.0).abs() < f64::EPSILON);
        assert_eq!(config.progression.virtue_reward_threshold, 75);
        assert_eq!(config.progression.virtue_history_limit, 3);
        assert_eq!(config.progression.max_cascade_depth, 1);
        Ok(())
    });
}

#[test]
fn partial_sections_keep_defaults() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
[database]
trail_dir = ".eudaimonia/trail"

[general]
default_limit = 50
default_user = "u-alice"
"#,
        )?;

        let config: EudConfig = Figment::from(Serialized::defaults(EudConfig::default()))
            .merge(Toml::file("config.toml"))
            .extract()?;

        assert_eq!(config.database.path, ".eudaimonia/eudaimonia.db");
        assert!(config.database.trail_enabled());
        assert_eq!(config.general.default_limit, 50);
        assert_eq!(config.general.default_user, "u-alice");
        assert_eq!(config.progression.max_cascade_depth, 4);
        Ok(())
    });
}

#[test]
fn project_file_is_picked_up_by_figment() {
    Jail::expect_with(|jail| {
        std::fs::create_dir_all(jail.directory().join(".eudaimonia")).map_err(|e| e.to_string())?;
        jail.create_file(
            ".eudaimonia/config.toml",
            r#"
[database]
path = "game.db"
"#,
        )?;

        let config = EudConfig::load().expect("config loads");
        assert_eq!(config.database.path, "game.db");
        Ok(())
    });
}

#[test]
fn env_overrides_toml() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r"
[progression]
mastery_ceiling = 5
",
        )?;
        jail.set_env("EUDAIMONIA_PROGRESSION__MASTERY_CEILING", "100");
        jail.set_env("EUDAIMONIA_DATABASE__PATH", ":memory:");

        let config: EudConfig = Figment::from(Serialized::defaults(EudConfig::default()))
            .merge(Toml::file("config.toml"))
            .merge(Env::prefixed("EUDAIMONIA_").split("__"))
            .extract()?;

        assert_eq!(config.progression.mastery_ceiling, 100);
        assert!(config.database.is_in_memory());
        Ok(())
    });
}

#[test]
fn invalid_values_fail_validation() {
    Jail::expect_with(|jail| {
        jail.set_env("EUDAIMONIA_PROGRESSION__MASTERY_CEILING", "0");
        let err = EudConfig::load().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "progression.mastery_ceiling"));
        Ok(())
    });
}

#[test]
fn malformed_toml_is_a_figment_error() {
    Jail::expect_with(|jail| {
        jail.create_file("bad.toml", "[progression\nmastery_ceiling = ")?;
        let figment = Figment::from(Serialized::defaults(EudConfig::default())).merge(Toml::file("bad.toml"));
        let err = EudConfig::from_figment(&figment).unwrap_err();
        assert!(matches!(err, ConfigError::Figment(_)));
        Ok(())
    });
}
