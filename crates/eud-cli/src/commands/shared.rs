use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

/// Parse a `snake_case` enum value using serde-deserialization.
pub fn parse_enum<T>(raw: &str, field: &str) -> anyhow::Result<T>
where
    T: DeserializeOwned,
{
    let normalized = raw.replace('-', "_").to_ascii_lowercase();
    let json = format!("\"{normalized}\"");
    serde_json::from_str(&json).map_err(|error| anyhow::anyhow!("invalid {field} '{raw}': {error}"))
}

pub fn parse_timestamp(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|error| anyhow::anyhow!("invalid timestamp '{raw}': {error}"))
}

#[cfg(test)]
mod tests {
    use eud_core::enums::{AuditAction, EconomicLayer, Virtue};
    use pretty_assertions::assert_eq;

    use super::{parse_enum, parse_timestamp};

    #[test]
    fn parses_snake_case_enum() {
        let layer: EconomicLayer = parse_enum("republic", "layer").expect("layer should parse");
        assert_eq!(layer, EconomicLayer::Republic);
    }

    #[test]
    fn parses_hyphenated_and_capitalized_values() {
        let action: AuditAction = parse_enum("Stage-Advanced", "action").expect("action should parse");
        assert_eq!(action, AuditAction::StageAdvanced);
        let virtue: Virtue = parse_enum("Beauty", "virtue").expect("virtue should parse");
        assert_eq!(virtue, Virtue::Beauty);
    }

    #[test]
    fn errors_on_invalid_enum() {
        let err = parse_enum::<EconomicLayer>("empire", "layer").expect_err("should fail");
        assert!(err.to_string().contains("invalid layer 'empire'"));
    }

    #[test]
    fn timestamps_are_normalized_to_utc() {
        let t = parse_timestamp("2026-03-01T10:00:00+02:00").unwrap();
        assert_eq!(t.to_rfc3339(), "2026-03-01T08:00:00+00:00");
        assert!(parse_timestamp("yesterday").is_err());
    }
}
