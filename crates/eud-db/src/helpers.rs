//! Row-to-entity parsing helpers.
//!
//! Every repo converts `libsql::Row` (column-indexed) into typed entity
//! structs. These helpers isolate the parsing logic: the dual datetime
//! format (`SQLite`'s `datetime('now')` vs `to_rfc3339()`), enum columns,
//! integer narrowing, and typed JSON columns.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::DatabaseError;

/// Parse a required TEXT column as `DateTime<Utc>`.
///
/// Handles both RFC 3339 (`"2026-02-09T14:30:00+00:00"`) and `SQLite`'s default
/// format (`"2026-02-09 14:30:00"`).
///
/// # Errors
///
/// Returns `DatabaseError::Query` if the string cannot be parsed as either format.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| DatabaseError::Query(format!("Failed to parse datetime '{s}': {e}")))
}

/// Parse an optional TEXT column as `Option<DateTime<Utc>>`.
///
/// # Errors
///
/// Returns `DatabaseError::Query` if a non-empty string cannot be parsed.
pub fn parse_optional_datetime(s: Option<&str>) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    match s {
        Some(s) if !s.is_empty() => Ok(Some(parse_datetime(s)?)),
        _ => Ok(None),
    }
}

/// Parse a TEXT column into a serde-deserializable enum.
///
/// Works with all eud-core enums that use `#[serde(rename_all = "snake_case")]`.
///
/// # Errors
///
/// Returns `DatabaseError::Query` if the string does not match any enum variant.
pub fn parse_enum<T: DeserializeOwned>(s: &str) -> Result<T, DatabaseError> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|e| DatabaseError::Query(format!("Failed to parse enum from '{s}': {e}")))
}

/// Read a nullable TEXT column. Returns `None` for both SQL NULL and empty string.
///
/// `row.get::<String>(idx)` on a NULL column returns an error, not `""`.
///
/// # Errors
///
/// Returns `DatabaseError` if the column read fails.
pub fn get_opt_string(row: &libsql::Row, idx: i32) -> Result<Option<String>, DatabaseError> {
    match row.get::<Option<String>>(idx)? {
        Some(s) if s.is_empty() => Ok(None),
        other => Ok(other),
    }
}

/// Read an INTEGER column into a narrower unsigned type.
///
/// # Errors
///
/// Returns `DatabaseError::Query` if the stored value does not fit.
pub fn get_int<T: TryFrom<i64>>(row: &libsql::Row, idx: i32) -> Result<T, DatabaseError> {
    let raw = row.get::<i64>(idx)?;
    T::try_from(raw).map_err(|_| DatabaseError::Query(format!("Integer {raw} out of range in column {idx}")))
}

/// Read a 0/1 INTEGER column as `bool`.
///
/// # Errors
///
/// Returns `DatabaseError` if the column read fails.
pub fn get_bool(row: &libsql::Row, idx: i32) -> Result<bool, DatabaseError> {
    Ok(row.get::<i64>(idx)? != 0)
}

/// Parse a typed JSON TEXT column. Empty strings parse as the type's default.
///
/// # Errors
///
/// Returns `DatabaseError::Query` if the JSON does not match the type.
pub fn parse_json<T: DeserializeOwned + Default>(s: &str) -> Result<T, DatabaseError> {
    if s.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(s).map_err(|e| DatabaseError::Query(format!("Invalid JSON in column: {e}")))
}

/// Extract an optional JSON value from a TEXT column.
///
/// # Errors
///
/// Returns `DatabaseError::Query` if a non-empty string contains invalid JSON.
pub fn parse_optional_json(s: Option<&str>) -> Result<Option<serde_json::Value>, DatabaseError> {
    match s {
        Some(s) if !s.is_empty() => {
            let val = serde_json::from_str(s)
                .map_err(|e| DatabaseError::Query(format!("Invalid JSON in column: {e}")))?;
            Ok(Some(val))
        }
        _ => Ok(None),
    }
}

/// Serialize a value for a JSON TEXT column.
///
/// # Errors
///
/// Returns `DatabaseError::Query` if serialization fails.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, DatabaseError> {
    Ok(serde_json::to_string(value)?)
}

/// Serialize a value for a trail or audit payload.
///
/// # Errors
///
/// Returns `DatabaseError::Query` if serialization fails.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<serde_json::Value, DatabaseError> {
    Ok(serde_json::to_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use eud_core::enums::{PracticeMethod, ValidationMethod};
    use eud_core::virtues::VirtueMap;

    #[test]
    fn parses_both_datetime_formats() {
        let a = parse_datetime("2026-02-09T14:30:00+00:00").unwrap();
        let b = parse_datetime("2026-02-09 14:30:00").unwrap();
        assert_eq!(a, b);
        assert!(parse_datetime("yesterday").is_err());
        assert_eq!(parse_optional_datetime(Some("")).unwrap(), None);
    }

    #[test]
    fn parses_enums_from_sql_strings() {
        let m: PracticeMethod = parse_enum("reflection").unwrap();
        assert_eq!(m, PracticeMethod::Reflection);
        let v: ValidationMethod = parse_enum("self").unwrap();
        assert_eq!(v, ValidationMethod::SelfCheck);
        assert!(parse_enum::<PracticeMethod>("dancing").is_err());
    }

    #[test]
    fn typed_json_columns() {
        let map: VirtueMap = parse_json(r#"{"wisdom": 2.5}"#).unwrap();
        assert_eq!(map.len(), 1);
        let empty: VirtueMap = parse_json("").unwrap();
        assert!(empty.is_empty());
        assert!(parse_json::<VirtueMap>(r#"{"luck": 1}"#).is_err());
    }
}
