//! # eud-db
//!
//! libSQL persistence for the Eudaimonia progression engine.
//!
//! Holds the catalog (taxonomies, arts, parts, stages, tech tree nodes) and
//! per-user state (profiles, masteries, practice sessions, stage and node
//! progress, audit trail). [`service::EudService`] loads records, runs the
//! pure progression logic from `eud-core`, and persists the result inside one
//! `BEGIN IMMEDIATE` transaction per mutation.
//!
//! Uses the `libsql` crate (C `SQLite` fork, v0.9.29).

pub mod error;
pub mod helpers;
mod migrations;
pub mod repos;
pub mod service;
pub mod trail;

#[cfg(test)]
mod test_support;

use error::DatabaseError;
use libsql::Builder;

/// Central database handle.
///
/// Wraps a libSQL database and its single connection.
pub struct EudDb {
    #[allow(dead_code)]
    db: libsql::Database,
    conn: libsql::Connection,
}

impl EudDb {
    /// Open a local database at the given path (`":memory:"` for tests).
    ///
    /// Runs migrations automatically on open.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or
    /// migrations fail.
    pub async fn open_local(path: &str) -> Result<Self, DatabaseError> {
        if path != ":memory:" {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Other(e.into()))?;
                }
            }
        }

        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;

        // Foreign keys are per-connection in SQLite.
        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| DatabaseError::Migration(format!("PRAGMA foreign_keys: {e}")))?;

        let eud_db = Self { db, conn };
        eud_db.run_migrations().await?;
        tracing::debug!(path, "database opened");
        Ok(eud_db)
    }

    /// Access the underlying libSQL connection for direct queries.
    #[must_use]
    pub const fn conn(&self) -> &libsql::Connection {
        &self.conn
    }

    /// Generate a prefixed ID via libSQL. Returns e.g., `"mst-a3f8b2c1"`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails or returns no rows.
    pub async fn generate_id(&self, prefix: &str) -> Result<String, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT '{prefix}-' || lower(hex(randomblob(4)))"),
                (),
            )
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        Ok(row.get::<String>(0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    async fn test_db() -> EudDb {
        EudDb::open_local(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn open_local_creates_schema() {
        let db = test_db().await;

        let tables = [
            "player_profiles",
            "player_resources",
            "virtue_history",
            "art_taxonomies",
            "arts",
            "art_parts",
            "art_stages",
            "masteries",
            "practice_sessions",
            "stage_progress",
            "tech_tree_nodes",
            "tech_tree_prerequisites",
            "tech_tree_node_arts",
            "tech_tree_progress",
            "audit_trail",
        ];
        for table in &tables {
            let mut rows = db
                .conn()
                .query(
                    "SELECT name FROM sqlite_master WHERE type='table' AND name=?1",
                    [*table],
                )
                .await
                .unwrap();
            let row = rows.next().await.unwrap();
            assert!(row.is_some(), "table '{table}' should exist");
        }
    }

    #[tokio::test]
    async fn generate_id_correct_format() {
        let db = test_db().await;
        let id = db.generate_id("mst").await.unwrap();
        assert!(id.starts_with("mst-"), "ID should start with 'mst-': {id}");
        assert_eq!(id.len(), 12, "3 prefix + 1 dash + 8 hex: {id}");
        assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn generate_id_all_prefixes() {
        let db = test_db().await;
        for prefix in eud_core::ids::ALL_PREFIXES {
            let id = db.generate_id(prefix).await.unwrap();
            assert!(id.starts_with(&format!("{prefix}-")));
        }
    }

    #[tokio::test]
    async fn generate_id_uniqueness() {
        let db = test_db().await;
        let mut ids = HashSet::new();
        for _ in 0..100 {
            let id = db.generate_id("tst").await.unwrap();
            assert!(ids.insert(id.clone()), "Duplicate ID generated: {id}");
        }
    }

    #[tokio::test]
    async fn idempotent_migrations() {
        let db = test_db().await;
        db.run_migrations().await.unwrap();
    }

    #[tokio::test]
    async fn unlock_cannot_be_reverted_in_sql() {
        let db = test_db().await;
        let conn = db.conn();
        conn.execute("INSERT INTO player_profiles (user_id) VALUES ('u1')", ())
            .await
            .unwrap();
        conn.execute("INSERT INTO tech_tree_nodes (id, name) VALUES ('tre-1', 'N1')", ())
            .await
            .unwrap();
        conn.execute(
            "INSERT INTO tech_tree_progress (id, user_id, node_id, is_unlocked, updated_at)
             VALUES ('ttp-1', 'u1', 'tre-1', 1, datetime('now'))",
            (),
        )
        .await
        .unwrap();

        let result = conn
            .execute("UPDATE tech_tree_progress SET is_unlocked = 0 WHERE id = 'ttp-1'", ())
            .await;
        assert!(result.is_err(), "reverting an unlock should abort");
    }

    #[tokio::test]
    async fn session_duration_must_be_positive() {
        let db = test_db().await;
        let conn = db.conn();
        conn.execute_batch(
            "INSERT INTO player_profiles (user_id) VALUES ('u1');
             INSERT INTO arts (id, name, difficulty) VALUES ('art-1', 'A', 'beginner');
             INSERT INTO art_parts (id, art_id, name, order_index, practice_method, validation_method)
                 VALUES ('prt-1', 'art-1', 'P', 0, 'practice', 'self');",
        )
        .await
        .unwrap();

        let result = conn
            .execute(
                "INSERT INTO practice_sessions (id, user_id, art_id, part_id, practiced_at, duration_minutes)
                 VALUES ('pss-1', 'u1', 'art-1', 'prt-1', datetime('now'), 0)",
                (),
            )
            .await;
        assert!(result.is_err());
    }
}
