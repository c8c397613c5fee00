//! Service layer orchestrating database mutations with audit and trail.
//!
//! `EudService` wraps `EudDb` (raw database access), `TrailWriter` (JSONL
//! mirror) and the progression tunables. All repo methods are implemented as
//! `impl EudService` blocks under `repos/`.

use std::future::Future;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use eud_config::{EudConfig, ProgressionConfig};
use eud_core::entities::AuditEntry;
use eud_core::enums::{AuditAction, EntityType, TrailOp};
use eud_core::ids::PREFIX_AUDIT;
use eud_core::trail::{CATALOG_TRAIL_USER, TrailOperation};

use crate::EudDb;
use crate::error::DatabaseError;
use crate::trail::writer::TrailWriter;

/// One recorded mutation: an audit row plus a trail line.
pub(crate) struct Mutation<'a> {
    pub user: Option<&'a str>,
    pub entity: EntityType,
    pub id: &'a str,
    pub action: AuditAction,
    pub op: TrailOp,
    pub data: serde_json::Value,
    pub detail: Option<serde_json::Value>,
}

/// Orchestrates database mutations with audit trail and JSONL trail.
///
/// Every mutation method follows this protocol:
/// 1. Acquire the write gate (one mutation at a time per process)
/// 2. `BEGIN IMMEDIATE`
/// 3. Execute SQL and append audit entries
/// 4. `COMMIT`, or `ROLLBACK` on any error
/// 5. Flush the trail lines staged by the committed transaction
pub struct EudService {
    db: EudDb,
    trail: TrailWriter,
    progression: ProgressionConfig,
    write_gate: tokio::sync::Mutex<()>,
    pending_trail: Mutex<Vec<TrailOperation>>,
}

impl EudService {
    /// Create a new service over a local database.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or the trail
    /// directory cannot be created.
    pub async fn new_local(
        db_path: &str,
        trail_dir: Option<PathBuf>,
        progression: ProgressionConfig,
    ) -> Result<Self, DatabaseError> {
        let db = EudDb::open_local(db_path).await?;
        let trail = match trail_dir {
            Some(dir) => TrailWriter::new(dir)?,
            None => TrailWriter::disabled(),
        };
        Ok(Self::from_db(db, trail, progression))
    }

    /// Create a service from a loaded configuration.
    ///
    /// # Errors
    ///
    /// Same as [`Self::new_local`].
    pub async fn from_config(config: &EudConfig) -> Result<Self, DatabaseError> {
        Self::new_local(
            &config.database.path,
            config.database.trail_path(),
            config.progression.clone(),
        )
        .await
    }

    /// Create from an existing `EudDb`.
    #[must_use]
    pub fn from_db(db: EudDb, trail: TrailWriter, progression: ProgressionConfig) -> Self {
        Self {
            db,
            trail,
            progression,
            write_gate: tokio::sync::Mutex::new(()),
            pending_trail: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub const fn db(&self) -> &EudDb {
        &self.db
    }

    pub(crate) const fn conn(&self) -> &libsql::Connection {
        self.db.conn()
    }

    #[must_use]
    pub const fn trail(&self) -> &TrailWriter {
        &self.trail
    }

    #[must_use]
    pub const fn progression(&self) -> &ProgressionConfig {
        &self.progression
    }

    /// Run `body` as a single write transaction.
    ///
    /// Must not be nested: helpers called from `body` use the `_in` variants
    /// that assume an open transaction.
    pub(crate) async fn write<T, F, Fut>(&self, body: F) -> Result<T, DatabaseError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, DatabaseError>>,
    {
        let _gate = self.write_gate.lock().await;
        self.conn().execute("BEGIN IMMEDIATE", ()).await?;

        let result = body().await;
        let result = match result {
            Ok(value) => match self.conn().execute("COMMIT", ()).await {
                Ok(_) => Ok(value),
                Err(e) => {
                    self.rollback().await;
                    Err(e.into())
                }
            },
            Err(err) => {
                self.rollback().await;
                Err(err)
            }
        };

        let staged = std::mem::take(
            &mut *self
                .pending_trail
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if result.is_ok() {
            if let Err(e) = self.trail.append_all(&staged) {
                tracing::warn!(error = %e, "trail append failed after commit");
            }
        }
        result
    }

    async fn rollback(&self) {
        if let Err(e) = self.conn().execute("ROLLBACK", ()).await {
            tracing::warn!(error = %e, "rollback failed");
        }
    }

    /// Append the audit row and stage the trail line of a mutation.
    pub(crate) async fn record(&self, m: Mutation<'_>) -> Result<(), DatabaseError> {
        let now = Utc::now();
        let audit_id = self.db.generate_id(PREFIX_AUDIT).await?;
        self.append_audit(&AuditEntry {
            id: audit_id,
            user_id: m.user.map(String::from),
            entity_type: m.entity,
            entity_id: m.id.to_string(),
            action: m.action,
            detail: m.detail,
            created_at: now,
        })
        .await?;

        if self.trail.is_enabled() {
            self.pending_trail
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(TrailOperation {
                    v: 1,
                    ts: now.to_rfc3339(),
                    user: m.user.unwrap_or(CATALOG_TRAIL_USER).to_string(),
                    op: m.op,
                    entity: m.entity,
                    id: m.id.to_string(),
                    data: m.data,
                });
        }
        Ok(())
    }
}
