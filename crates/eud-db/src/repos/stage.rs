//! Stage progress repository.
//!
//! At most one stage per (user, art) is current. Advancing closes the prior
//! stage and opens (or reopens) the newly selected one.

use chrono::Utc;
use eud_core::audit_detail::StageAdvancedDetail;
use eud_core::entities::{ArtStage, StageProgress};
use eud_core::enums::{AuditAction, EntityType, TrailOp};
use eud_core::ids::PREFIX_STAGE_PROGRESS;
use eud_core::progression::StageChange;
use eud_core::responses::StageAdvance;

use crate::error::DatabaseError;
use crate::helpers::{get_bool, get_int, parse_datetime, to_value};
use crate::service::{EudService, Mutation};

const SELECT_COLS: &str =
    "id, user_id, art_id, stage_id, stage_index, reached_at, is_current, completion_percentage";

fn row_to_stage_progress(row: &libsql::Row) -> Result<StageProgress, DatabaseError> {
    Ok(StageProgress {
        id: row.get::<String>(0)?,
        user_id: row.get::<String>(1)?,
        art_id: row.get::<String>(2)?,
        stage_id: row.get::<String>(3)?,
        stage_index: get_int(row, 4)?,
        reached_at: parse_datetime(&row.get::<String>(5)?)?,
        is_current: get_bool(row, 6)?,
        completion_percentage: get_int(row, 7)?,
    })
}

impl EudService {
    /// Stage progress records of a user, optionally for one art.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn stage_progress(
        &self,
        user_id: &str,
        art_id: Option<&str>,
    ) -> Result<Vec<StageProgress>, DatabaseError> {
        let mut rows = match art_id {
            Some(art_id) => {
                self.conn()
                    .query(
                        &format!(
                            "SELECT {SELECT_COLS} FROM stage_progress WHERE user_id = ?1 AND art_id = ?2
                             ORDER BY stage_index"
                        ),
                        [user_id, art_id],
                    )
                    .await?
            }
            None => {
                self.conn()
                    .query(
                        &format!(
                            "SELECT {SELECT_COLS} FROM stage_progress WHERE user_id = ?1
                             ORDER BY art_id, stage_index"
                        ),
                        [user_id],
                    )
                    .await?
            }
        };
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_stage_progress(&row)?);
        }
        Ok(out)
    }

    pub(crate) async fn current_stage(
        &self,
        user_id: &str,
        art_id: &str,
    ) -> Result<Option<StageProgress>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {SELECT_COLS} FROM stage_progress
                     WHERE user_id = ?1 AND art_id = ?2 AND is_current = 1"
                ),
                [user_id, art_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_stage_progress(&row)?)),
            None => Ok(None),
        }
    }

    /// Persist the stage selected by a recompute. Must run inside a write.
    ///
    /// Without a change only the current stage's completion is refreshed.
    /// On a change the prior stage stops being current (closed at 100 % when
    /// moving forward) and the selected one is opened or reopened.
    pub(crate) async fn apply_stage_in(
        &self,
        user_id: &str,
        art_id: &str,
        stages: &[ArtStage],
        change: StageChange,
        completion: u8,
        mastery_level: u8,
    ) -> Result<Option<StageAdvance>, DatabaseError> {
        if !change.changed() {
            if let Some(index) = change.to {
                self.conn()
                    .execute(
                        "UPDATE stage_progress SET completion_percentage = ?1
                         WHERE user_id = ?2 AND art_id = ?3 AND stage_index = ?4 AND is_current = 1",
                        libsql::params![completion, user_id, art_id, index],
                    )
                    .await?;
            }
            return Ok(None);
        }

        let stage_at = |index: Option<u32>| index.and_then(|i| stages.iter().find(|s| s.order_index == i));
        let from = stage_at(change.from);
        let to = stage_at(change.to);
        let forward = change.to > change.from;

        if change.from.is_some() {
            let closing = if forward {
                "UPDATE stage_progress SET is_current = 0, completion_percentage = 100
                 WHERE user_id = ?1 AND art_id = ?2 AND is_current = 1"
            } else {
                "UPDATE stage_progress SET is_current = 0
                 WHERE user_id = ?1 AND art_id = ?2 AND is_current = 1"
            };
            self.conn().execute(closing, [user_id, art_id]).await?;
        }

        if let Some(stage) = to {
            let id = self.db().generate_id(PREFIX_STAGE_PROGRESS).await?;
            self.conn()
                .execute(
                    "INSERT INTO stage_progress (id, user_id, art_id, stage_id, stage_index, reached_at,
                         is_current, completion_percentage)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)
                     ON CONFLICT (user_id, stage_id) DO UPDATE SET
                         is_current = 1, completion_percentage = excluded.completion_percentage",
                    libsql::params![
                        id.as_str(),
                        user_id,
                        art_id,
                        stage.id.as_str(),
                        stage.order_index,
                        Utc::now().to_rfc3339(),
                        completion
                    ],
                )
                .await?;
        }

        let advance = StageAdvance {
            from_stage_id: from.map(|s| s.id.clone()),
            to_stage_id: to.map(|s| s.id.clone()),
            to_stage_name: to.map(|s| s.name.clone()),
        };
        let detail = StageAdvancedDetail {
            from: advance.from_stage_id.clone(),
            to: advance.to_stage_id.clone(),
            mastery_level,
        };
        let entity_id = advance.to_stage_id.as_deref().unwrap_or(art_id);
        self.record(Mutation {
            user: Some(user_id),
            entity: EntityType::StageProgress,
            id: entity_id,
            action: AuditAction::StageAdvanced,
            op: TrailOp::Transition,
            data: to_value(&advance)?,
            detail: Some(to_value(&detail)?),
        })
        .await?;
        tracing::info!(user_id, art_id, to = ?advance.to_stage_name, "stage advanced");
        Ok(Some(advance))
    }
}
