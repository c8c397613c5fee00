//! Mastery tracker: discovery, practice logging, validation and the
//! recompute pipeline (level, stage, milestones, virtues).
//!
//! All writes for one practice happen in a single transaction, so the
//! milestone tags stored on the mastery row gate XP exactly once even under
//! concurrent callers.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use eud_core::audit_detail::{MilestoneDetail, PracticedDetail};
use eud_core::entities::{Art, ArtPart, Mastery, PracticeHistoryEntry, PracticeSession};
use eud_core::enums::{AuditAction, EntityType, TrailOp};
use eud_core::ids::{PREFIX_MASTERY, PREFIX_SESSION};
use eud_core::progression::{self, first_incomplete};
use eud_core::responses::{ArtRef, DiscoverOutcome, MasterySummary, PracticeOutcome, RecomputeReport};

use crate::error::DatabaseError;
use crate::helpers::{get_int, get_opt_string, parse_datetime, parse_json, parse_optional_datetime, to_json, to_value};
use crate::service::{EudService, Mutation};

const SELECT_COLS: &str = "id, user_id, art_id, discovered_at, mastery_level, last_practiced,
    practice_streak, completed_parts, current_part_id, practice_history, achievements, updated_at";

/// Input for [`EudService::log_practice`].
#[derive(Debug, Clone)]
pub struct PracticeRequest {
    pub user_id: String,
    pub art_id: String,
    pub part_id: String,
    pub duration_minutes: u32,
    pub notes: Option<String>,
    pub mark_completed: bool,
    /// Self-rating, 1..=5.
    pub rating: Option<u8>,
    /// Defaults to now.
    pub practiced_at: Option<DateTime<Utc>>,
}

impl PracticeRequest {
    #[must_use]
    pub fn new(user_id: &str, art_id: &str, part_id: &str, duration_minutes: u32) -> Self {
        Self {
            user_id: user_id.to_string(),
            art_id: art_id.to_string(),
            part_id: part_id.to_string(),
            duration_minutes,
            notes: None,
            mark_completed: false,
            rating: None,
            practiced_at: None,
        }
    }

    #[must_use]
    pub const fn completed(mut self) -> Self {
        self.mark_completed = true;
        self
    }

    #[must_use]
    pub const fn at(mut self, practiced_at: DateTime<Utc>) -> Self {
        self.practiced_at = Some(practiced_at);
        self
    }

    fn validate(&self) -> Result<(), DatabaseError> {
        if self.duration_minutes == 0 {
            return Err(DatabaseError::Validation("duration_minutes must be positive".into()));
        }
        if let Some(rating) = self.rating {
            if !(1..=5).contains(&rating) {
                return Err(DatabaseError::Validation(format!("rating must be 1..=5, got {rating}")));
            }
        }
        Ok(())
    }
}

fn row_to_mastery(row: &libsql::Row) -> Result<Mastery, DatabaseError> {
    Ok(Mastery {
        id: row.get::<String>(0)?,
        user_id: row.get::<String>(1)?,
        art_id: row.get::<String>(2)?,
        discovered_at: parse_datetime(&row.get::<String>(3)?)?,
        mastery_level: get_int(row, 4)?,
        last_practiced: parse_optional_datetime(get_opt_string(row, 5)?.as_deref())?,
        practice_streak: get_int(row, 6)?,
        completed_parts: parse_json(&row.get::<String>(7)?)?,
        current_part_id: get_opt_string(row, 8)?,
        practice_history: parse_json(&row.get::<String>(9)?)?,
        achievements: parse_json(&row.get::<String>(10)?)?,
        updated_at: parse_datetime(&row.get::<String>(11)?)?,
    })
}

impl EudService {
    fn streak_window(&self) -> Duration {
        Duration::hours(i64::from(self.progression().streak_window_hours))
    }

    /// Start tracking an art for a user. Idempotent.
    ///
    /// The current part is `initial_part_id` when it belongs to the art,
    /// otherwise the first part. Opens the stage for level 0 and grants the
    /// discovery XP once.
    ///
    /// # Errors
    ///
    /// `NotFound` if the profile or art does not exist.
    pub async fn discover_art(
        &self,
        user_id: &str,
        art_id: &str,
        initial_part_id: Option<&str>,
    ) -> Result<DiscoverOutcome, DatabaseError> {
        self.write(|| self.discover_art_in(user_id, art_id, initial_part_id))
            .await
    }

    pub(crate) async fn discover_art_in(
        &self,
        user_id: &str,
        art_id: &str,
        initial_part_id: Option<&str>,
    ) -> Result<DiscoverOutcome, DatabaseError> {
        self.get_profile(user_id).await?;
        let art = self.get_art(art_id).await?;
        if let Some(mastery) = self.find_mastery(user_id, art_id).await? {
            return Ok(DiscoverOutcome {
                mastery,
                created: false,
                xp_gained: 0,
            });
        }

        let parts = self.list_parts(art_id).await?;
        let current_part_id = initial_part_id
            .and_then(|pid| parts.iter().find(|p| p.id == pid))
            .or_else(|| first_incomplete(&parts, &Default::default()))
            .map(|p| p.id.clone());

        let now = Utc::now();
        let mastery = Mastery {
            id: self.db().generate_id(PREFIX_MASTERY).await?,
            user_id: user_id.to_string(),
            art_id: art_id.to_string(),
            discovered_at: now,
            mastery_level: 0,
            last_practiced: None,
            practice_streak: 0,
            completed_parts: Default::default(),
            current_part_id,
            practice_history: Vec::new(),
            achievements: Default::default(),
            updated_at: now,
        };
        self.conn()
            .execute(
                "INSERT INTO masteries (id, user_id, art_id, discovered_at, mastery_level, practice_streak,
                     completed_parts, current_part_id, practice_history, achievements, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 0, 0, '[]', ?5, '[]', '[]', ?6)",
                libsql::params![
                    mastery.id.as_str(),
                    user_id,
                    art_id,
                    now.to_rfc3339(),
                    mastery.current_part_id.as_deref(),
                    now.to_rfc3339()
                ],
            )
            .await?;

        let stages = self.list_stages(art_id).await?;
        if let Some(stage) = progression::select_stage(&stages, 0) {
            let change = progression::StageChange {
                from: None,
                to: Some(stage.order_index),
            };
            let completion = progression::stage_completion(&stages, stage.order_index, 0);
            self.apply_stage_in(user_id, art_id, &stages, change, completion, 0)
                .await?;
        }

        let xp = self.progression().discovery_xp;
        self.grant_xp_in(user_id, xp).await?;
        self.record(Mutation {
            user: Some(user_id),
            entity: EntityType::Mastery,
            id: &mastery.id,
            action: AuditAction::Discovered,
            op: TrailOp::Create,
            data: to_value(&mastery)?,
            detail: Some(serde_json::json!({"art_id": art_id, "art_name": art.name, "xp": xp})),
        })
        .await?;
        tracing::info!(user_id, art_id, "art discovered");

        Ok(DiscoverOutcome {
            mastery,
            created: true,
            xp_gained: xp,
        })
    }

    /// Record a practice session and update the mastery.
    ///
    /// Discovers the art first when needed. The streak grows when the
    /// previous practice lies within the streak window and resets to 1
    /// otherwise. With `mark_completed` the part joins the completed set.
    ///
    /// # Errors
    ///
    /// `Validation` for a zero duration, a rating outside 1..=5 or a part of
    /// another art. `NotFound` for an unknown profile, art or part.
    pub async fn log_practice(&self, req: &PracticeRequest) -> Result<PracticeOutcome, DatabaseError> {
        req.validate()?;
        self.write(|| async {
            let art = self.get_art(&req.art_id).await?;
            let part = self.get_part(&req.part_id).await?;
            if part.art_id != art.id {
                return Err(DatabaseError::Validation(format!(
                    "part {} does not belong to art {}",
                    part.id, art.id
                )));
            }

            let (mut mastery, discovered) = match self.find_mastery(&req.user_id, &art.id).await? {
                Some(m) => (m, false),
                None => {
                    let outcome = self
                        .discover_art_in(&req.user_id, &art.id, Some(&part.id))
                        .await?;
                    (outcome.mastery, true)
                }
            };

            let session_id = self.db().generate_id(PREFIX_SESSION).await?;
            let practiced_at = req.practiced_at.unwrap_or_else(Utc::now);
            progression::record_practice(
                &mut mastery,
                PracticeHistoryEntry {
                    session_id: session_id.clone(),
                    part_id: part.id.clone(),
                    part_name: part.name.clone(),
                    practiced_at,
                    duration_minutes: req.duration_minutes,
                    completed: req.mark_completed,
                },
                self.streak_window(),
            );

            let parts = self.list_parts(&art.id).await?;
            if req.mark_completed {
                progression::complete_part(&mut mastery, &parts, &part.id);
            }
            let report = self.recompute_in(&mut mastery, &art, &parts).await?;
            self.save_mastery_in(&mut mastery).await?;

            let session = PracticeSession {
                id: session_id,
                user_id: req.user_id.clone(),
                art_id: art.id.clone(),
                part_id: part.id.clone(),
                practiced_at,
                duration_minutes: req.duration_minutes,
                notes: req.notes.clone(),
                rating: req.rating,
                validated: false,
                completed: req.mark_completed,
                experience_gained: report.xp_gained,
            };
            self.insert_session_in(&session).await?;

            let detail = PracticedDetail {
                art_id: art.id.clone(),
                part_id: part.id.clone(),
                duration_minutes: req.duration_minutes,
                completed: req.mark_completed,
            };
            self.record(Mutation {
                user: Some(&req.user_id),
                entity: EntityType::PracticeSession,
                id: &session.id,
                action: AuditAction::Practiced,
                op: TrailOp::Create,
                data: to_value(&session)?,
                detail: Some(to_value(&detail)?),
            })
            .await?;
            tracing::debug!(
                user_id = %req.user_id,
                art_id = %art.id,
                level = mastery.mastery_level,
                streak = mastery.practice_streak,
                "practice logged"
            );

            Ok(PracticeOutcome {
                session,
                mastery,
                discovered,
                report,
            })
        })
        .await
    }

    /// Mark a session validated, complete its part and recompute.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown session, `PreconditionViolated` if the
    /// session was already validated.
    pub async fn validate_session(&self, session_id: &str) -> Result<PracticeOutcome, DatabaseError> {
        self.write(|| async {
            let session = self.get_session(session_id).await?;
            let changed = self
                .conn()
                .execute(
                    "UPDATE practice_sessions SET validated = 1, completed = 1
                     WHERE id = ?1 AND validated = 0",
                    [session_id],
                )
                .await?;
            if changed == 0 || session.validated {
                return Err(DatabaseError::PreconditionViolated(format!(
                    "session {session_id} is already validated"
                )));
            }

            let art = self.get_art(&session.art_id).await?;
            let mut mastery = self
                .find_mastery(&session.user_id, &session.art_id)
                .await?
                .ok_or_else(|| {
                    DatabaseError::InvalidState(format!("session {session_id} has no mastery record"))
                })?;
            let parts = self.list_parts(&art.id).await?;
            progression::complete_part(&mut mastery, &parts, &session.part_id);
            let report = self.recompute_in(&mut mastery, &art, &parts).await?;
            self.save_mastery_in(&mut mastery).await?;

            if report.xp_gained > 0 {
                self.conn()
                    .execute(
                        "UPDATE practice_sessions SET experience_gained = experience_gained + ?1 WHERE id = ?2",
                        libsql::params![report.xp_gained, session_id],
                    )
                    .await?;
            }
            let session = self.get_session(session_id).await?;
            self.record(Mutation {
                user: Some(&session.user_id),
                entity: EntityType::PracticeSession,
                id: session_id,
                action: AuditAction::Validated,
                op: TrailOp::Update,
                data: to_value(&session)?,
                detail: None,
            })
            .await?;

            Ok(PracticeOutcome {
                session,
                mastery,
                discovered: false,
                report,
            })
        })
        .await
    }

    /// Recompute level, stage and rewards after the completed set changed.
    /// Must run inside a write; the caller saves the mastery afterwards.
    pub(crate) async fn recompute_in(
        &self,
        mastery: &mut Mastery,
        art: &Art,
        parts: &[ArtPart],
    ) -> Result<RecomputeReport, DatabaseError> {
        let stages = self.list_stages(&art.id).await?;
        let current = self.current_stage(&mastery.user_id, &art.id).await?;
        let r = progression::recompute(
            mastery,
            art,
            parts,
            &stages,
            current.map(|c| c.stage_index),
            self.progression().virtue_reward_threshold,
        );
        tracing::debug!(
            art_id = %art.id,
            from = r.previous_level,
            to = r.mastery_level,
            milestones = ?r.milestones,
            "mastery recomputed"
        );

        let stage_advance = self
            .apply_stage_in(
                &mastery.user_id,
                &art.id,
                &stages,
                r.stage,
                r.stage_completion,
                r.mastery_level,
            )
            .await?;

        self.grant_xp_in(&mastery.user_id, r.xp).await?;
        for milestone in &r.milestones {
            let detail = MilestoneDetail {
                art_id: art.id.clone(),
                milestone: *milestone,
                xp: u32::from(*milestone),
            };
            self.record(Mutation {
                user: Some(&mastery.user_id),
                entity: EntityType::Mastery,
                id: &mastery.id,
                action: AuditAction::MilestoneReached,
                op: TrailOp::Update,
                data: serde_json::json!({"achievements": mastery.achievements}),
                detail: Some(to_value(&detail)?),
            })
            .await?;
            tracing::info!(user_id = %mastery.user_id, art_id = %art.id, milestone, "milestone reached");
        }

        let virtues_gained = self
            .raise_virtues_in(&mastery.user_id, &r.virtue_increments, &format!("art:{}", art.id), r.xp)
            .await?;

        Ok(RecomputeReport {
            previous_level: r.previous_level,
            mastery_level: r.mastery_level,
            stage_advance,
            milestones: r.milestones,
            xp_gained: r.xp,
            virtues_gained,
        })
    }

    async fn save_mastery_in(&self, mastery: &mut Mastery) -> Result<(), DatabaseError> {
        mastery.updated_at = Utc::now();
        self.conn()
            .execute(
                "UPDATE masteries SET mastery_level = ?1, last_practiced = ?2, practice_streak = ?3,
                     completed_parts = ?4, current_part_id = ?5, practice_history = ?6,
                     achievements = ?7, updated_at = ?8
                 WHERE id = ?9",
                libsql::params![
                    mastery.mastery_level,
                    mastery.last_practiced.map(|t| t.to_rfc3339()),
                    mastery.practice_streak,
                    to_json(&mastery.completed_parts)?,
                    mastery.current_part_id.as_deref(),
                    to_json(&mastery.practice_history)?,
                    to_json(&mastery.achievements)?,
                    mastery.updated_at.to_rfc3339(),
                    mastery.id.as_str()
                ],
            )
            .await?;
        self.record(Mutation {
            user: Some(&mastery.user_id),
            entity: EntityType::Mastery,
            id: &mastery.id,
            action: AuditAction::Updated,
            op: TrailOp::Update,
            data: serde_json::json!({
                "mastery_level": mastery.mastery_level,
                "practice_streak": mastery.practice_streak,
                "current_part_id": mastery.current_part_id,
                "completed_parts": mastery.completed_parts,
            }),
            detail: None,
        })
        .await
    }

    /// # Errors
    ///
    /// `NotFound` if the user has not discovered the art.
    pub async fn get_mastery(&self, user_id: &str, art_id: &str) -> Result<Mastery, DatabaseError> {
        self.find_mastery(user_id, art_id)
            .await?
            .ok_or_else(|| DatabaseError::not_found("mastery", &format!("{user_id}/{art_id}")))
    }

    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn find_mastery(&self, user_id: &str, art_id: &str) -> Result<Option<Mastery>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {SELECT_COLS} FROM masteries WHERE user_id = ?1 AND art_id = ?2"),
                [user_id, art_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_mastery(&row)?)),
            None => Ok(None),
        }
    }

    /// All masteries of a user, highest level first.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn list_masteries(&self, user_id: &str) -> Result<Vec<Mastery>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {SELECT_COLS} FROM masteries WHERE user_id = ?1
                     ORDER BY mastery_level DESC, discovered_at"
                ),
                [user_id],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_mastery(&row)?);
        }
        Ok(out)
    }

    /// Totals across every art the user has discovered.
    ///
    /// # Errors
    ///
    /// `NotFound` if the user has no profile.
    pub async fn mastery_summary(&self, user_id: &str) -> Result<MasterySummary, DatabaseError> {
        self.get_profile(user_id).await?;
        let masteries = self.list_masteries(user_id).await?;
        let names: HashMap<String, String> = self
            .arts_by_id()
            .await?
            .into_iter()
            .map(|(id, art)| (id, art.name))
            .collect();
        let sessions = self.session_counts(user_id).await?;

        let art_ref = |m: &Mastery| ArtRef {
            art_id: m.art_id.clone(),
            art_name: names.get(&m.art_id).cloned().unwrap_or_default(),
            mastery_level: m.mastery_level,
            sessions: sessions.get(&m.art_id).copied().unwrap_or(0),
        };

        let total = masteries.len();
        let completed = masteries.iter().filter(|m| m.mastery_level >= 100).count();
        let in_progress = masteries
            .iter()
            .filter(|m| m.mastery_level > 0 && m.mastery_level < 100)
            .count();
        #[allow(clippy::cast_precision_loss)]
        let average_mastery = if total == 0 {
            0.0
        } else {
            masteries.iter().map(|m| f64::from(m.mastery_level)).sum::<f64>() / total as f64
        };
        let most_practiced = masteries
            .iter()
            .filter(|m| sessions.get(&m.art_id).copied().unwrap_or(0) > 0)
            .max_by_key(|m| sessions.get(&m.art_id).copied().unwrap_or(0))
            .map(art_ref);
        let highest_mastery = masteries.first().map(art_ref);

        Ok(MasterySummary {
            user_id: user_id.to_string(),
            total_arts: u32::try_from(total).unwrap_or(u32::MAX),
            completed_arts: u32::try_from(completed).unwrap_or(u32::MAX),
            in_progress_arts: u32::try_from(in_progress).unwrap_or(u32::MAX),
            average_mastery,
            most_practiced,
            highest_mastery,
            by_taxonomy: self.taxonomy_stats(user_id).await?,
        })
    }

    async fn session_counts(&self, user_id: &str) -> Result<BTreeMap<String, u32>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT art_id, COUNT(*) FROM practice_sessions WHERE user_id = ?1 GROUP BY art_id",
                [user_id],
            )
            .await?;
        let mut counts = BTreeMap::new();
        while let Some(row) = rows.next().await? {
            counts.insert(row.get::<String>(0)?, get_int(&row, 1)?);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::audit::AuditFilter;
    use crate::test_support::helpers::{seed_art, seed_profile, test_service};
    use eud_core::enums::Virtue;
    use eud_core::virtues::VirtueMap;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn discover_is_idempotent_and_grants_xp_once() {
        let svc = test_service().await;
        seed_profile(&svc, "u1").await;
        let art = seed_art(&svc, "Violin", 2, &[0, 50]).await;

        let first = svc.discover_art("u1", &art.id, None).await.unwrap();
        assert!(first.created);
        assert_eq!(first.xp_gained, 10);
        let second = svc.discover_art("u1", &art.id, None).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.mastery.id, first.mastery.id);

        let profile = svc.get_profile("u1").await.unwrap();
        assert_eq!(profile.experience_points, 10);

        let stages = svc.stage_progress("u1", Some(&art.id)).await.unwrap();
        assert_eq!(stages.len(), 1);
        assert!(stages[0].is_current);
        assert_eq!(stages[0].stage_index, 0);
    }

    #[tokio::test]
    async fn discover_uses_initial_part_when_it_belongs() {
        let svc = test_service().await;
        seed_profile(&svc, "u1").await;
        let art = seed_art(&svc, "Violin", 3, &[]).await;
        let other = seed_art(&svc, "Cello", 1, &[]).await;
        let parts = svc.list_parts(&art.id).await.unwrap();
        let foreign = svc.list_parts(&other.id).await.unwrap();

        let m = svc.discover_art("u1", &art.id, Some(&parts[2].id)).await.unwrap();
        assert_eq!(m.mastery.current_part_id.as_deref(), Some(parts[2].id.as_str()));

        let m = svc.discover_art("u1", &other.id, Some("prt-nope")).await.unwrap();
        assert_eq!(m.mastery.current_part_id.as_deref(), Some(foreign[0].id.as_str()));
    }

    #[tokio::test]
    async fn discover_without_profile_is_not_found() {
        let svc = test_service().await;
        let art = seed_art(&svc, "Violin", 1, &[]).await;
        let err = svc.discover_art("ghost", &art.id, None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn practice_rejects_bad_input() {
        let svc = test_service().await;
        seed_profile(&svc, "u1").await;
        let art = seed_art(&svc, "Violin", 1, &[]).await;
        let other = seed_art(&svc, "Cello", 1, &[]).await;
        let part = svc.list_parts(&art.id).await.unwrap().remove(0);
        let foreign = svc.list_parts(&other.id).await.unwrap().remove(0);

        let zero = PracticeRequest::new("u1", &art.id, &part.id, 0);
        assert!(matches!(svc.log_practice(&zero).await, Err(DatabaseError::Validation(_))));

        let mut rated = PracticeRequest::new("u1", &art.id, &part.id, 10);
        rated.rating = Some(6);
        assert!(matches!(svc.log_practice(&rated).await, Err(DatabaseError::Validation(_))));

        let wrong = PracticeRequest::new("u1", &art.id, &foreign.id, 10);
        assert!(matches!(svc.log_practice(&wrong).await, Err(DatabaseError::Validation(_))));

        assert!(svc.find_mastery("u1", &art.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn completing_parts_out_of_order() {
        let svc = test_service().await;
        seed_profile(&svc, "u1").await;
        let art = seed_art(&svc, "A", 4, &[]).await;
        let parts = svc.list_parts(&art.id).await.unwrap();

        let first = svc
            .log_practice(&PracticeRequest::new("u1", &art.id, &parts[0].id, 30).completed())
            .await
            .unwrap();
        assert!(first.discovered);
        let out = svc
            .log_practice(&PracticeRequest::new("u1", &art.id, &parts[2].id, 30).completed())
            .await
            .unwrap();

        assert_eq!(out.mastery.mastery_level, 50);
        assert_eq!(out.mastery.current_part_id.as_deref(), Some(parts[1].id.as_str()));
        assert_eq!(out.mastery.completed_parts.len(), 2);
    }

    #[tokio::test]
    async fn completing_same_part_twice_is_idempotent() {
        let svc = test_service().await;
        seed_profile(&svc, "u1").await;
        let art = seed_art(&svc, "A", 4, &[]).await;
        let parts = svc.list_parts(&art.id).await.unwrap();
        let req = PracticeRequest::new("u1", &art.id, &parts[0].id, 20).completed();

        svc.log_practice(&req).await.unwrap();
        let out = svc.log_practice(&req).await.unwrap();
        assert_eq!(out.mastery.completed_parts.len(), 1);
        assert_eq!(out.mastery.mastery_level, 25);
        assert_eq!(out.mastery.practice_history.len(), 2);
        assert!(out.report.milestones.is_empty());
    }

    #[tokio::test]
    async fn streak_grows_within_window_and_resets_after_gap() {
        let svc = test_service().await;
        seed_profile(&svc, "u1").await;
        let art = seed_art(&svc, "A", 2, &[]).await;
        let part = svc.list_parts(&art.id).await.unwrap().remove(0);
        let t0 = Utc::now() - Duration::days(10);

        let req = |at| PracticeRequest::new("u1", &art.id, &part.id, 15).at(at);
        let a = svc.log_practice(&req(t0)).await.unwrap();
        assert_eq!(a.mastery.practice_streak, 1);
        let b = svc.log_practice(&req(t0 + Duration::hours(20))).await.unwrap();
        assert_eq!(b.mastery.practice_streak, 2);
        let c = svc.log_practice(&req(t0 + Duration::days(5) + Duration::hours(20))).await.unwrap();
        assert_eq!(c.mastery.practice_streak, 1);
    }

    #[tokio::test]
    async fn milestones_grant_xp_once_and_advance_stages() {
        let svc = test_service().await;
        seed_profile(&svc, "u1").await;
        let art = seed_art(&svc, "A", 2, &[0, 50, 100]).await;
        let parts = svc.list_parts(&art.id).await.unwrap();

        let out = svc
            .log_practice(&PracticeRequest::new("u1", &art.id, &parts[0].id, 30).completed())
            .await
            .unwrap();
        assert_eq!(out.report.milestones, vec![25, 50]);
        assert_eq!(out.report.xp_gained, 75);
        assert_eq!(out.session.experience_gained, 75);
        let advance = out.report.stage_advance.unwrap();
        assert_eq!(advance.to_stage_name.as_deref(), Some("S1"));

        let out = svc
            .log_practice(&PracticeRequest::new("u1", &art.id, &parts[1].id, 30).completed())
            .await
            .unwrap();
        assert_eq!(out.report.milestones, vec![75, 100]);

        // Repeat practice at 100 grants nothing more.
        let out = svc
            .log_practice(&PracticeRequest::new("u1", &art.id, &parts[1].id, 30).completed())
            .await
            .unwrap();
        assert!(out.report.milestones.is_empty());
        assert_eq!(out.report.xp_gained, 0);

        let profile = svc.get_profile("u1").await.unwrap();
        assert_eq!(profile.experience_points, 10 + 25 + 50 + 75 + 100);

        let stages = svc.stage_progress("u1", Some(&art.id)).await.unwrap();
        let current: Vec<u32> = stages.iter().filter(|s| s.is_current).map(|s| s.stage_index).collect();
        assert_eq!(current, vec![2]);
        assert!(stages.iter().filter(|s| !s.is_current).all(|s| s.completion_percentage == 100));

        let milestones = svc
            .query_audit(&AuditFilter {
                action: Some(AuditAction::MilestoneReached),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(milestones.len(), 4);
    }

    #[tokio::test]
    async fn virtues_rewarded_at_threshold() {
        let svc = test_service().await;
        seed_profile(&svc, "u1").await;
        let mut new = crate::repos::catalog::NewArt::new("Rhetoric");
        new.improved_virtues = VirtueMap::from([(Virtue::Wisdom, 10.0)]);
        let art = svc.create_art(&new).await.unwrap();
        for name in ["a", "b", "c", "d"] {
            svc.add_art_part(&art.id, &crate::repos::catalog::NewPart::new(name))
                .await
                .unwrap();
        }
        let parts = svc.list_parts(&art.id).await.unwrap();

        // 25 is below the reward threshold.
        let out = svc
            .log_practice(&PracticeRequest::new("u1", &art.id, &parts[0].id, 30).completed())
            .await
            .unwrap();
        assert!(out.report.virtues_gained.is_empty());

        // 50: scale min(0.5, 50/200) = 0.25.
        let out = svc
            .log_practice(&PracticeRequest::new("u1", &art.id, &parts[1].id, 30).completed())
            .await
            .unwrap();
        assert_eq!(out.report.virtues_gained.get(&Virtue::Wisdom), Some(&2.5));

        let profile = svc.get_profile("u1").await.unwrap();
        assert!((profile.happiness.wisdom - 2.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn reaching_a_stage_leaves_virtues_alone() {
        let svc = test_service().await;
        seed_profile(&svc, "u1").await;
        let art = seed_art(&svc, "A", 1, &[]).await;
        let mut stage = crate::repos::catalog::NewStage::new("Master", 100);
        stage.virtue_bonuses = VirtueMap::from([(Virtue::Beauty, 5.0)]);
        svc.add_art_stage(&art.id, &stage).await.unwrap();
        let part = svc.list_parts(&art.id).await.unwrap().remove(0);

        let out = svc
            .log_practice(&PracticeRequest::new("u1", &art.id, &part.id, 30).completed())
            .await
            .unwrap();
        assert!(out.report.virtues_gained.is_empty());
        let stages = svc.stage_progress("u1", Some(&art.id)).await.unwrap();
        assert!(stages.iter().any(|s| s.is_current && s.stage_index == 0));

        let profile = svc.get_profile("u1").await.unwrap();
        assert!(profile.happiness.beauty.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn validate_session_completes_part_once() {
        let svc = test_service().await;
        seed_profile(&svc, "u1").await;
        let art = seed_art(&svc, "A", 2, &[]).await;
        let part = svc.list_parts(&art.id).await.unwrap().remove(0);

        let logged = svc
            .log_practice(&PracticeRequest::new("u1", &art.id, &part.id, 30))
            .await
            .unwrap();
        assert_eq!(logged.mastery.mastery_level, 0);

        let validated = svc.validate_session(&logged.session.id).await.unwrap();
        assert!(validated.session.validated);
        assert!(validated.session.completed);
        assert_eq!(validated.mastery.mastery_level, 50);
        assert_eq!(validated.session.experience_gained, 75);

        let err = svc.validate_session(&logged.session.id).await.unwrap_err();
        assert!(matches!(err, DatabaseError::PreconditionViolated(_)));
    }

    #[tokio::test]
    async fn summary_counts_arts() {
        let svc = test_service().await;
        seed_profile(&svc, "u1").await;
        let a = seed_art(&svc, "A", 1, &[]).await;
        let b = seed_art(&svc, "B", 2, &[]).await;
        let pa = svc.list_parts(&a.id).await.unwrap().remove(0);
        let pb = svc.list_parts(&b.id).await.unwrap().remove(0);

        svc.log_practice(&PracticeRequest::new("u1", &a.id, &pa.id, 10).completed())
            .await
            .unwrap();
        for _ in 0..2 {
            svc.log_practice(&PracticeRequest::new("u1", &b.id, &pb.id, 10))
                .await
                .unwrap();
        }

        let summary = svc.mastery_summary("u1").await.unwrap();
        assert_eq!(summary.total_arts, 2);
        assert_eq!(summary.completed_arts, 1);
        assert_eq!(summary.in_progress_arts, 0);
        assert!((summary.average_mastery - 50.0).abs() < f64::EPSILON);
        assert_eq!(summary.most_practiced.unwrap().art_name, "B");
        assert_eq!(summary.highest_mastery.unwrap().art_name, "A");
    }
}
