//! Player profile repository: rank, economic layer, XP, virtues, resources.
//!
//! Profiles are created explicitly. Every engine operation that needs one
//! fails with `NotFound` when it is missing instead of assuming defaults.

use std::collections::BTreeMap;

use chrono::Utc;
use eud_core::audit_detail::VirtueGainDetail;
use eud_core::entities::{PlayerProfile, VirtueHistoryEntry};
use eud_core::enums::{AuditAction, EconomicLayer, EntityType, TrailOp};
use eud_core::ids::PREFIX_VIRTUE_HISTORY;
use eud_core::virtues::{HappinessMetrics, VirtueMap};

use crate::error::DatabaseError;
use crate::helpers::{get_int, parse_datetime, parse_enum, parse_json, to_json, to_value};
use crate::service::{EudService, Mutation};

const SELECT_COLS: &str = "user_id, rank, experience_points, economic_layer,
    wisdom, courage, temperance, justice, strength, health, beauty, endurance,
    created_at, updated_at";

fn row_to_profile(row: &libsql::Row) -> Result<PlayerProfile, DatabaseError> {
    Ok(PlayerProfile {
        user_id: row.get::<String>(0)?,
        rank: get_int(row, 1)?,
        experience_points: get_int(row, 2)?,
        economic_layer: parse_enum(&row.get::<String>(3)?)?,
        happiness: HappinessMetrics {
            wisdom: row.get::<f64>(4)?,
            courage: row.get::<f64>(5)?,
            temperance: row.get::<f64>(6)?,
            justice: row.get::<f64>(7)?,
            strength: row.get::<f64>(8)?,
            health: row.get::<f64>(9)?,
            beauty: row.get::<f64>(10)?,
            endurance: row.get::<f64>(11)?,
        },
        resources: BTreeMap::new(),
        created_at: parse_datetime(&row.get::<String>(12)?)?,
        updated_at: parse_datetime(&row.get::<String>(13)?)?,
    })
}

fn check_rank(rank: u8) -> Result<(), DatabaseError> {
    if (1..=4).contains(&rank) {
        Ok(())
    } else {
        Err(DatabaseError::Validation(format!("rank must be 1..=4, got {rank}")))
    }
}

impl EudService {
    /// Create a player profile at the lowest virtue values.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty user id or a rank outside 1..=4,
    /// `PreconditionViolated` if the profile already exists.
    pub async fn create_profile(
        &self,
        user_id: &str,
        rank: u8,
        economic_layer: EconomicLayer,
    ) -> Result<PlayerProfile, DatabaseError> {
        if user_id.trim().is_empty() {
            return Err(DatabaseError::Validation("user id must not be empty".into()));
        }
        check_rank(rank)?;

        self.write(|| async {
            if self.find_profile(user_id).await?.is_some() {
                return Err(DatabaseError::PreconditionViolated(format!(
                    "profile {user_id} already exists"
                )));
            }
            let now = Utc::now().to_rfc3339();
            self.conn()
                .execute(
                    "INSERT INTO player_profiles (user_id, rank, economic_layer, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    libsql::params![user_id, rank, economic_layer.as_str(), now.as_str(), now.as_str()],
                )
                .await?;
            let profile = self.get_profile(user_id).await?;
            self.record(Mutation {
                user: Some(user_id),
                entity: EntityType::Profile,
                id: user_id,
                action: AuditAction::Created,
                op: TrailOp::Create,
                data: to_value(&profile)?,
                detail: None,
            })
            .await?;
            Ok(profile)
        })
        .await
    }

    /// Load a profile with its resource balances.
    ///
    /// # Errors
    ///
    /// `NotFound` if the user has no profile.
    pub async fn get_profile(&self, user_id: &str) -> Result<PlayerProfile, DatabaseError> {
        self.find_profile(user_id)
            .await?
            .ok_or_else(|| DatabaseError::not_found("profile", user_id))
    }

    pub(crate) async fn find_profile(&self, user_id: &str) -> Result<Option<PlayerProfile>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {SELECT_COLS} FROM player_profiles WHERE user_id = ?1"),
                [user_id],
            )
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let mut profile = row_to_profile(&row)?;
        profile.resources = self.resources_of(user_id).await?;
        Ok(Some(profile))
    }

    async fn resources_of(&self, user_id: &str) -> Result<BTreeMap<String, i64>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT resource, amount FROM player_resources WHERE user_id = ?1",
                [user_id],
            )
            .await?;
        let mut resources = BTreeMap::new();
        while let Some(row) = rows.next().await? {
            resources.insert(row.get::<String>(0)?, row.get::<i64>(1)?);
        }
        Ok(resources)
    }

    /// Change rank and/or economic layer.
    ///
    /// # Errors
    ///
    /// `NotFound` if the profile is missing, `Validation` for a bad rank.
    pub async fn update_profile(
        &self,
        user_id: &str,
        rank: Option<u8>,
        economic_layer: Option<EconomicLayer>,
    ) -> Result<PlayerProfile, DatabaseError> {
        if let Some(rank) = rank {
            check_rank(rank)?;
        }
        self.write(|| async {
            let before = self.get_profile(user_id).await?;
            let rank = rank.unwrap_or(before.rank);
            let layer = economic_layer.unwrap_or(before.economic_layer);
            self.conn()
                .execute(
                    "UPDATE player_profiles SET rank = ?1, economic_layer = ?2, updated_at = ?3 WHERE user_id = ?4",
                    libsql::params![rank, layer.as_str(), Utc::now().to_rfc3339(), user_id],
                )
                .await?;
            self.record(Mutation {
                user: Some(user_id),
                entity: EntityType::Profile,
                id: user_id,
                action: AuditAction::Updated,
                op: TrailOp::Update,
                data: serde_json::json!({"rank": rank, "economic_layer": layer}),
                detail: None,
            })
            .await?;
            self.get_profile(user_id).await
        })
        .await
    }

    /// Set the balance of one resource.
    ///
    /// # Errors
    ///
    /// `NotFound` if the profile is missing, `Validation` for a negative amount.
    pub async fn set_resource(
        &self,
        user_id: &str,
        resource: &str,
        amount: i64,
    ) -> Result<PlayerProfile, DatabaseError> {
        if amount < 0 {
            return Err(DatabaseError::Validation(format!(
                "resource amount must not be negative, got {amount}"
            )));
        }
        if resource.trim().is_empty() {
            return Err(DatabaseError::Validation("resource name must not be empty".into()));
        }
        self.write(|| async {
            self.get_profile(user_id).await?;
            self.conn()
                .execute(
                    "INSERT INTO player_resources (user_id, resource, amount) VALUES (?1, ?2, ?3)
                     ON CONFLICT (user_id, resource) DO UPDATE SET amount = excluded.amount",
                    libsql::params![user_id, resource, amount],
                )
                .await?;
            self.record(Mutation {
                user: Some(user_id),
                entity: EntityType::Profile,
                id: user_id,
                action: AuditAction::Updated,
                op: TrailOp::Update,
                data: serde_json::json!({"resources": {resource: amount}}),
                detail: None,
            })
            .await?;
            self.get_profile(user_id).await
        })
        .await
    }

    /// Most recent virtue snapshots, newest first.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn virtue_history(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<VirtueHistoryEntry>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, user_id, virtues, happiness, recorded_at FROM virtue_history
                 WHERE user_id = ?1 ORDER BY recorded_at DESC, rowid DESC LIMIT ?2",
                libsql::params![user_id, limit],
            )
            .await?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(VirtueHistoryEntry {
                id: row.get::<String>(0)?,
                user_id: row.get::<String>(1)?,
                values: parse_json(&row.get::<String>(2)?)?,
                happiness: row.get::<f64>(3)?,
                recorded_at: parse_datetime(&row.get::<String>(4)?)?,
            });
        }
        Ok(entries)
    }

    /// Add XP to a profile. Must run inside a write.
    pub(crate) async fn grant_xp_in(&self, user_id: &str, xp: u32) -> Result<(), DatabaseError> {
        if xp == 0 {
            return Ok(());
        }
        let changed = self
            .conn()
            .execute(
                "UPDATE player_profiles SET experience_points = experience_points + ?1, updated_at = ?2
                 WHERE user_id = ?3",
                libsql::params![xp, Utc::now().to_rfc3339(), user_id],
            )
            .await?;
        if changed == 0 {
            return Err(DatabaseError::not_found("profile", user_id));
        }
        Ok(())
    }

    /// Raise virtues by `increments`, capped at the configured ceiling.
    ///
    /// Snapshots the prior values into the virtue history (trimmed to the
    /// configured limit) whenever anything changes. Returns the gains that
    /// were actually applied. Must run inside a write.
    pub(crate) async fn raise_virtues_in(
        &self,
        user_id: &str,
        increments: &VirtueMap,
        source: &str,
        xp: u32,
    ) -> Result<VirtueMap, DatabaseError> {
        if increments.is_empty() {
            return Ok(VirtueMap::new());
        }
        let profile = self.get_profile(user_id).await?;
        let before = profile.happiness;
        let mut after = before;
        let gains = after.raise(increments, self.progression().virtue_ceiling);
        if gains.is_empty() {
            return Ok(gains);
        }

        let now = Utc::now().to_rfc3339();
        let snapshot_id = self.db().generate_id(PREFIX_VIRTUE_HISTORY).await?;
        self.conn()
            .execute(
                "INSERT INTO virtue_history (id, user_id, virtues, happiness, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                libsql::params![
                    snapshot_id.as_str(),
                    user_id,
                    to_json(&before.to_map())?,
                    before.happiness(),
                    now.as_str()
                ],
            )
            .await?;
        self.conn()
            .execute(
                "DELETE FROM virtue_history WHERE user_id = ?1 AND id NOT IN (
                     SELECT id FROM virtue_history WHERE user_id = ?1
                     ORDER BY recorded_at DESC, rowid DESC LIMIT ?2)",
                libsql::params![user_id, self.progression().virtue_history_limit],
            )
            .await?;

        self.conn()
            .execute(
                "UPDATE player_profiles SET wisdom = ?1, courage = ?2, temperance = ?3, justice = ?4,
                     strength = ?5, health = ?6, beauty = ?7, endurance = ?8, updated_at = ?9
                 WHERE user_id = ?10",
                libsql::params![
                    after.wisdom,
                    after.courage,
                    after.temperance,
                    after.justice,
                    after.strength,
                    after.health,
                    after.beauty,
                    after.endurance,
                    now.as_str(),
                    user_id
                ],
            )
            .await?;

        let detail = VirtueGainDetail {
            source: source.to_string(),
            xp,
            virtues: gains.clone(),
        };
        self.record(Mutation {
            user: Some(user_id),
            entity: EntityType::Profile,
            id: user_id,
            action: AuditAction::VirtuesImproved,
            op: TrailOp::Update,
            data: serde_json::json!({"happiness": after}),
            detail: Some(to_value(&detail)?),
        })
        .await?;
        tracing::info!(user_id, source, ?gains, "virtues improved");
        Ok(gains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::helpers::{test_service, test_service_with};
    use eud_config::ProgressionConfig;
    use eud_core::enums::Virtue;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn create_and_get_profile() {
        let svc = test_service().await;
        let created = svc.create_profile("u1", 2, EconomicLayer::Laws).await.unwrap();
        assert_eq!(created.rank, 2);
        assert_eq!(created.experience_points, 0);
        assert_eq!(created.happiness, HappinessMetrics::default());

        let loaded = svc.get_profile("u1").await.unwrap();
        assert_eq!(loaded, created);
    }

    #[tokio::test]
    async fn missing_profile_is_not_found() {
        let svc = test_service().await;
        let err = svc.get_profile("ghost").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn duplicate_profile_is_rejected() {
        let svc = test_service().await;
        svc.create_profile("u1", 1, EconomicLayer::Port).await.unwrap();
        let err = svc.create_profile("u1", 1, EconomicLayer::Port).await.unwrap_err();
        assert!(matches!(err, DatabaseError::PreconditionViolated(_)));
    }

    #[tokio::test]
    async fn rank_is_validated() {
        let svc = test_service().await;
        let err = svc.create_profile("u1", 5, EconomicLayer::Port).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Validation(_)));
    }

    #[tokio::test]
    async fn resources_upsert() {
        let svc = test_service().await;
        svc.create_profile("u1", 1, EconomicLayer::Port).await.unwrap();
        svc.set_resource("u1", "rosin", 2).await.unwrap();
        let profile = svc.set_resource("u1", "rosin", 5).await.unwrap();
        assert_eq!(profile.resources.get("rosin"), Some(&5));
        assert!(svc.set_resource("u1", "rosin", -1).await.is_err());
    }

    #[tokio::test]
    async fn update_profile_changes_rank_and_layer() {
        let svc = test_service().await;
        svc.create_profile("u1", 1, EconomicLayer::Port).await.unwrap();
        let p = svc.update_profile("u1", Some(3), None).await.unwrap();
        assert_eq!((p.rank, p.economic_layer), (3, EconomicLayer::Port));
        let p = svc.update_profile("u1", None, Some(EconomicLayer::Republic)).await.unwrap();
        assert_eq!((p.rank, p.economic_layer), (3, EconomicLayer::Republic));
    }

    #[tokio::test]
    async fn virtues_are_capped_and_history_trimmed() {
        let svc = test_service_with(ProgressionConfig {
            virtue_ceiling: 10.0,
            virtue_history_limit: 2,
            ..Default::default()
        })
        .await;
        svc.create_profile("u1", 1, EconomicLayer::Port).await.unwrap();

        let inc = VirtueMap::from([(Virtue::Wisdom, 4.0)]);
        for _ in 0..3 {
            svc.write(|| async { svc.raise_virtues_in("u1", &inc, "test", 0).await })
                .await
                .unwrap();
        }
        let gains = svc
            .write(|| async { svc.raise_virtues_in("u1", &inc, "test", 0).await })
            .await
            .unwrap();
        assert!(gains.is_empty(), "already at the ceiling");

        let profile = svc.get_profile("u1").await.unwrap();
        assert!((profile.happiness.wisdom - 10.0).abs() < f64::EPSILON);

        let history = svc.virtue_history("u1", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        // Newest snapshot holds the value before the third raise.
        assert_eq!(history[0].values.get(&Virtue::Wisdom), Some(&8.0));
    }
}
