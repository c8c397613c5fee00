//! Practice session log: append-only sessions and the statistics derived
//! from them.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{Duration, Utc};
use eud_core::entities::{ArtPart, PracticeSession};
use eud_core::progression::calendar_streak;
use eud_core::responses::PracticeStats;

use crate::error::DatabaseError;
use crate::helpers::{get_bool, get_int, get_opt_string, parse_datetime};
use crate::service::EudService;

const SELECT_COLS: &str = "id, user_id, art_id, part_id, practiced_at, duration_minutes, notes,
    rating, validated, completed, experience_gained";

fn row_to_session(row: &libsql::Row) -> Result<PracticeSession, DatabaseError> {
    let rating = match row.get::<Option<i64>>(7)? {
        Some(r) => Some(
            u8::try_from(r).map_err(|_| DatabaseError::Query(format!("rating {r} out of range")))?,
        ),
        None => None,
    };
    Ok(PracticeSession {
        id: row.get::<String>(0)?,
        user_id: row.get::<String>(1)?,
        art_id: row.get::<String>(2)?,
        part_id: row.get::<String>(3)?,
        practiced_at: parse_datetime(&row.get::<String>(4)?)?,
        duration_minutes: get_int(row, 5)?,
        notes: get_opt_string(row, 6)?,
        rating,
        validated: get_bool(row, 8)?,
        completed: get_bool(row, 9)?,
        experience_gained: get_int(row, 10)?,
    })
}

impl EudService {
    pub(crate) async fn insert_session_in(&self, session: &PracticeSession) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO practice_sessions (id, user_id, art_id, part_id, practiced_at, duration_minutes,
                     notes, rating, validated, completed, experience_gained)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                libsql::params![
                    session.id.as_str(),
                    session.user_id.as_str(),
                    session.art_id.as_str(),
                    session.part_id.as_str(),
                    session.practiced_at.to_rfc3339(),
                    session.duration_minutes,
                    session.notes.as_deref(),
                    session.rating,
                    session.validated,
                    session.completed,
                    session.experience_gained
                ],
            )
            .await?;
        Ok(())
    }

    /// # Errors
    ///
    /// `NotFound` if no session has this id.
    pub async fn get_session(&self, id: &str) -> Result<PracticeSession, DatabaseError> {
        let mut rows = self
            .conn()
            .query(&format!("SELECT {SELECT_COLS} FROM practice_sessions WHERE id = ?1"), [id])
            .await?;
        match rows.next().await? {
            Some(row) => row_to_session(&row),
            None => Err(DatabaseError::not_found("practice_session", id)),
        }
    }

    /// Sessions of a user, newest first, optionally for one art.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn practice_history(
        &self,
        user_id: &str,
        art_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<PracticeSession>, DatabaseError> {
        let mut sql = format!("SELECT {SELECT_COLS} FROM practice_sessions WHERE user_id = ?1");
        let mut params: Vec<libsql::Value> = vec![libsql::Value::Text(user_id.to_string())];
        if let Some(art_id) = art_id {
            params.push(libsql::Value::Text(art_id.to_string()));
            sql.push_str(&format!(" AND art_id = ?{}", params.len()));
        }
        params.push(libsql::Value::Integer(i64::from(limit)));
        sql.push_str(&format!(" ORDER BY practiced_at DESC, rowid DESC LIMIT ?{}", params.len()));

        let mut rows = self
            .conn()
            .query(&sql, libsql::params_from_iter(params))
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_session(&row)?);
        }
        Ok(out)
    }

    /// Parts of `art_id` the user has completed, in order.
    ///
    /// # Errors
    ///
    /// `NotFound` if the user has not discovered the art.
    pub async fn completed_parts(&self, user_id: &str, art_id: &str) -> Result<Vec<ArtPart>, DatabaseError> {
        let mastery = self.get_mastery(user_id, art_id).await?;
        Ok(self
            .list_parts(art_id)
            .await?
            .into_iter()
            .filter(|p| mastery.completed_parts.contains(&p.id))
            .collect())
    }

    /// Parts practiced at least once but not completed, in order.
    ///
    /// # Errors
    ///
    /// `NotFound` if the user has not discovered the art.
    pub async fn started_parts(&self, user_id: &str, art_id: &str) -> Result<Vec<ArtPart>, DatabaseError> {
        let mastery = self.get_mastery(user_id, art_id).await?;
        let practiced: BTreeSet<&str> = mastery
            .practice_history
            .iter()
            .map(|e| e.part_id.as_str())
            .collect();
        Ok(self
            .list_parts(art_id)
            .await?
            .into_iter()
            .filter(|p| practiced.contains(p.id.as_str()) && !mastery.completed_parts.contains(&p.id))
            .collect())
    }

    /// Aggregate statistics over the last `days` days of practice.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if a query fails.
    pub async fn practice_stats(
        &self,
        user_id: &str,
        art_id: Option<&str>,
        days: u32,
    ) -> Result<PracticeStats, DatabaseError> {
        let now = Utc::now();
        let since = now - Duration::days(i64::from(days));

        let mut sql = format!(
            "SELECT {SELECT_COLS} FROM practice_sessions WHERE user_id = ?1 AND practiced_at >= ?2"
        );
        let mut params: Vec<libsql::Value> = vec![
            libsql::Value::Text(user_id.to_string()),
            libsql::Value::Text(since.to_rfc3339()),
        ];
        if let Some(art_id) = art_id {
            params.push(libsql::Value::Text(art_id.to_string()));
            sql.push_str(&format!(" AND art_id = ?{}", params.len()));
        }
        sql.push_str(" ORDER BY practiced_at");

        let mut rows = self
            .conn()
            .query(&sql, libsql::params_from_iter(params))
            .await?;
        let mut sessions = Vec::new();
        while let Some(row) = rows.next().await? {
            sessions.push(row_to_session(&row)?);
        }

        let methods: HashMap<String, String> = {
            let mut rows = self
                .conn()
                .query("SELECT id, practice_method FROM art_parts", ())
                .await?;
            let mut map = HashMap::new();
            while let Some(row) = rows.next().await? {
                map.insert(row.get::<String>(0)?, row.get::<String>(1)?);
            }
            map
        };

        let mut minutes_by_art: BTreeMap<String, u64> = BTreeMap::new();
        let mut sessions_by_method: BTreeMap<String, u32> = BTreeMap::new();
        let mut sessions_by_day: BTreeMap<String, u32> = BTreeMap::new();
        let mut practice_days = BTreeSet::new();
        for s in &sessions {
            *minutes_by_art.entry(s.art_id.clone()).or_default() += u64::from(s.duration_minutes);
            if let Some(method) = methods.get(&s.part_id) {
                *sessions_by_method.entry(method.clone()).or_default() += 1;
            }
            let day = s.practiced_at.date_naive();
            *sessions_by_day.entry(day.to_string()).or_default() += 1;
            practice_days.insert(day);
        }

        let total_minutes: u64 = sessions.iter().map(|s| u64::from(s.duration_minutes)).sum();
        #[allow(clippy::cast_precision_loss)]
        let average_minutes = if sessions.is_empty() {
            0.0
        } else {
            total_minutes as f64 / sessions.len() as f64
        };

        Ok(PracticeStats {
            user_id: user_id.to_string(),
            art_id: art_id.map(String::from),
            days,
            total_sessions: u32::try_from(sessions.len()).unwrap_or(u32::MAX),
            total_minutes,
            average_minutes,
            longest_minutes: sessions.iter().map(|s| s.duration_minutes).max().unwrap_or(0),
            shortest_minutes: sessions.iter().map(|s| s.duration_minutes).min().unwrap_or(0),
            last_practice: sessions.iter().map(|s| s.practiced_at).max(),
            minutes_by_art,
            sessions_by_method,
            sessions_by_day,
            streak_days: calendar_streak(&practice_days, now.date_naive()),
        })
    }
}
