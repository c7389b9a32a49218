use sqlx::Row;
use uuid::Uuid;

use crate::domain::user::{GamificationProfile, LeaderboardEntry, UserRole};
use crate::error::{EngineError, Result};
use crate::infra::db::Db;

pub const MAX_LEADERBOARD_LIMIT: i64 = 100;

#[derive(Clone)]
pub struct UserService {
    db: Db,
}

impl UserService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn gamification_profile(&self, user_id: Uuid) -> Result<Option<GamificationProfile>> {
        let row = sqlx::query(
            "SELECT id, display_name, role, points, achievements, reports_count, \
                    reports_confirmed, created_at \
             FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let role: String = row.get("role");
        let role = UserRole::from_db(&role).ok_or_else(|| {
            EngineError::Store(sqlx::Error::Decode(
                format!("unknown user role: {}", role).into(),
            ))
        })?;

        Ok(Some(GamificationProfile {
            id: row.get("id"),
            display_name: row.get("display_name"),
            role,
            points: row.get("points"),
            achievements: row.get("achievements"),
            reports_count: row.get("reports_count"),
            reports_confirmed: row.get("reports_confirmed"),
            created_at: row.get("created_at"),
        }))
    }

    /// Citizens ranked by points. Ties share a rank.
    pub async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>> {
        let rows = sqlx::query(
            "SELECT RANK() OVER (ORDER BY points DESC) AS rank, \
                    id, display_name, points, \
                    cardinality(achievements) AS badges_count \
             FROM users \
             WHERE role = 'citizen' \
             ORDER BY points DESC, id ASC \
             LIMIT $1",
        )
        .bind(limit.clamp(1, MAX_LEADERBOARD_LIMIT))
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| LeaderboardEntry {
                rank: row.get("rank"),
                id: row.get("id"),
                display_name: row.get("display_name"),
                points: row.get("points"),
                badges_count: row.get("badges_count"),
            })
            .collect())
    }
}
