use sqlx::PgConnection;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::app::catalog::GamificationCatalog;
use crate::domain::gamification::PointsAction;
use crate::error::{EngineError, Result};
use crate::infra::db::Db;

/// Applies points rules to users' running totals.
#[derive(Clone)]
pub struct PointsLedger {
    db: Db,
    catalog: GamificationCatalog,
}

impl PointsLedger {
    pub fn new(db: Db, catalog: GamificationCatalog) -> Self {
        Self { db, catalog }
    }

    /// Awards `action` inside the caller's unit of work and returns the
    /// points applied. Actions without a paying rule are a no-op.
    pub async fn award_in(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
        action: PointsAction,
    ) -> Result<i32> {
        let points = self.catalog.snapshot().points_for(action);
        if points == 0 {
            debug!(user_id = %user_id, action = action.as_str(), "no points rule for action");
            return Ok(0);
        }

        let result = sqlx::query("UPDATE users SET points = points + $2 WHERE id = $1")
            .bind(user_id)
            .bind(i64::from(points))
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound("user"));
        }

        debug!(user_id = %user_id, action = action.as_str(), points, "points awarded");
        Ok(points)
    }

    /// Standalone award. Failures are logged and reported as zero points.
    pub async fn award(&self, user_id: Uuid, action: PointsAction) -> i32 {
        let mut conn = match self.db.pool().acquire().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!(error = ?err, user_id = %user_id, action = action.as_str(), "failed to award points");
                return 0;
            }
        };

        match self.award_in(&mut conn, user_id, action).await {
            Ok(points) => points,
            Err(err) => {
                warn!(error = ?err, user_id = %user_id, action = action.as_str(), "failed to award points");
                0
            }
        }
    }
}
