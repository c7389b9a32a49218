use sqlx::postgres::PgRow;
use sqlx::Row;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::app::badges::BadgeEvaluator;
use crate::app::notifications::NotificationService;
use crate::app::side_effects::{savepoint, SideEffectPolicy};
use crate::domain::engagement::{Comment, MAX_COMMENT_LEN};
use crate::domain::gamification::PointsAction;
use crate::domain::notification::NotificationPayload;
use crate::domain::report::status_change_recipients;
use crate::error::{EngineError, Result};
use crate::infra::db::Db;

#[derive(Clone)]
pub struct EngagementService {
    db: Db,
    badges: BadgeEvaluator,
}

impl EngagementService {
    pub fn new(db: Db, badges: BadgeEvaluator) -> Self {
        Self { db, badges }
    }

    /// Adds a comment to a report. Points for the author and notices to the
    /// report's followers are best-effort.
    pub async fn add_comment(&self, report_id: Uuid, user_id: Uuid, body: String) -> Result<Comment> {
        let body = validate_body(body)?;

        let _watch = self.db.watch("comments.create");
        let mut tx = self.db.pool().begin().await?;

        let report = sqlx::query(
            "SELECT created_by, subscribed_user_ids FROM reports WHERE id = $1 FOR SHARE",
        )
        .bind(report_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(EngineError::NotFound("report"))?;
        let created_by: Option<Uuid> = report.get("created_by");
        let subscribers: Vec<Uuid> = report.get("subscribed_user_ids");

        let user_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
        if !user_exists {
            return Err(EngineError::NotFound("user"));
        }

        let row = sqlx::query(
            "INSERT INTO comments (report_id, user_id, body) VALUES ($1, $2, $3) \
             RETURNING id, report_id, user_id, body, created_at",
        )
        .bind(report_id)
        .bind(user_id)
        .bind(&body)
        .fetch_one(&mut *tx)
        .await?;
        let comment = comment_from_row(&row);

        let mut scope = savepoint(&mut tx).await?;
        let outcome = self
            .badges
            .reward_in(&mut scope, user_id, PointsAction::Comment)
            .await;
        SideEffectPolicy::BestEffort
            .settle("comments.create.gamification", scope, outcome)
            .await?;

        let payload = NotificationPayload::new_comment(report_id);
        for recipient in status_change_recipients(created_by, &subscribers, user_id) {
            let mut scope = savepoint(&mut tx).await?;
            let outcome = NotificationService::insert_in(&mut scope, recipient, &payload).await;
            SideEffectPolicy::BestEffort
                .settle("comments.create.notify", scope, outcome)
                .await?;
        }

        tx.commit().await?;

        info!(comment_id = %comment.id, report_id = %report_id, user_id = %user_id, "comment added");
        Ok(comment)
    }

    /// Comments on a report, newest first. `None` when the report does not
    /// exist.
    pub async fn list_comments(
        &self,
        report_id: Uuid,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> Result<Option<Vec<Comment>>> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM reports WHERE id = $1)")
            .bind(report_id)
            .fetch_one(self.db.pool())
            .await?;
        if !exists {
            return Ok(None);
        }

        let rows = match cursor {
            Some((created_at, comment_id)) => {
                sqlx::query(
                    "SELECT id, report_id, user_id, body, created_at \
                     FROM comments \
                     WHERE report_id = $1 \
                       AND (created_at < $2 OR (created_at = $2 AND id < $3)) \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT $4",
                )
                .bind(report_id)
                .bind(created_at)
                .bind(comment_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, report_id, user_id, body, created_at \
                     FROM comments \
                     WHERE report_id = $1 \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT $2",
                )
                .bind(report_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
        };

        Ok(Some(rows.iter().map(comment_from_row).collect()))
    }

    /// Deletes a comment. Only its author may do so; points already paid are
    /// kept.
    pub async fn delete_comment(&self, comment_id: Uuid, report_id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM comments WHERE id = $1 AND report_id = $2 AND user_id = $3",
        )
        .bind(comment_id)
        .bind(report_id)
        .bind(user_id)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn validate_body(body: String) -> Result<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(EngineError::validation("comment body is required"));
    }
    if trimmed.chars().count() > MAX_COMMENT_LEN {
        return Err(EngineError::validation(format!(
            "comment body must be at most {} characters",
            MAX_COMMENT_LEN
        )));
    }
    Ok(trimmed.to_string())
}

fn comment_from_row(row: &PgRow) -> Comment {
    Comment {
        id: row.get("id"),
        report_id: row.get("report_id"),
        user_id: row.get("user_id"),
        body: row.get("body"),
        created_at: row.get("created_at"),
    }
}
