use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::app::side_effects::SideEffectPolicy;
use crate::domain::notification::{Notification, NotificationPayload};
use crate::error::Result;
use crate::infra::db::Db;

const NOTIFICATION_COLUMNS: &str = "id, user_id, notification_type, title_en, title_ar, \
     body_en, body_ar, report_id, is_read, created_at";

#[derive(Clone)]
pub struct NotificationService {
    db: Db,
}

impl NotificationService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Inserts one notification inside the caller's unit of work.
    pub async fn insert_in(
        conn: &mut PgConnection,
        user_id: Uuid,
        payload: &NotificationPayload,
    ) -> Result<Notification> {
        let row = sqlx::query(&format!(
            "INSERT INTO notifications \
             (user_id, notification_type, title_en, title_ar, body_en, body_ar, report_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {}",
            NOTIFICATION_COLUMNS
        ))
        .bind(user_id)
        .bind(&payload.notification_type)
        .bind(&payload.title_en)
        .bind(&payload.title_ar)
        .bind(&payload.body_en)
        .bind(&payload.body_ar)
        .bind(payload.report_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(notification_from_row(&row))
    }

    pub async fn create_for_user(
        &self,
        user_id: Uuid,
        payload: &NotificationPayload,
    ) -> Result<Notification> {
        let mut conn = self.db.pool().acquire().await?;
        Self::insert_in(&mut conn, user_id, payload).await
    }

    /// Fans `payload` out to every recipient, all or nothing: one failed
    /// insert rolls back the whole batch.
    pub async fn create_for_users(
        &self,
        user_ids: &[Uuid],
        payload: &NotificationPayload,
    ) -> Result<Vec<Notification>> {
        let _watch = self.db.watch("notifications.create_for_users");
        let mut tx = self.db.pool().begin().await?;

        let mut outcome: Result<Vec<Notification>> = Ok(Vec::with_capacity(user_ids.len()));
        for user_id in user_ids {
            match Self::insert_in(&mut tx, *user_id, payload).await {
                Ok(notification) => {
                    if let Ok(created) = outcome.as_mut() {
                        created.push(notification);
                    }
                }
                Err(err) => {
                    outcome = Err(err);
                    break;
                }
            }
        }

        let created = SideEffectPolicy::Strict
            .settle("notifications.fan_out", tx, outcome)
            .await?
            .unwrap_or_default();

        info!(
            recipients = created.len(),
            notification_type = %payload.notification_type,
            "notifications fanned out"
        );
        Ok(created)
    }

    pub async fn list(
        &self,
        user_id: Uuid,
        unread_only: bool,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> Result<Vec<Notification>> {
        let rows = match cursor {
            Some((created_at, notification_id)) => {
                sqlx::query(&format!(
                    "SELECT {} \
                     FROM notifications \
                     WHERE user_id = $1 \
                       AND ($2 = false OR is_read = false) \
                       AND (created_at < $3 OR (created_at = $3 AND id < $4)) \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT $5",
                    NOTIFICATION_COLUMNS
                ))
                .bind(user_id)
                .bind(unread_only)
                .bind(created_at)
                .bind(notification_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} \
                     FROM notifications \
                     WHERE user_id = $1 \
                       AND ($2 = false OR is_read = false) \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT $3",
                    NOTIFICATION_COLUMNS
                ))
                .bind(user_id)
                .bind(unread_only)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
        };

        Ok(rows.iter().map(notification_from_row).collect())
    }

    pub async fn unread_count(&self, user_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = false",
        )
        .bind(user_id)
        .fetch_one(self.db.pool())
        .await?;

        Ok(count)
    }

    /// Returns false when the notification does not exist or belongs to
    /// someone else.
    pub async fn mark_read(&self, notification_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.set_read(notification_id, user_id, true).await
    }

    pub async fn mark_unread(&self, notification_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.set_read(notification_id, user_id, false).await
    }

    async fn set_read(&self, notification_id: Uuid, user_id: Uuid, is_read: bool) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notifications \
             SET is_read = $3 \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(notification_id)
        .bind(user_id)
        .bind(is_read)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = true WHERE user_id = $1 AND is_read = false",
        )
        .bind(user_id)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete(&self, notification_id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(notification_id)
            .bind(user_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn clear_all(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE user_id = $1")
            .bind(user_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected())
    }
}

fn notification_from_row(row: &PgRow) -> Notification {
    Notification {
        id: row.get("id"),
        user_id: row.get("user_id"),
        notification_type: row.get("notification_type"),
        title_en: row.get("title_en"),
        title_ar: row.get("title_ar"),
        body_en: row.get("body_en"),
        body_ar: row.get("body_ar"),
        report_id: row.get("report_id"),
        is_read: row.get("is_read"),
        created_at: row.get("created_at"),
    }
}
