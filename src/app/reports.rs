use sqlx::postgres::PgRow;
use sqlx::{Postgres, QueryBuilder, Row};
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::app::badges::BadgeEvaluator;
use crate::app::notifications::NotificationService;
use crate::app::side_effects::{savepoint, SideEffectPolicy};
use crate::domain::gamification::PointsAction;
use crate::domain::notification::NotificationPayload;
use crate::domain::report::{
    status_change_recipients, validate_coordinates, FieldValue, NearbyReport, NewReport, Report,
    ReportChanges, ReportHistoryEntry, ReportStatus, Severity,
};
use crate::error::{EngineError, Result};
use crate::infra::db::Db;

pub(crate) const REPORT_COLUMNS: &str = "id, title_en, title_ar, description_en, description_ar, \
     latitude, longitude, address, municipality, category, sub_category, \
     status::text AS status, severity::text AS severity, confirmations_count, \
     subscribed_user_ids, created_by, assigned_to, photo_urls, \
     resolution_photo_url, resolution_note, created_at, updated_at";

const EARTH_RADIUS_KM: f64 = 6371.0;
pub const MAX_NEARBY_RADIUS_KM: f64 = 100.0;

#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub status: Option<ReportStatus>,
    pub category: Option<String>,
    pub municipality: Option<String>,
    pub created_by: Option<Uuid>,
}

#[derive(Clone)]
pub struct ReportService {
    db: Db,
    badges: BadgeEvaluator,
}

impl ReportService {
    pub fn new(db: Db, badges: BadgeEvaluator) -> Self {
        Self { db, badges }
    }

    pub async fn create_report(&self, input: NewReport, actor_id: Uuid) -> Result<Report> {
        input.validate()?;

        let _watch = self.db.watch("reports.create");
        let mut tx = self.db.pool().begin().await?;

        let bumped = sqlx::query("UPDATE users SET reports_count = reports_count + 1 WHERE id = $1")
            .bind(actor_id)
            .execute(&mut *tx)
            .await?;
        if bumped.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(EngineError::NotFound("user"));
        }

        let row = sqlx::query(&format!(
            "INSERT INTO reports \
             (title_en, title_ar, description_en, description_ar, latitude, longitude, \
              address, municipality, category, sub_category, severity, photo_urls, \
              created_by, subscribed_user_ids) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11::report_severity, $12, \
                     $13, ARRAY[$13]::uuid[]) \
             RETURNING {}",
            REPORT_COLUMNS
        ))
        .bind(&input.title_en)
        .bind(&input.title_ar)
        .bind(&input.description_en)
        .bind(&input.description_ar)
        .bind(input.latitude)
        .bind(input.longitude)
        .bind(&input.address)
        .bind(&input.municipality)
        .bind(&input.category)
        .bind(&input.sub_category)
        .bind(input.severity.unwrap_or(Severity::Medium).as_db())
        .bind(&input.photo_urls)
        .bind(actor_id)
        .fetch_one(&mut *tx)
        .await?;
        let report = report_from_row(&row)?;

        let mut scope = savepoint(&mut tx).await?;
        let outcome = self
            .badges
            .reward_in(&mut scope, actor_id, PointsAction::SubmitReport)
            .await;
        SideEffectPolicy::BestEffort
            .settle("reports.create.gamification", scope, outcome)
            .await?;

        tx.commit().await?;

        info!(report_id = %report.id, actor_id = %actor_id, category = %report.category, "report created");
        Ok(report)
    }

    /// Applies allow-listed changes. Returns `None` when the report does not
    /// exist.
    ///
    /// An effective status change appends one history entry and notifies the
    /// creator and subscribers other than the actor. Each notification is
    /// best-effort and cannot abort the update.
    pub async fn update_report(
        &self,
        report_id: Uuid,
        changes: ReportChanges,
        actor_id: Uuid,
    ) -> Result<Option<Report>> {
        if changes.is_empty() {
            return Err(EngineError::NoValidFields);
        }

        let _watch = self.db.watch("reports.update");
        let mut tx = self.db.pool().begin().await?;

        let current = sqlx::query(
            "SELECT status::text AS status, created_by, subscribed_user_ids \
             FROM reports \
             WHERE id = $1 \
             FOR UPDATE",
        )
        .bind(report_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(current) = current else {
            tx.rollback().await?;
            return Ok(None);
        };
        let old_status = decode_status(current.get("status"))?;
        let created_by: Option<Uuid> = current.get("created_by");
        let subscribers: Vec<Uuid> = current.get("subscribed_user_ids");

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE reports SET ");
        {
            let mut assignments = builder.separated(", ");
            for (column, value) in changes.fields() {
                assignments.push(format!("{} = ", column));
                match value {
                    FieldValue::Text(text) => {
                        assignments.push_bind_unseparated(text.clone());
                    }
                    FieldValue::Id(id) => {
                        assignments.push_bind_unseparated(*id);
                    }
                    FieldValue::Status(status) => {
                        assignments.push_bind_unseparated(status.as_db());
                        assignments.push_unseparated("::report_status");
                    }
                    FieldValue::Severity(severity) => {
                        assignments.push_bind_unseparated(severity.as_db());
                        assignments.push_unseparated("::report_severity");
                    }
                }
            }
            assignments.push("updated_at = now()");
        }
        builder
            .push(" WHERE id = ")
            .push_bind(report_id)
            .push(" RETURNING ")
            .push(REPORT_COLUMNS);

        let row = builder.build().fetch_one(&mut *tx).await?;
        let report = report_from_row(&row)?;

        if let Some(new_status) = changes.status().filter(|status| *status != old_status) {
            sqlx::query(
                "INSERT INTO report_history (report_id, old_status, new_status, changed_by, note) \
                 VALUES ($1, $2::report_status, $3::report_status, $4, $5)",
            )
            .bind(report_id)
            .bind(old_status.as_db())
            .bind(new_status.as_db())
            .bind(actor_id)
            .bind(format!(
                "Status changed from {} to {}",
                old_status.as_db(),
                new_status.as_db()
            ))
            .execute(&mut *tx)
            .await?;

            let payload = NotificationPayload::status_change(report_id, new_status);
            let recipients = status_change_recipients(created_by, &subscribers, actor_id);
            let mut notified = 0usize;
            for recipient in &recipients {
                let mut scope = savepoint(&mut tx).await?;
                let outcome = NotificationService::insert_in(&mut scope, *recipient, &payload).await;
                if SideEffectPolicy::BestEffort
                    .settle("reports.update.notify", scope, outcome)
                    .await?
                    .is_some()
                {
                    notified += 1;
                }
            }

            info!(
                report_id = %report_id,
                actor_id = %actor_id,
                old_status = old_status.as_db(),
                new_status = new_status.as_db(),
                recipients = recipients.len(),
                notified,
                "report status changed"
            );
        }

        tx.commit().await?;
        Ok(Some(report))
    }

    /// Records `actor_id` confirming someone else's report.
    ///
    /// The report counter and the user's confirmation set change together.
    /// Points and badges follow in a savepoint; if they fail the
    /// confirmation still commits.
    pub async fn confirm_report(&self, report_id: Uuid, actor_id: Uuid) -> Result<Report> {
        let _watch = self.db.watch("reports.confirm");
        let mut tx = self.db.pool().begin().await?;

        let created_by: Option<Uuid> = sqlx::query_scalar::<_, Option<Uuid>>(
            "SELECT created_by FROM reports WHERE id = $1 FOR UPDATE",
        )
        .bind(report_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(EngineError::NotFound("report"))?;

        if created_by == Some(actor_id) {
            return Err(EngineError::SelfConfirmation);
        }

        let already_confirmed: bool = sqlx::query_scalar(
            "SELECT $2 = ANY(confirmed_report_ids) FROM users WHERE id = $1 FOR UPDATE",
        )
        .bind(actor_id)
        .bind(report_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(EngineError::NotFound("user"))?;

        if already_confirmed {
            return Err(EngineError::AlreadyConfirmed);
        }

        let row = sqlx::query(&format!(
            "UPDATE reports \
             SET confirmations_count = confirmations_count + 1, updated_at = now() \
             WHERE id = $1 \
             RETURNING {}",
            REPORT_COLUMNS
        ))
        .bind(report_id)
        .fetch_one(&mut *tx)
        .await?;
        let report = report_from_row(&row)?;

        let recorded = sqlx::query(
            "UPDATE users \
             SET confirmed_report_ids = array_append(confirmed_report_ids, $2), \
                 reports_confirmed = reports_confirmed + 1 \
             WHERE id = $1 AND NOT ($2 = ANY(confirmed_report_ids))",
        )
        .bind(actor_id)
        .bind(report_id)
        .execute(&mut *tx)
        .await?;
        if recorded.rows_affected() == 0 {
            return Err(EngineError::AlreadyConfirmed);
        }

        let mut scope = savepoint(&mut tx).await?;
        let outcome = self
            .badges
            .reward_in(&mut scope, actor_id, PointsAction::ConfirmReport)
            .await;
        SideEffectPolicy::BestEffort
            .settle("reports.confirm.gamification", scope, outcome)
            .await?;

        tx.commit().await?;

        info!(
            report_id = %report_id,
            actor_id = %actor_id,
            confirmations = report.confirmations_count,
            "report confirmed"
        );
        Ok(report)
    }

    pub async fn subscribe(&self, report_id: Uuid, user_id: Uuid) -> Result<Option<Report>> {
        let row = sqlx::query(&format!(
            "UPDATE reports \
             SET subscribed_user_ids = CASE \
                 WHEN $2 = ANY(subscribed_user_ids) THEN subscribed_user_ids \
                 ELSE array_append(subscribed_user_ids, $2) \
             END \
             WHERE id = $1 \
             RETURNING {}",
            REPORT_COLUMNS
        ))
        .bind(report_id)
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(report_from_row).transpose()
    }

    pub async fn unsubscribe(&self, report_id: Uuid, user_id: Uuid) -> Result<Option<Report>> {
        let row = sqlx::query(&format!(
            "UPDATE reports \
             SET subscribed_user_ids = array_remove(subscribed_user_ids, $2) \
             WHERE id = $1 \
             RETURNING {}",
            REPORT_COLUMNS
        ))
        .bind(report_id)
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(report_from_row).transpose()
    }

    /// Deletes a report together with its comments, history and
    /// notifications.
    pub async fn delete_report(&self, report_id: Uuid, actor_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM reports WHERE id = $1")
            .bind(report_id)
            .execute(self.db.pool())
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(report_id = %report_id, actor_id = %actor_id, "report deleted");
        }
        Ok(deleted)
    }

    pub async fn get_report(&self, report_id: Uuid) -> Result<Option<Report>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM reports WHERE id = $1",
            REPORT_COLUMNS
        ))
        .bind(report_id)
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(report_from_row).transpose()
    }

    /// Status history, newest first. `None` when the report does not exist.
    pub async fn report_history(&self, report_id: Uuid) -> Result<Option<Vec<ReportHistoryEntry>>> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM reports WHERE id = $1)")
            .bind(report_id)
            .fetch_one(self.db.pool())
            .await?;
        if !exists {
            return Ok(None);
        }

        let rows = sqlx::query(
            "SELECT id, report_id, old_status::text AS old_status, new_status::text AS new_status, \
                    changed_by, note, created_at \
             FROM report_history \
             WHERE report_id = $1 \
             ORDER BY created_at DESC, id DESC",
        )
        .bind(report_id)
        .fetch_all(self.db.pool())
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(ReportHistoryEntry {
                id: row.get("id"),
                report_id: row.get("report_id"),
                old_status: decode_status(row.get("old_status"))?,
                new_status: decode_status(row.get("new_status"))?,
                changed_by: row.get("changed_by"),
                note: row.get("note"),
                created_at: row.get("created_at"),
            });
        }

        Ok(Some(entries))
    }

    pub async fn list_reports(
        &self,
        filter: &ReportFilter,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> Result<Vec<Report>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT ");
        builder.push(REPORT_COLUMNS).push(" FROM reports WHERE true");

        if let Some(status) = filter.status {
            builder
                .push(" AND status = ")
                .push_bind(status.as_db())
                .push("::report_status");
        }
        if let Some(category) = &filter.category {
            builder.push(" AND category = ").push_bind(category.clone());
        }
        if let Some(municipality) = &filter.municipality {
            builder
                .push(" AND municipality = ")
                .push_bind(municipality.clone());
        }
        if let Some(created_by) = filter.created_by {
            builder.push(" AND created_by = ").push_bind(created_by);
        }
        if let Some((created_at, report_id)) = cursor {
            builder
                .push(" AND (created_at < ")
                .push_bind(created_at)
                .push(" OR (created_at = ")
                .push_bind(created_at)
                .push(" AND id < ")
                .push_bind(report_id)
                .push("))");
        }
        builder
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(limit);

        let rows = builder.build().fetch_all(self.db.pool()).await?;
        rows.iter().map(report_from_row).collect()
    }

    /// Reports within `radius_km` of a point, nearest first.
    pub async fn list_nearby(
        &self,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
        limit: i64,
    ) -> Result<Vec<NearbyReport>> {
        validate_coordinates(latitude, longitude)?;
        if !radius_km.is_finite() || radius_km <= 0.0 || radius_km > MAX_NEARBY_RADIUS_KM {
            return Err(EngineError::validation(format!(
                "radius_km must be greater than 0 and at most {}",
                MAX_NEARBY_RADIUS_KM
            )));
        }

        let rows = sqlx::query(&format!(
            "SELECT {}, distance_km FROM ( \
                 SELECT reports.*, \
                        {} * 2 * asin(LEAST(1.0, sqrt( \
                            power(sin(radians(latitude - $1) / 2), 2) \
                            + cos(radians($1)) * cos(radians(latitude)) \
                              * power(sin(radians(longitude - $2) / 2), 2) \
                        ))) AS distance_km \
                 FROM reports \
             ) nearby \
             WHERE distance_km <= $3 \
             ORDER BY distance_km ASC, id ASC \
             LIMIT $4",
            REPORT_COLUMNS, EARTH_RADIUS_KM
        ))
        .bind(latitude)
        .bind(longitude)
        .bind(radius_km)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        let mut reports = Vec::with_capacity(rows.len());
        for row in rows {
            reports.push(NearbyReport {
                report: report_from_row(&row)?,
                distance_km: row.get("distance_km"),
            });
        }

        Ok(reports)
    }
}

pub(crate) fn report_from_row(row: &PgRow) -> Result<Report> {
    let severity: String = row.get("severity");
    let severity = Severity::from_db(&severity).ok_or_else(|| {
        EngineError::Store(sqlx::Error::Decode(
            format!("unknown report severity: {}", severity).into(),
        ))
    })?;

    Ok(Report {
        id: row.get("id"),
        title_en: row.get("title_en"),
        title_ar: row.get("title_ar"),
        description_en: row.get("description_en"),
        description_ar: row.get("description_ar"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        address: row.get("address"),
        municipality: row.get("municipality"),
        category: row.get("category"),
        sub_category: row.get("sub_category"),
        status: decode_status(row.get("status"))?,
        severity,
        confirmations_count: row.get("confirmations_count"),
        subscribed_user_ids: row.get("subscribed_user_ids"),
        created_by: row.get("created_by"),
        assigned_to: row.get("assigned_to"),
        photo_urls: row.get("photo_urls"),
        resolution_photo_url: row.get("resolution_photo_url"),
        resolution_note: row.get("resolution_note"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn decode_status(value: String) -> Result<ReportStatus> {
    ReportStatus::from_db(&value).ok_or_else(|| {
        EngineError::Store(sqlx::Error::Decode(
            format!("unknown report status: {}", value).into(),
        ))
    })
}
