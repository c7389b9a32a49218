use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::catalog::{GamificationSnapshot, RELOAD_CHANNEL};
use crate::app::reports::ReportFilter;
use crate::domain::engagement::Comment;
use crate::domain::gamification::BatchSummary;
use crate::domain::notification::{Notification, NotificationPayload, ANNOUNCEMENT};
use crate::domain::report::{
    NearbyReport, NewReport, Report, ReportChanges, ReportHistoryEntry, ReportStatus,
    TrendingReport,
};
use crate::domain::user::{GamificationProfile, LeaderboardEntry};
use crate::http::{Actor, AdminToken, AppError};
use crate::AppState;

const DEFAULT_PAGE_LIMIT: i64 = 30;
const MAX_PAGE_LIMIT: i64 = 200;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

#[derive(Deserialize)]
pub struct PaginationQuery {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

fn page_limit(limit: Option<i64>) -> Result<i64, AppError> {
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
        return Err(AppError::bad_request("limit must be between 1 and 200"));
    }
    Ok(limit)
}

fn parse_cursor(cursor: Option<String>) -> Result<Option<(OffsetDateTime, Uuid)>, AppError> {
    let Some(cursor) = cursor else {
        return Ok(None);
    };

    let (timestamp, id) = cursor
        .split_once('/')
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;

    let timestamp = OffsetDateTime::parse(timestamp, &Rfc3339)
        .map_err(|_| AppError::bad_request("invalid cursor"))?;
    let id = Uuid::parse_str(id).map_err(|_| AppError::bad_request("invalid cursor"))?;

    Ok(Some((timestamp, id)))
}

fn encode_cursor(cursor: Option<(OffsetDateTime, Uuid)>) -> Option<String> {
    let (timestamp, id) = cursor?;
    let timestamp = timestamp.format(&Rfc3339).ok()?;
    Some(format!("{}/{}", timestamp, id))
}

/// Turns a `limit + 1` fetch into a page. The extra row only signals that
/// another page exists.
fn into_page<T>(
    mut items: Vec<T>,
    limit: i64,
    key: impl Fn(&T) -> (OffsetDateTime, Uuid),
) -> ListResponse<T> {
    let limit = limit as usize;
    let has_more = items.len() > limit;
    items.truncate(limit);

    let next_cursor = if has_more {
        items.last().map(&key)
    } else {
        None
    };

    ListResponse {
        items,
        next_cursor: encode_cursor(next_cursor),
    }
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db = state.db.ping().await.is_ok();
    let redis = state.cache.ping().await.is_ok();
    let status = if db && redis { "ok" } else { "degraded" };

    Json(HealthResponse { status })
}

pub async fn create_report(
    actor: Actor,
    State(state): State<AppState>,
    Json(payload): Json<NewReport>,
) -> Result<(StatusCode, Json<Report>), AppError> {
    let report = state.reports().create_report(payload, actor.user_id).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

#[derive(Deserialize)]
pub struct ListReportsQuery {
    pub status: Option<ReportStatus>,
    pub category: Option<String>,
    pub municipality: Option<String>,
    pub created_by: Option<Uuid>,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

pub async fn list_reports(
    State(state): State<AppState>,
    Query(query): Query<ListReportsQuery>,
) -> Result<Json<ListResponse<Report>>, AppError> {
    let limit = page_limit(query.limit)?;
    let cursor = parse_cursor(query.cursor)?;
    let filter = ReportFilter {
        status: query.status,
        category: query.category,
        municipality: query.municipality,
        created_by: query.created_by,
    };

    let reports = state
        .reports()
        .list_reports(&filter, cursor, limit + 1)
        .await?;

    Ok(Json(into_page(reports, limit, |report| {
        (report.created_at, report.id)
    })))
}

#[derive(Deserialize)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lng: f64,
    pub radius_km: Option<f64>,
    pub limit: Option<i64>,
}

pub async fn list_nearby_reports(
    State(state): State<AppState>,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<Vec<NearbyReport>>, AppError> {
    let limit = page_limit(query.limit)?;
    let reports = state
        .reports()
        .list_nearby(query.lat, query.lng, query.radius_km.unwrap_or(5.0), limit)
        .await?;

    Ok(Json(reports))
}

#[derive(Deserialize)]
pub struct TrendingQuery {
    pub limit: Option<i64>,
    pub municipality: Option<String>,
}

pub async fn trending_reports(
    State(state): State<AppState>,
    Query(query): Query<TrendingQuery>,
) -> Result<Json<Vec<TrendingReport>>, AppError> {
    let reports = state
        .trending()
        .trending(query.limit, query.municipality.as_deref())
        .await?;

    Ok(Json(reports))
}

pub async fn get_report(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Report>, AppError> {
    state
        .reports()
        .get_report(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("report not found"))
}

pub async fn update_report(
    Path(id): Path<Uuid>,
    actor: Actor,
    State(state): State<AppState>,
    Json(payload): Json<Map<String, Value>>,
) -> Result<Json<Report>, AppError> {
    actor.require_privileged()?;

    let changes = ReportChanges::from_fields(&payload)?;
    state
        .reports()
        .update_report(id, changes, actor.user_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("report not found"))
}

pub async fn delete_report(
    Path(id): Path<Uuid>,
    actor: Actor,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    actor.require_admin()?;

    if state.reports().delete_report(id, actor.user_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("report not found"))
    }
}

pub async fn confirm_report(
    Path(id): Path<Uuid>,
    actor: Actor,
    State(state): State<AppState>,
) -> Result<Json<Report>, AppError> {
    let report = state.reports().confirm_report(id, actor.user_id).await?;
    Ok(Json(report))
}

pub async fn subscribe_report(
    Path(id): Path<Uuid>,
    actor: Actor,
    State(state): State<AppState>,
) -> Result<Json<Report>, AppError> {
    state
        .reports()
        .subscribe(id, actor.user_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("report not found"))
}

pub async fn unsubscribe_report(
    Path(id): Path<Uuid>,
    actor: Actor,
    State(state): State<AppState>,
) -> Result<Json<Report>, AppError> {
    state
        .reports()
        .unsubscribe(id, actor.user_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("report not found"))
}

pub async fn report_history(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Vec<ReportHistoryEntry>>, AppError> {
    state
        .reports()
        .report_history(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("report not found"))
}

#[derive(Deserialize)]
pub struct CommentRequest {
    pub body: String,
}

pub async fn add_comment(
    Path(id): Path<Uuid>,
    actor: Actor,
    State(state): State<AppState>,
    Json(payload): Json<CommentRequest>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    let comment = state
        .engagement()
        .add_comment(id, actor.user_id, payload.body)
        .await?;

    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn list_comments(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<ListResponse<Comment>>, AppError> {
    let limit = page_limit(query.limit)?;
    let cursor = parse_cursor(query.cursor)?;

    let comments = state
        .engagement()
        .list_comments(id, cursor, limit + 1)
        .await?
        .ok_or_else(|| AppError::not_found("report not found"))?;

    Ok(Json(into_page(comments, limit, |comment| {
        (comment.created_at, comment.id)
    })))
}

pub async fn delete_comment(
    Path((report_id, comment_id)): Path<(Uuid, Uuid)>,
    actor: Actor,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let deleted = state
        .engagement()
        .delete_comment(comment_id, report_id, actor.user_id)
        .await?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("comment not found"))
    }
}

#[derive(Deserialize)]
pub struct NotificationsQuery {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
    #[serde(default)]
    pub unread_only: bool,
}

pub async fn list_notifications(
    actor: Actor,
    State(state): State<AppState>,
    Query(query): Query<NotificationsQuery>,
) -> Result<Json<ListResponse<Notification>>, AppError> {
    let limit = page_limit(query.limit)?;
    let cursor = parse_cursor(query.cursor)?;

    let notifications = state
        .notifications()
        .list(actor.user_id, query.unread_only, cursor, limit + 1)
        .await?;

    Ok(Json(into_page(notifications, limit, |notification| {
        (notification.created_at, notification.id)
    })))
}

#[derive(Serialize)]
pub struct UnreadCountResponse {
    pub unread: i64,
}

pub async fn unread_notification_count(
    actor: Actor,
    State(state): State<AppState>,
) -> Result<Json<UnreadCountResponse>, AppError> {
    let unread = state.notifications().unread_count(actor.user_id).await?;
    Ok(Json(UnreadCountResponse { unread }))
}

pub async fn mark_notification_read(
    actor: Actor,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let updated = state.notifications().mark_read(id, actor.user_id).await?;
    read_state_response(updated)
}

pub async fn mark_notification_unread(
    actor: Actor,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let updated = state.notifications().mark_unread(id, actor.user_id).await?;
    read_state_response(updated)
}

fn read_state_response(updated: bool) -> Result<StatusCode, AppError> {
    if updated {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("notification not found"))
    }
}

#[derive(Serialize)]
pub struct AffectedResponse {
    pub affected: u64,
}

pub async fn mark_all_notifications_read(
    actor: Actor,
    State(state): State<AppState>,
) -> Result<Json<AffectedResponse>, AppError> {
    let affected = state.notifications().mark_all_read(actor.user_id).await?;
    Ok(Json(AffectedResponse { affected }))
}

pub async fn delete_notification(
    actor: Actor,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    if state.notifications().delete(id, actor.user_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("notification not found"))
    }
}

pub async fn clear_notifications(
    actor: Actor,
    State(state): State<AppState>,
) -> Result<Json<AffectedResponse>, AppError> {
    let affected = state.notifications().clear_all(actor.user_id).await?;
    Ok(Json(AffectedResponse { affected }))
}

pub async fn gamification_profile(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<GamificationProfile>, AppError> {
    state
        .users()
        .gamification_profile(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("user not found"))
}

#[derive(Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<i64>,
}

pub async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Vec<LeaderboardEntry>>, AppError> {
    let entries = state
        .users()
        .leaderboard(query.limit.unwrap_or(10))
        .await?;

    Ok(Json(entries))
}

pub async fn gamification_catalog(State(state): State<AppState>) -> Json<GamificationSnapshot> {
    Json(state.catalog.snapshot().as_ref().clone())
}

#[derive(Serialize)]
pub struct EvaluateResponse {
    pub user_id: Uuid,
    pub awarded: Vec<String>,
}

pub async fn evaluate_user_badges(
    _admin: AdminToken,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Json<EvaluateResponse> {
    let awarded = state.badges().evaluate(id).await;
    Json(EvaluateResponse {
        user_id: id,
        awarded,
    })
}

pub async fn reevaluate_badges(
    _admin: AdminToken,
    State(state): State<AppState>,
) -> Result<Json<BatchSummary>, AppError> {
    let summary = state.badges().reevaluate_all().await?;
    Ok(Json(summary))
}

#[derive(Deserialize)]
pub struct BroadcastRequest {
    pub user_ids: Vec<Uuid>,
    #[serde(default)]
    pub notification_type: Option<String>,
    pub title_en: String,
    pub title_ar: String,
    pub body_en: String,
    pub body_ar: String,
    #[serde(default)]
    pub report_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct BroadcastResponse {
    pub created: usize,
}

/// Sends one notification per listed user. The batch is all or nothing.
pub async fn broadcast_notification(
    _admin: AdminToken,
    State(state): State<AppState>,
    Json(payload): Json<BroadcastRequest>,
) -> Result<Json<BroadcastResponse>, AppError> {
    if payload.user_ids.is_empty() {
        return Err(AppError::bad_request("user_ids must not be empty"));
    }
    if [&payload.title_en, &payload.title_ar, &payload.body_en, &payload.body_ar]
        .iter()
        .any(|text| text.trim().is_empty())
    {
        return Err(AppError::bad_request("titles and bodies are required in both languages"));
    }

    let notification = NotificationPayload {
        notification_type: payload
            .notification_type
            .unwrap_or_else(|| ANNOUNCEMENT.to_string()),
        title_en: payload.title_en,
        title_ar: payload.title_ar,
        body_en: payload.body_en,
        body_ar: payload.body_ar,
        report_id: payload.report_id,
    };

    let created = state
        .notifications()
        .create_for_users(&payload.user_ids, &notification)
        .await?;

    Ok(Json(BroadcastResponse {
        created: created.len(),
    }))
}

#[derive(Serialize)]
pub struct ReloadResponse {
    pub badges: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub loaded_at: OffsetDateTime,
    pub announced: bool,
}

/// Reloads the catalog here and asks every other instance to do the same.
pub async fn reload_gamification(
    _admin: AdminToken,
    State(state): State<AppState>,
) -> Result<Json<ReloadResponse>, AppError> {
    let snapshot = state.catalog.reload().await?;

    let announced = match state.cache.publish(RELOAD_CHANNEL, "reload").await {
        Ok(_) => true,
        Err(err) => {
            tracing::warn!(error = ?err, channel = RELOAD_CHANNEL, "failed to announce catalog reload");
            false
        }
    };

    Ok(Json(ReloadResponse {
        badges: snapshot.active_badges().len(),
        loaded_at: snapshot.loaded_at(),
        announced,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_round_trips() {
        let at = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let id = Uuid::new_v4();
        let encoded = encode_cursor(Some((at, id)));
        assert_eq!(parse_cursor(encoded).unwrap(), Some((at, id)));
        assert!(parse_cursor(Some("garbage".into())).is_err());
    }

    #[test]
    fn extra_row_becomes_next_cursor() {
        let at = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();

        let page = into_page(ids.clone(), 2, |id| (at, *id));
        assert_eq!(page.items, ids[..2].to_vec());
        assert_eq!(page.next_cursor, encode_cursor(Some((at, ids[1]))));

        let last = into_page(ids.clone(), 3, |id| (at, *id));
        assert!(last.next_cursor.is_none());
    }
}
