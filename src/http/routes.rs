use axum::{routing::delete, routing::get, routing::post, Router};

use crate::http::handlers;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn reports() -> Router<AppState> {
    Router::new()
        .route(
            "/reports",
            post(handlers::create_report).get(handlers::list_reports),
        )
        .route("/reports/nearby", get(handlers::list_nearby_reports))
        .route("/reports/trending", get(handlers::trending_reports))
        .route(
            "/reports/:id",
            get(handlers::get_report)
                .patch(handlers::update_report)
                .delete(handlers::delete_report),
        )
        .route("/reports/:id/confirm", post(handlers::confirm_report))
        .route(
            "/reports/:id/subscription",
            post(handlers::subscribe_report).delete(handlers::unsubscribe_report),
        )
        .route("/reports/:id/history", get(handlers::report_history))
}

pub fn comments() -> Router<AppState> {
    Router::new()
        .route(
            "/reports/:id/comments",
            post(handlers::add_comment).get(handlers::list_comments),
        )
        .route(
            "/reports/:id/comments/:comment_id",
            delete(handlers::delete_comment),
        )
}

pub fn notifications() -> Router<AppState> {
    Router::new()
        .route(
            "/notifications",
            get(handlers::list_notifications).delete(handlers::clear_notifications),
        )
        .route(
            "/notifications/unread-count",
            get(handlers::unread_notification_count),
        )
        .route(
            "/notifications/read-all",
            post(handlers::mark_all_notifications_read),
        )
        .route(
            "/notifications/:id/read",
            post(handlers::mark_notification_read),
        )
        .route(
            "/notifications/:id/unread",
            post(handlers::mark_notification_unread),
        )
        .route("/notifications/:id", delete(handlers::delete_notification))
}

pub fn gamification() -> Router<AppState> {
    Router::new()
        .route(
            "/users/:id/gamification",
            get(handlers::gamification_profile),
        )
        .route("/leaderboard", get(handlers::leaderboard))
        .route("/gamification/catalog", get(handlers::gamification_catalog))
}

pub fn admin() -> Router<AppState> {
    Router::new()
        .route(
            "/admin/users/:id/badges/evaluate",
            post(handlers::evaluate_user_badges),
        )
        .route("/admin/badges/reevaluate", post(handlers::reevaluate_badges))
        .route(
            "/admin/notifications/broadcast",
            post(handlers::broadcast_notification),
        )
        .route(
            "/admin/gamification/reload",
            post(handlers::reload_gamification),
        )
}
