//! Service Tests
//!
//! Standalone engine entry points that the HTTP surface does not call
//! directly.

#[macro_use]
mod common;

use civic::domain::gamification::PointsAction;
use civic::domain::notification::NotificationPayload;
use uuid::Uuid;

#[tokio::test]
async fn standalone_award_absorbs_missing_user() {
    let app = require_app!();
    let ledger = app.state.ledger();

    assert_eq!(ledger.award(Uuid::new_v4(), PointsAction::SubmitReport).await, 0);
}

#[tokio::test]
async fn standalone_award_applies_rule() {
    let app = require_app!();
    let citizen = app.create_citizen().await;
    let ledger = app.state.ledger();

    assert_eq!(ledger.award(citizen.id, PointsAction::Comment).await, 2);
    assert_eq!(ledger.award(citizen.id, PointsAction::EarnBadge).await, 0);

    let (points, _, _, _) = app.user_row(citizen.id).await;
    assert_eq!(points, 2);
}

#[tokio::test]
async fn standalone_evaluate_of_missing_user_is_empty() {
    let app = require_app!();

    assert!(app.state.badges().evaluate(Uuid::new_v4()).await.is_empty());
}

#[tokio::test]
async fn batch_counts_failures_separately() {
    let app = require_app!();
    let citizen = app.create_citizen().await;
    sqlx::query("UPDATE users SET reports_count = 1 WHERE id = $1")
        .bind(citizen.id)
        .execute(app.pool())
        .await
        .unwrap();

    let summary = app
        .state
        .badges()
        .batch_evaluate(vec![citizen.id, Uuid::new_v4()])
        .await;

    assert_eq!(summary.total, 2);
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.new_badges_awarded, 1);
}

#[tokio::test]
async fn single_notification_is_unread() {
    let app = require_app!();
    let citizen = app.create_citizen().await;
    let service = app.state.notifications();

    let payload = NotificationPayload {
        report_id: None,
        ..NotificationPayload::new_comment(Uuid::nil())
    };

    let created = service.create_for_user(citizen.id, &payload).await.unwrap();

    assert_eq!(created.user_id, citizen.id);
    assert!(!created.is_read);
    assert_eq!(service.unread_count(citizen.id).await.unwrap(), 1);
}
