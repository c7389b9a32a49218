//! Gamification Tests
//!
//! Covers points, badge awarding, re-evaluation and the catalog endpoints.

#[macro_use]
mod common;

use axum::http::StatusCode;
use common::unique_municipality;
use serde_json::json;

#[tokio::test]
async fn ten_confirmations_earn_trusted_verifier() {
    let app = require_app!();
    let confirmer = app.create_citizen().await;
    let municipality = unique_municipality();

    for _ in 0..10 {
        let creator = app.create_citizen().await;
        let report_id = app.create_report(&creator, "lighting", &municipality).await;
        let resp = app
            .post_json(&format!("/v1/reports/{}/confirm", report_id), json!({}), Some(&confirmer))
            .await;
        assert_eq!(resp.status, StatusCode::OK);
    }

    let (points, _, reports_confirmed, achievements) = app.user_row(confirmer.id).await;
    assert_eq!(reports_confirmed, 10);
    assert_eq!(points, 50);
    assert_eq!(
        achievements,
        vec!["first_confirmation".to_string(), "trusted_verifier".to_string()]
    );

    let profile = app
        .get(&format!("/v1/users/{}/gamification", confirmer.id), None)
        .await;
    assert_eq!(profile.status, StatusCode::OK);
    assert_eq!(profile.json()["points"], 50);
}

#[tokio::test]
async fn category_and_variety_badges_follow_report_mix() {
    let app = require_app!();
    let citizen = app.create_citizen().await;
    let municipality = unique_municipality();

    for category in ["roads", "roads", "roads", "roads", "roads", "waste", "parks"] {
        app.create_report(&citizen, category, &municipality).await;
    }

    let (points, reports_count, _, achievements) = app.user_row(citizen.id).await;
    assert_eq!(reports_count, 7);
    assert_eq!(points, 70);
    assert!(achievements.contains(&"first_report".to_string()));
    assert!(achievements.contains(&"road_guardian".to_string()));
    assert!(achievements.contains(&"explorer".to_string()));
    assert!(!achievements.contains(&"active_reporter".to_string()));
}

#[tokio::test]
async fn comments_pay_points() {
    let app = require_app!();
    let creator = app.create_citizen().await;
    let commenter = app.create_citizen().await;
    let report_id = app.create_report(&creator, "parks", &unique_municipality()).await;

    let resp = app
        .post_json(
            &format!("/v1/reports/{}/comments", report_id),
            json!({ "body": "Still broken today" }),
            Some(&commenter),
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);

    let (points, _, _, _) = app.user_row(commenter.id).await;
    assert_eq!(points, 2);
    assert_eq!(app.notifications_for(creator.id, report_id).await, 1);
    assert_eq!(app.notifications_for(commenter.id, report_id).await, 0);
}

#[tokio::test]
async fn reevaluation_is_idempotent() {
    let app = require_app!();
    let citizen = app.create_citizen().await;

    // Counters raised behind the engine's back leave badges to a sweep.
    sqlx::query("UPDATE users SET reports_confirmed = 10, points = 120 WHERE id = $1")
        .bind(citizen.id)
        .execute(app.pool())
        .await
        .unwrap();

    let path = format!("/v1/admin/users/{}/badges/evaluate", citizen.id);
    let first = app.post_admin(&path, json!({}), Some(app.admin_token())).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(
        first.json()["awarded"],
        json!(["first_confirmation", "trusted_verifier", "centurion"])
    );

    let second = app.post_admin(&path, json!({}), Some(app.admin_token())).await;
    assert_eq!(second.json()["awarded"], json!([]));

    let sweep = app
        .post_admin("/v1/admin/badges/reevaluate", json!({}), Some(app.admin_token()))
        .await;
    assert_eq!(sweep.status, StatusCode::OK);
    assert_eq!(sweep.json()["failed"], 0);

    let (points, _, _, achievements) = app.user_row(citizen.id).await;
    assert_eq!(points, 120);
    assert_eq!(achievements.len(), 3);
}

#[tokio::test]
async fn operator_routes_require_admin_token() {
    let app = require_app!();

    let missing = app
        .post_admin("/v1/admin/badges/reevaluate", json!({}), None)
        .await;
    assert_eq!(missing.status, StatusCode::FORBIDDEN);

    let wrong = app
        .post_admin("/v1/admin/gamification/reload", json!({}), Some("nope"))
        .await;
    assert_eq!(wrong.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn reload_returns_active_catalog() {
    let app = require_app!();

    let resp = app
        .post_admin("/v1/admin/gamification/reload", json!({}), Some(app.admin_token()))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["badges"], 7);

    let catalog = app.get("/v1/gamification/catalog", None).await.json();
    assert_eq!(catalog["badges"][0]["id"], "first_confirmation");
}

#[tokio::test]
async fn leaderboard_excludes_staff() {
    let app = require_app!();
    let staff = app.create_staff().await;
    sqlx::query("UPDATE users SET points = 1000000 WHERE id = $1")
        .bind(staff.id)
        .execute(app.pool())
        .await
        .unwrap();

    let board = app.get("/v1/leaderboard?limit=100", None).await.json();
    let listed = board
        .as_array()
        .unwrap()
        .iter()
        .any(|entry| entry["id"] == staff.id.to_string());
    assert!(!listed);
}
