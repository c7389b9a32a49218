use std::collections::HashSet;

use futures::StreamExt;
use sqlx::{PgConnection, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::catalog::GamificationCatalog;
use crate::app::points::PointsLedger;
use crate::domain::gamification::{BadgeProgress, BatchSummary, PointsAction, ResolvedBadge};
use crate::error::{EngineError, Result};
use crate::infra::db::Db;

#[derive(Clone)]
pub struct BadgeEvaluator {
    db: Db,
    catalog: GamificationCatalog,
    ledger: PointsLedger,
    concurrency: usize,
}

impl BadgeEvaluator {
    pub fn new(db: Db, catalog: GamificationCatalog, ledger: PointsLedger, concurrency: usize) -> Self {
        Self {
            db,
            catalog,
            ledger,
            concurrency: concurrency.max(1),
        }
    }

    /// Awards every badge the user now qualifies for, inside the caller's
    /// unit of work. Returns the ids awarded by this call.
    ///
    /// The user row is locked for the rest of the caller's transaction so
    /// concurrent evaluations for the same user serialize. Errors are
    /// returned so the caller decides whether to roll back.
    pub async fn evaluate_in(&self, conn: &mut PgConnection, user_id: Uuid) -> Result<Vec<String>> {
        let row = sqlx::query(
            "SELECT points, reports_count, reports_confirmed, achievements \
             FROM users \
             WHERE id = $1 \
             FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(EngineError::NotFound("user"))?;

        let achievements: Vec<String> = row.get("achievements");
        let held: HashSet<String> = achievements.into_iter().collect();
        let mut progress = BadgeProgress {
            points: row.get("points"),
            reports_count: row.get("reports_count"),
            reports_confirmed: row.get("reports_confirmed"),
            ..Default::default()
        };

        let category_rows = sqlx::query(
            "SELECT category, COUNT(*) AS reports \
             FROM reports \
             WHERE created_by = $1 \
             GROUP BY category",
        )
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;

        for row in category_rows {
            progress
                .category_counts
                .insert(row.get("category"), row.get("reports"));
        }

        let snapshot = self.catalog.snapshot();
        let bonus = i64::from(snapshot.points_for(PointsAction::EarnBadge));
        let awarded = select_new_badges(snapshot.active_badges(), &held, &mut progress, bonus);
        if awarded.is_empty() {
            return Ok(awarded);
        }

        sqlx::query(
            "UPDATE users \
             SET achievements = achievements || ARRAY( \
                 SELECT badge FROM unnest($2::text[]) AS badge \
                 WHERE NOT (badge = ANY(achievements)) \
             ) \
             WHERE id = $1",
        )
        .bind(user_id)
        .bind(awarded.as_slice())
        .execute(&mut *conn)
        .await?;

        for _ in &awarded {
            self.ledger
                .award_in(&mut *conn, user_id, PointsAction::EarnBadge)
                .await?;
        }

        info!(user_id = %user_id, badges = ?awarded, "badges awarded");
        Ok(awarded)
    }

    /// Pays the points for `action`, then evaluates badges, in the caller's
    /// unit of work.
    pub async fn reward_in(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
        action: PointsAction,
    ) -> Result<(i32, Vec<String>)> {
        let points = self.ledger.award_in(&mut *conn, user_id, action).await?;
        let badges = self.evaluate_in(&mut *conn, user_id).await?;
        Ok((points, badges))
    }

    /// Standalone evaluation in its own transaction. Failures are logged and
    /// yield an empty list.
    pub async fn evaluate(&self, user_id: Uuid) -> Vec<String> {
        match self.evaluate_owned(user_id).await {
            Ok(awarded) => awarded,
            Err(err) => {
                warn!(error = ?err, user_id = %user_id, "failed to evaluate badges");
                Vec::new()
            }
        }
    }

    pub async fn batch_evaluate(&self, user_ids: Vec<Uuid>) -> BatchSummary {
        let total = user_ids.len();
        let outcomes: Vec<(Uuid, Result<Vec<String>>)> = futures::stream::iter(user_ids)
            .map(move |user_id| async move { (user_id, self.evaluate_owned(user_id).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut summary = BatchSummary {
            total,
            ..Default::default()
        };
        for (user_id, outcome) in outcomes {
            match outcome {
                Ok(awarded) => {
                    summary.processed += 1;
                    summary.new_badges_awarded += awarded.len();
                }
                Err(err) => {
                    summary.failed += 1;
                    warn!(error = ?err, user_id = %user_id, "badge evaluation failed");
                }
            }
        }

        summary
    }

    /// Re-evaluates every citizen. Safe to run at any time.
    pub async fn reevaluate_all(&self) -> Result<BatchSummary> {
        let user_ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM users WHERE role = 'citizen' ORDER BY created_at, id",
        )
        .fetch_all(self.db.pool())
        .await?;

        let summary = self.batch_evaluate(user_ids).await;
        info!(
            total = summary.total,
            processed = summary.processed,
            failed = summary.failed,
            new_badges_awarded = summary.new_badges_awarded,
            "badge re-evaluation finished"
        );
        Ok(summary)
    }

    async fn evaluate_owned(&self, user_id: Uuid) -> Result<Vec<String>> {
        let _watch = self.db.watch("badges.evaluate");
        let mut tx = self.db.pool().begin().await?;
        let awarded = self.evaluate_in(&mut tx, user_id).await?;
        tx.commit().await?;
        Ok(awarded)
    }
}

/// Picks the badges not yet held that `progress` satisfies.
///
/// Each badge earned adds `bonus_per_badge` to the in-memory points total and
/// selection repeats until nothing new qualifies, so points badges reached
/// through that bonus land in the same pass.
fn select_new_badges(
    badges: &[ResolvedBadge],
    held: &HashSet<String>,
    progress: &mut BadgeProgress,
    bonus_per_badge: i64,
) -> Vec<String> {
    let mut held = held.clone();
    let mut awarded = Vec::new();

    loop {
        let newly: Vec<&ResolvedBadge> = badges
            .iter()
            .filter(|badge| !held.contains(badge.id()) && badge.is_satisfied_by(progress))
            .collect();
        if newly.is_empty() {
            break;
        }

        for badge in newly {
            held.insert(badge.id().to_string());
            awarded.push(badge.id().to_string());
            progress.points += bonus_per_badge;
        }
    }

    awarded
}
