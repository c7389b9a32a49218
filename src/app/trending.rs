use sqlx::Row;

use crate::app::reports::{report_from_row, REPORT_COLUMNS};
use crate::domain::report::TrendingReport;
use crate::error::Result;
use crate::infra::db::Db;

pub const DEFAULT_TRENDING_LIMIT: i64 = 20;
pub const MAX_TRENDING_LIMIT: i64 = 100;

/// Ranks unresolved reports by engagement. Read-only; the score is computed
/// at query time.
#[derive(Clone)]
pub struct TrendingService {
    db: Db,
}

impl TrendingService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// `confirmations * 3 + distinct comments * 2 + 1 / max(age in days, 1)`,
    /// highest first, ties broken by newest then id.
    pub async fn trending(
        &self,
        limit: Option<i64>,
        municipality: Option<&str>,
    ) -> Result<Vec<TrendingReport>> {
        let limit = clamp_limit(limit);

        let rows = sqlx::query(&format!(
            "SELECT {columns}, comments_count, trending_score FROM ( \
                 SELECT r.*, \
                        COUNT(DISTINCT c.id) AS comments_count, \
                        (r.confirmations_count * 3 \
                          + COUNT(DISTINCT c.id) * 2 \
                          + 1.0 / GREATEST( \
                                EXTRACT(EPOCH FROM (now() - r.created_at)) / 86400.0, \
                                1.0 \
                            ))::float8 AS trending_score \
                 FROM reports r \
                 LEFT JOIN comments c ON c.report_id = r.id \
                 WHERE r.status <> 'resolved' \
                   AND ($1::text IS NULL OR r.municipality = $1) \
                 GROUP BY r.id \
             ) ranked \
             ORDER BY trending_score DESC, created_at DESC, id DESC \
             LIMIT $2",
            columns = REPORT_COLUMNS
        ))
        .bind(municipality)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        let mut reports = Vec::with_capacity(rows.len());
        for row in rows {
            reports.push(TrendingReport {
                report: report_from_row(&row)?,
                comments_count: row.get("comments_count"),
                trending_score: row.get("trending_score"),
            });
        }

        Ok(reports)
    }
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(DEFAULT_TRENDING_LIMIT)
        .clamp(1, MAX_TRENDING_LIMIT)
}
