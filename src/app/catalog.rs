use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use futures::StreamExt;
use serde::Serialize;
use sqlx::Row;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::domain::gamification::{BadgeDefinition, PointsAction, PointsRule, ResolvedBadge};
use crate::error::Result;
use crate::infra::{cache::RedisCache, db::Db};

/// Redis channel instances listen on to pick up catalog changes.
pub const RELOAD_CHANNEL: &str = "gamification:reload";

/// Read-only view of the points rules and active badges.
#[derive(Debug, Clone, Serialize)]
pub struct GamificationSnapshot {
    rules: HashMap<String, PointsRule>,
    badges: Vec<ResolvedBadge>,
    #[serde(with = "time::serde::rfc3339")]
    loaded_at: OffsetDateTime,
}

impl GamificationSnapshot {
    pub fn new(rules: Vec<PointsRule>, badges: Vec<BadgeDefinition>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| (rule.action.clone(), rule))
            .collect();

        let mut badges: Vec<ResolvedBadge> = badges
            .into_iter()
            .filter(|badge| badge.is_active)
            .filter_map(|badge| {
                let (id, requirement_type) = (badge.id.clone(), badge.requirement_type.clone());
                let resolved = ResolvedBadge::resolve(badge);
                if resolved.is_none() {
                    warn!(
                        badge_id = %id,
                        requirement_type = %requirement_type,
                        "badge has an unknown requirement type and can never be earned"
                    );
                }
                resolved
            })
            .collect();
        badges.sort_by(|a, b| {
            a.definition
                .requirement_value
                .cmp(&b.definition.requirement_value)
                .then_with(|| a.id().cmp(b.id()))
        });

        Self {
            rules,
            badges,
            loaded_at: OffsetDateTime::now_utc(),
        }
    }

    /// Points paid for `action`; zero when no active rule exists.
    pub fn points_for(&self, action: PointsAction) -> i32 {
        match self.rules.get(action.as_str()) {
            Some(rule) if rule.is_active => rule.points.max(0),
            _ => 0,
        }
    }

    /// Active badges, smallest threshold first.
    pub fn active_badges(&self) -> &[ResolvedBadge] {
        &self.badges
    }

    pub fn loaded_at(&self) -> OffsetDateTime {
        self.loaded_at
    }
}

#[derive(Clone)]
pub struct GamificationCatalog {
    db: Db,
    current: Arc<ArcSwap<GamificationSnapshot>>,
}

impl GamificationCatalog {
    pub async fn load(db: Db) -> Result<Self> {
        let snapshot = fetch_snapshot(&db).await?;
        Ok(Self {
            db,
            current: Arc::new(ArcSwap::from_pointee(snapshot)),
        })
    }

    pub fn snapshot(&self) -> Arc<GamificationSnapshot> {
        self.current.load_full()
    }

    pub async fn reload(&self) -> Result<Arc<GamificationSnapshot>> {
        let snapshot = Arc::new(fetch_snapshot(&self.db).await?);
        self.current.store(snapshot.clone());
        info!(
            rules = snapshot.rules.len(),
            badges = snapshot.badges.len(),
            "gamification catalog reloaded"
        );
        Ok(snapshot)
    }

    /// Reloads whenever another instance announces a catalog change.
    pub async fn listen_for_reloads(&self, cache: RedisCache) -> anyhow::Result<()> {
        let mut pubsub = cache.client().get_async_pubsub().await?;
        pubsub.subscribe(RELOAD_CHANNEL).await?;
        info!(channel = RELOAD_CHANNEL, "listening for catalog reloads");

        let mut messages = pubsub.on_message();
        while messages.next().await.is_some() {
            if let Err(err) = self.reload().await {
                warn!(error = ?err, "failed to reload gamification catalog");
            }
        }

        Ok(())
    }
}

async fn fetch_snapshot(db: &Db) -> Result<GamificationSnapshot> {
    let rule_rows = sqlx::query(
        "SELECT action, points, description, is_active \
         FROM points_rules",
    )
    .fetch_all(db.pool())
    .await?;

    let rules = rule_rows
        .into_iter()
        .map(|row| PointsRule {
            action: row.get("action"),
            points: row.get("points"),
            description: row.get("description"),
            is_active: row.get("is_active"),
        })
        .collect();

    let badge_rows = sqlx::query(
        "SELECT id, name_en, name_ar, description_en, description_ar, \
                requirement_type, requirement_value, category, is_active \
         FROM badge_definitions \
         WHERE is_active \
         ORDER BY requirement_value ASC, id ASC",
    )
    .fetch_all(db.pool())
    .await?;

    let badges = badge_rows
        .into_iter()
        .map(|row| BadgeDefinition {
            id: row.get("id"),
            name_en: row.get("name_en"),
            name_ar: row.get("name_ar"),
            description_en: row.get("description_en"),
            description_ar: row.get("description_ar"),
            requirement_type: row.get("requirement_type"),
            requirement_value: row.get("requirement_value"),
            category: row.get("category"),
            is_active: row.get("is_active"),
        })
        .collect();

    Ok(GamificationSnapshot::new(rules, badges))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(action: &str, points: i32, is_active: bool) -> PointsRule {
        PointsRule {
            action: action.into(),
            points,
            description: String::new(),
            is_active,
        }
    }

    fn badge(id: &str, value: i32, is_active: bool) -> BadgeDefinition {
        BadgeDefinition {
            id: id.into(),
            name_en: id.into(),
            name_ar: id.into(),
            description_en: String::new(),
            description_ar: String::new(),
            requirement_type: "report_count".into(),
            requirement_value: value,
            category: None,
            is_active,
        }
    }

    #[test]
    fn missing_or_inactive_rules_pay_nothing() {
        let snapshot = GamificationSnapshot::new(
            vec![rule("submit_report", 10, true), rule("comment", 2, false)],
            Vec::new(),
        );
        assert_eq!(snapshot.points_for(PointsAction::SubmitReport), 10);
        assert_eq!(snapshot.points_for(PointsAction::Comment), 0);
        assert_eq!(snapshot.points_for(PointsAction::ConfirmReport), 0);
    }

    #[test]
    fn badges_are_ordered_by_threshold_and_filtered() {
        let snapshot = GamificationSnapshot::new(
            Vec::new(),
            vec![
                badge("ten", 10, true),
                badge("retired", 1, false),
                badge("one", 1, true),
                badge("five", 5, true),
            ],
        );
        let ids: Vec<_> = snapshot
            .active_badges()
            .iter()
            .map(|badge| badge.id())
            .collect();
        assert_eq!(ids, vec!["one", "five", "ten"]);
    }

    #[test]
    fn unknown_requirement_types_are_left_out() {
        let mut retired = badge("streak", 3, true);
        retired.requirement_type = "streak_days".into();
        let snapshot = GamificationSnapshot::new(Vec::new(), vec![retired, badge("one", 1, true)]);

        let ids: Vec<_> = snapshot.active_badges().iter().map(|badge| badge.id()).collect();
        assert_eq!(ids, vec!["one"]);
    }
}
