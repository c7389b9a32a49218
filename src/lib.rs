pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod http;
pub mod infra;
pub mod jobs;

use crate::app::badges::BadgeEvaluator;
use crate::app::catalog::GamificationCatalog;
use crate::app::engagement::EngagementService;
use crate::app::notifications::NotificationService;
use crate::app::points::PointsLedger;
use crate::app::reports::ReportService;
use crate::app::trending::TrendingService;
use crate::app::users::UserService;
use crate::config::AppConfig;
use crate::infra::{cache::RedisCache, db::Db};

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub cache: RedisCache,
    pub catalog: GamificationCatalog,
    pub admin_token: Option<String>,
    pub badge_batch_concurrency: usize,
}

impl AppState {
    /// Connects to the store and cache and loads the gamification catalog.
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let db = Db::connect(config).await?;
        let cache = RedisCache::connect(&config.redis_url).await?;
        let catalog = GamificationCatalog::load(db.clone()).await?;

        Ok(Self {
            db,
            cache,
            catalog,
            admin_token: config.admin_token.clone(),
            badge_batch_concurrency: config.badge_batch_concurrency,
        })
    }

    pub fn ledger(&self) -> PointsLedger {
        PointsLedger::new(self.db.clone(), self.catalog.clone())
    }

    pub fn badges(&self) -> BadgeEvaluator {
        BadgeEvaluator::new(
            self.db.clone(),
            self.catalog.clone(),
            self.ledger(),
            self.badge_batch_concurrency,
        )
    }

    pub fn reports(&self) -> ReportService {
        ReportService::new(self.db.clone(), self.badges())
    }

    pub fn engagement(&self) -> EngagementService {
        EngagementService::new(self.db.clone(), self.badges())
    }

    pub fn notifications(&self) -> NotificationService {
        NotificationService::new(self.db.clone())
    }

    pub fn trending(&self) -> TrendingService {
        TrendingService::new(self.db.clone())
    }

    pub fn users(&self) -> UserService {
        UserService::new(self.db.clone())
    }
}
