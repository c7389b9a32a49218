use anyhow::Result;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::app::badges::BadgeEvaluator;

/// Re-evaluates every citizen's badges on a fixed interval. Runs until the
/// task is cancelled.
pub async fn run(evaluator: BadgeEvaluator, interval_seconds: u64) -> Result<()> {
    let period = Duration::from_secs(interval_seconds.max(1));
    info!(interval_seconds = period.as_secs(), "badge re-evaluation started");

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if let Err(err) = evaluator.reevaluate_all().await {
            error!(error = ?err, "badge re-evaluation sweep failed");
        }
    }
}
