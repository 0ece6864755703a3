use crate::pipeline::{Pipeline, Trigger};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Spawn background scraping. With `run_on_start` the first run begins
/// immediately; with no interval at most that single run happens. Returns
/// `None` when there is nothing to schedule.
pub fn spawn_scheduler(
    pipeline: Arc<Pipeline>,
    interval: Option<Duration>,
    run_on_start: bool,
) -> Option<JoinHandle<()>> {
    if interval.is_none() && !run_on_start {
        info!("Scheduled scraping disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        if run_on_start {
            run_once(&pipeline).await;
        }
        let Some(interval) = interval else {
            return;
        };
        info!("Scraping every {:?}", interval);

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            run_once(&pipeline).await;
        }
    }))
}

async fn run_once(pipeline: &Pipeline) {
    info!("Starting scheduled scrape");
    match pipeline.run(Trigger::Scheduled).await {
        Ok(report) => info!(
            "Scheduled scrape finished: {} merged, {} inserted, {} updated, {} failed",
            report.merged, report.counts.inserted, report.counts.updated, report.counts.failed
        ),
        Err(e) => error!("Scheduled scrape failed: {}", e),
    }
}
