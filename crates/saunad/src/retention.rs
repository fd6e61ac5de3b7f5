//! Retention pruning
//!
//! Runs once at startup and then every `prune_interval`.

use sauna_common::store::SampleStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// Prune once, logging the outcome. Returns the number of samples removed.
pub fn prune_once(store: &SampleStore, retention_days: u32) -> Option<usize> {
    match store.prune(retention_days) {
        Ok(removed) => {
            info!("[PRUNE] Removed {} samples older than {} days", removed, retention_days);
            Some(removed)
        }
        Err(e) => {
            error!("[PRUNE] Retention pruning failed: {}", e);
            None
        }
    }
}

pub async fn run_retention(
    store: Arc<SampleStore>,
    retention_days: u32,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    // first tick completes immediately
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                prune_once(&store, retention_days);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use sauna_common::sample::local_now;

    #[tokio::test]
    async fn test_prunes_at_startup_and_stops_on_shutdown() {
        let store = Arc::new(SampleStore::open_in_memory().unwrap());
        let now = local_now();
        store.store(now - ChronoDuration::days(12), Some(20.0), None).unwrap();
        store.store(now - ChronoDuration::hours(1), Some(20.0), None).unwrap();

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(run_retention(store.clone(), 10, Duration::from_secs(3600), rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.count().unwrap(), 1);

        tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
