//! Store writer and startup backfill

use chrono::Duration;
use sauna_common::error::ImportError;
use sauna_common::reading::{import_file, ImportReport};
use sauna_common::sample::{format_timestamp, Sample};
use sauna_common::store::SampleStore;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriterStats {
    pub stored: u64,
    pub failed: u64,
}

/// Drain the acquisition channel into the store.
///
/// Returns once every sender is dropped and the channel is empty, so
/// in-flight samples are written before shutdown completes. Writes run on
/// the blocking pool.
pub async fn run_writer(store: Arc<SampleStore>, mut rx: mpsc::Receiver<Sample>) -> WriterStats {
    let mut stats = WriterStats::default();

    while let Some(sample) = rx.recv().await {
        let writer_store = Arc::clone(&store);
        let written = tokio::task::spawn_blocking(move || writer_store.store_sample(&sample)).await;

        match written {
            Ok(Ok(())) => {
                stats.stored += 1;
                debug!(
                    "[INGEST] Stored {} temp={:?} humidity={:?}",
                    format_timestamp(sample.timestamp),
                    sample.temperature,
                    sample.humidity
                );
            }
            Ok(Err(e)) => {
                stats.failed += 1;
                error!(
                    "[INGEST] Failed to store sample at {}: {}",
                    format_timestamp(sample.timestamp),
                    e
                );
            }
            Err(e) => {
                stats.failed += 1;
                error!("[INGEST] Store task failed at {}: {}", format_timestamp(sample.timestamp), e);
            }
        }
    }

    info!("[INGEST] Writer drained: {} stored, {} failed", stats.stored, stats.failed);
    stats
}

/// Import the history export when the store has nothing recent.
///
/// Returns `Ok(None)` when no import was needed or none is configured.
pub fn backfill_if_stale(
    store: &SampleStore,
    freshness: Duration,
    backfill_path: Option<&Path>,
    mac_filter: Option<&str>,
) -> Result<Option<ImportReport>, ImportError> {
    if store.is_fresh(freshness)? {
        info!("[INGEST] Store has data from the last {} h, no backfill needed", freshness.num_hours());
        return Ok(None);
    }

    let Some(path) = backfill_path else {
        warn!("[INGEST] Store is stale and no backfill_path is configured");
        return Ok(None);
    };

    info!("[INGEST] Store is stale, importing history from {}", path.display());
    let report = import_file(store, path, mac_filter)?;
    info!(
        "[INGEST] Backfill complete: {} stored, {} skipped, {} malformed",
        report.stored, report.skipped, report.malformed
    );
    Ok(Some(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sauna_common::sample::local_now;

    #[tokio::test]
    async fn test_writer_drains_after_senders_drop() {
        let store = Arc::new(SampleStore::open_in_memory().unwrap());
        let (tx, rx) = mpsc::channel(4);
        let writer = tokio::spawn(run_writer(store.clone(), rx));

        let now = local_now();
        for m in 0..3 {
            tx.send(Sample::complete(now - Duration::minutes(m), 50.0, 10.0))
                .await
                .unwrap();
        }
        drop(tx);

        let stats = writer.await.unwrap();
        assert_eq!(stats, WriterStats { stored: 3, failed: 0 });
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn test_fresh_store_skips_backfill() {
        let store = SampleStore::open_in_memory().unwrap();
        store.store(local_now(), Some(30.0), None).unwrap();

        let report = backfill_if_stale(
            &store,
            Duration::hours(2),
            Some(Path::new("/nonexistent/history.jsonl")),
            None,
        )
        .unwrap();
        assert!(report.is_none());
    }

    #[test]
    fn test_stale_store_without_path() {
        let store = SampleStore::open_in_memory().unwrap();
        assert!(backfill_if_stale(&store, Duration::hours(2), None, None)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_stale_store_missing_file_is_error() {
        let store = SampleStore::open_in_memory().unwrap();
        let result = backfill_if_stale(
            &store,
            Duration::hours(2),
            Some(Path::new("/nonexistent/history.jsonl")),
            None,
        );
        assert!(matches!(result, Err(ImportError::Io(_))));
    }
}
