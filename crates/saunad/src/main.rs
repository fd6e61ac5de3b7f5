//! Sauna Daemon
//!
//! Reads the sensor bridge, keeps the measurement store, and publishes the
//! heating status for the display.

use anyhow::{Context, Result};
use sauna_common::config::{config_path, load_config};
use sauna_common::store::SampleStore;
use saunad::acquisition::{Acquisition, JsonLinesSource, LiveThrottle};
use saunad::ingest::{backfill_if_stale, run_writer};
use saunad::pipeline::{Monitor, MonitorSettings};
use saunad::render::{LogRenderer, Renderer, StatusFileRenderer};
use saunad::retention::run_retention;
use saunad::retry::RetryPolicy;
use saunad::shutdown::{join_with_timeout, wait_for_signal, Shutdown};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let path = config_path(None);
    let config = load_config(&path).with_context(|| format!("Failed to load config from {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("[BOOT] Sauna Daemon v{} starting...", env!("CARGO_PKG_VERSION"));
    info!(
        "[BOOT] Config loaded from {} (target {}°C, active above {}°C)",
        path.display(),
        config.sauna.target_temp,
        config.sauna.min_active_temp
    );

    let store = Arc::new(
        SampleStore::open(&config.storage.db_path)
            .with_context(|| format!("Failed to open store at {}", config.storage.db_path.display()))?,
    );
    info!("[BOOT] Store ready at {}", config.storage.db_path.display());

    if let Err(e) = backfill_if_stale(
        &store,
        config.freshness(),
        config.sensor.backfill_path.as_deref(),
        config.sensor.mac.as_deref(),
    ) {
        warn!("[BOOT] History backfill failed: {}", e);
    }

    let shutdown = Shutdown::new();
    let (tx, rx) = mpsc::channel(config.sensor.channel_capacity);

    let writer = tokio::spawn(run_writer(store.clone(), rx));

    let source = JsonLinesSource::new(config.sensor.source.clone(), config.sensor.mac.clone())
        .with_poll_interval(config.poll_interval())
        .from_end();
    let throttle = LiveThrottle::new(config.store_interval());
    let acquisition = tokio::spawn(
        Acquisition::new(source, tx, throttle, RetryPolicy::default()).run(shutdown.subscribe()),
    );

    let retention = tokio::spawn(run_retention(
        store.clone(),
        config.storage.retention_days,
        config.prune_interval(),
        shutdown.subscribe(),
    ));

    let renderer: Box<dyn Renderer> = match &config.display.status_file {
        Some(path) => {
            info!("[BOOT] Publishing status to {}", path.display());
            Box::new(StatusFileRenderer::new(path))
        }
        None => Box::new(LogRenderer::default()),
    };
    let monitor = Monitor::new(
        store.clone(),
        config.evaluator(),
        config.formatter(),
        renderer,
        MonitorSettings::from_config(&config),
    );
    let evaluation = tokio::spawn(monitor.run(shutdown.subscribe()));

    info!("[READY] saunad operational");

    let signal = wait_for_signal().await?;
    info!("{} received, shutting down", signal);
    shutdown.trigger();

    let timeout = config.shutdown_timeout();
    join_with_timeout("Acquisition", acquisition, timeout).await;
    join_with_timeout("Store writer", writer, timeout).await;
    join_with_timeout("Evaluation", evaluation, timeout).await;
    join_with_timeout("Retention", retention, timeout).await;

    info!("Sauna Daemon stopped");
    Ok(())
}
