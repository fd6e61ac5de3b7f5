//! Evaluation loop
//!
//! Each tick queries the store, builds an immutable window, evaluates it and
//! hands the result to the renderer. The cadence follows the sauna: every
//! minute while in use, a little faster while cold so heating is picked up
//! early. After a few minutes of continuous inactivity the display is put
//! to sleep; the first active tick wakes it.

use chrono::{Duration, NaiveDateTime};
use sauna_common::classifier::{Assessment, Evaluator, ThermalState};
use sauna_common::config::SaunaConfig;
use sauna_common::sample::{local_now, Order, Sample, Window};
use sauna_common::status::{StatusFormatter, StatusMessage};
use sauna_common::store::SampleStore;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::render::{Frame, Renderer};

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub lookback: Duration,
    pub series_span: Duration,
    pub active_interval: StdDuration,
    pub inactive_interval: StdDuration,
    pub display_sleep_after: Duration,
}

impl MonitorSettings {
    pub fn from_config(config: &SaunaConfig) -> Self {
        Self {
            lookback: config.lookback(),
            series_span: config.series_span(),
            active_interval: config.active_interval(),
            inactive_interval: config.inactive_interval(),
            display_sleep_after: config.display_sleep_after(),
        }
    }
}

/// Result of one evaluation tick
#[derive(Debug, Clone)]
pub struct Tick {
    pub assessment: Assessment,
    pub status: StatusMessage,
    pub display_asleep: bool,
    /// Delay before the next tick
    pub next_in: StdDuration,
}

pub struct Monitor {
    store: Arc<SampleStore>,
    evaluator: Evaluator,
    formatter: StatusFormatter,
    renderer: Box<dyn Renderer>,
    settings: MonitorSettings,
    last_good: Option<(Window, Vec<Sample>)>,
    last_state: Option<ThermalState>,
    inactive_since: Option<NaiveDateTime>,
    display_asleep: bool,
}

impl Monitor {
    pub fn new(
        store: Arc<SampleStore>,
        evaluator: Evaluator,
        formatter: StatusFormatter,
        renderer: Box<dyn Renderer>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            store,
            evaluator,
            formatter,
            renderer,
            settings,
            last_good: None,
            last_state: None,
            inactive_since: None,
            display_asleep: false,
        }
    }

    pub fn tick(&mut self, now: NaiveDateTime) -> Tick {
        let (window, series) = self.load_window(now);
        let assessment = self.evaluator.evaluate(&window);
        let status = self.formatter.format_assessment(&assessment);

        if self.last_state.as_ref().map(ThermalState::label) != Some(assessment.state.label()) {
            info!(
                "[EVAL] State {} (temp={:?} rate={:?})",
                assessment.state.label(),
                assessment.current_temperature,
                assessment.trend.map(|t| t.rate_per_hour)
            );
        }
        self.last_state = Some(assessment.state);

        self.update_display(&assessment, &status, series, now);

        let next_in = if assessment.state.is_active() {
            self.settings.active_interval
        } else {
            self.settings.inactive_interval
        };

        Tick {
            assessment,
            status,
            display_asleep: self.display_asleep,
            next_in,
        }
    }

    /// Evaluation window plus the display series. On a store failure the
    /// last good snapshot is reused.
    fn load_window(&mut self, now: NaiveDateTime) -> (Window, Vec<Sample>) {
        let horizon = self.settings.lookback.max(self.settings.series_span);

        match self.store.query_at(now, horizon, Order::Chronological) {
            Ok(samples) => {
                let series = Window::new(now, horizon, samples.clone()).recent_series(self.settings.series_span);
                let window = Window::new(now, self.settings.lookback, samples);
                self.last_good = Some((window.clone(), series.clone()));
                (window, series)
            }
            Err(e) => {
                warn!("[EVAL] Store query failed, reusing last window: {}", e);
                self.last_good
                    .clone()
                    .unwrap_or_else(|| (Window::empty(now, self.settings.lookback), Vec::new()))
            }
        }
    }

    fn update_display(
        &mut self,
        assessment: &Assessment,
        status: &StatusMessage,
        series: Vec<Sample>,
        now: NaiveDateTime,
    ) {
        if assessment.state.is_active() {
            self.inactive_since = None;
            if self.display_asleep {
                info!("[EVAL] Sauna active, waking display");
                self.display_asleep = false;
            }
        } else {
            let since = *self.inactive_since.get_or_insert(now);
            if !self.display_asleep && now - since >= self.settings.display_sleep_after {
                match self.renderer.sleep() {
                    Ok(()) => {
                        info!("[EVAL] Inactive for {} min, display asleep", (now - since).num_minutes());
                        self.display_asleep = true;
                    }
                    Err(e) => warn!("[EVAL] Failed to put display to sleep: {}", e),
                }
            }
        }

        if self.display_asleep {
            debug!("[EVAL] Display asleep, skipping render");
            return;
        }

        let frame = Frame::new(assessment, status.clone(), series);
        if let Err(e) = self.renderer.render(&frame) {
            warn!("[EVAL] Render failed: {}", e);
        }
    }

    /// Tick until shutdown. Each tick runs on the blocking pool since it
    /// waits on the store lock and SQLite.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "[EVAL] Monitor running ({} estimator, target {}°C)",
            self.evaluator.estimator_name(),
            self.evaluator.thresholds().target_temp
        );

        let mut monitor = self;
        loop {
            if *shutdown.borrow() {
                break;
            }

            let evaluated = tokio::task::spawn_blocking(move || {
                let tick = monitor.tick(local_now());
                (monitor, tick)
            })
            .await;

            let tick = match evaluated {
                Ok((returned, tick)) => {
                    monitor = returned;
                    tick
                }
                Err(e) => {
                    error!("[EVAL] Evaluation task failed, monitor stopping: {}", e);
                    return;
                }
            };

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(tick.next_in) => {}
            }
        }

        info!("[EVAL] Monitor stopped");
    }
}
