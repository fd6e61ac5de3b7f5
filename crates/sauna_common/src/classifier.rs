//! State Classifier - maps a window snapshot to a thermal state
//!
//! Stateless: every call depends only on the window and the thresholds.
//! Check order is fixed: point count, cold, ready, stable, heating/cooling.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::sample::Window;
use crate::trend::{endpoint_rate, TrendEstimator, TrendResult};

/// Caps the ETA of a barely-rising trend
const MAX_ETA_MINUTES: i64 = 7 * 24 * 60;

/// Temperature thresholds for classification
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub target_temp: f64,
    pub min_active_temp: f64,
    /// |rate| below this (°C/hour) counts as stable
    pub stable_rate_per_hour: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            target_temp: 65.0,
            min_active_temp: 40.0,
            stable_rate_per_hour: 4.0,
        }
    }
}

/// Thermal state at one evaluation instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ThermalState {
    InsufficientData,
    Cold,
    Heating {
        eta_minutes: i64,
        #[serde(with = "crate::sample::timestamp_serde")]
        expected_ready: NaiveDateTime,
    },
    Stable,
    Ready,
    Cooling,
    Unknown,
}

impl ThermalState {
    /// Whether the sauna is in use (drives the update cadence)
    pub fn is_active(&self) -> bool {
        !matches!(
            self,
            ThermalState::Cold | ThermalState::InsufficientData | ThermalState::Unknown
        )
    }

    pub fn eta_minutes(&self) -> Option<i64> {
        match self {
            ThermalState::Heating { eta_minutes, .. } => Some(*eta_minutes),
            _ => None,
        }
    }

    pub fn expected_ready_time(&self) -> Option<NaiveDateTime> {
        match self {
            ThermalState::Heating { expected_ready, .. } => Some(*expected_ready),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ThermalState::InsufficientData => "insufficient_data",
            ThermalState::Cold => "cold",
            ThermalState::Heating { .. } => "heating",
            ThermalState::Stable => "stable",
            ThermalState::Ready => "ready",
            ThermalState::Cooling => "cooling",
            ThermalState::Unknown => "unknown",
        }
    }
}

/// Classify a window given its (already estimated) trend
pub fn classify(window: &Window, trend: Option<&TrendResult>, thresholds: &Thresholds) -> ThermalState {
    if window.point_count() < 2 {
        return ThermalState::InsufficientData;
    }

    let current = match window.current_temperature() {
        Some(t) if t.is_finite() => t,
        _ => return ThermalState::Unknown,
    };

    if current < thresholds.min_active_temp {
        return ThermalState::Cold;
    }
    if current >= thresholds.target_temp {
        return ThermalState::Ready;
    }

    let rate = match trend {
        Some(t) if t.rate_per_hour.is_finite() => t.rate_per_hour,
        Some(_) => return ThermalState::Unknown,
        None => return ThermalState::Stable,
    };

    if rate.abs() < thresholds.stable_rate_per_hour {
        ThermalState::Stable
    } else if rate > 0.0 {
        let eta_minutes =
            (((thresholds.target_temp - current) / rate * 60.0) as i64).min(MAX_ETA_MINUTES);
        ThermalState::Heating {
            eta_minutes,
            expected_ready: window.now() + Duration::minutes(eta_minutes),
        }
    } else {
        ThermalState::Cooling
    }
}

/// Secondary signal layered over the primary state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "advisory", rename_all = "snake_case")]
pub enum Advisory {
    TemperatureDropping { rate_per_hour: f64 },
}

/// Flags a steep short-horizon temperature drop ("add fuel")
#[derive(Debug, Clone)]
pub struct DropAdvisory {
    pub horizon: Duration,
    /// Negative °C/hour; rates below this trigger the advisory
    pub threshold_per_hour: f64,
}

impl Default for DropAdvisory {
    fn default() -> Self {
        Self {
            horizon: Duration::minutes(30),
            threshold_per_hour: -5.0,
        }
    }
}

impl DropAdvisory {
    pub fn check(&self, window: &Window) -> Option<Advisory> {
        let trend = endpoint_rate(window.trailing_points(self.horizon))?;
        if trend.rate_per_hour < self.threshold_per_hour {
            Some(Advisory::TemperatureDropping { rate_per_hour: trend.rate_per_hour })
        } else {
            None
        }
    }
}

/// Everything one evaluation tick produces
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    #[serde(flatten)]
    pub state: ThermalState,
    pub current_temperature: Option<f64>,
    pub current_humidity: Option<f64>,
    pub trend: Option<TrendResult>,
    pub advisory: Option<Advisory>,
    #[serde(with = "crate::sample::timestamp_serde")]
    pub evaluated_at: NaiveDateTime,
}

/// Estimator + classifier + advisory, run over one window
pub struct Evaluator {
    estimator: Box<dyn TrendEstimator>,
    thresholds: Thresholds,
    advisory: DropAdvisory,
}

impl Evaluator {
    pub fn new(estimator: Box<dyn TrendEstimator>, thresholds: Thresholds, advisory: DropAdvisory) -> Self {
        Self { estimator, thresholds, advisory }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn estimator_name(&self) -> &'static str {
        self.estimator.name()
    }

    pub fn evaluate(&self, window: &Window) -> Assessment {
        let trend = self.estimator.estimate(window);
        let state = classify(window, trend.as_ref(), &self.thresholds);

        Assessment {
            state,
            current_temperature: window.current_temperature(),
            current_humidity: window.current_humidity(),
            trend,
            advisory: self.advisory.check(window),
            evaluated_at: window.now(),
        }
    }
}
