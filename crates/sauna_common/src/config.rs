//! Configuration for saunad and saunactl
//!
//! Loaded from TOML. Every section and key is optional; anything missing
//! takes the value in `config/default.toml`.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use crate::classifier::{DropAdvisory, Evaluator, Thresholds};
use crate::error::ConfigError;
use crate::status::StatusFormatter;
use crate::trend::EstimatorKind;

pub const CONFIG_FILE: &str = "/etc/sauna/config.toml";
pub const CONFIG_ENV: &str = "SAUNA_CONFIG";
pub const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

/// Longest estimator or display span: one week
pub const MAX_SPAN_MINUTES: i64 = 7 * 24 * 60;
pub const MAX_RETENTION_DAYS: u32 = 3650;
/// Upper bound for hour-valued horizons: one year
pub const MAX_HOURS: u64 = 365 * 24;
/// Upper bound for second-valued intervals: one day
pub const MAX_INTERVAL_SECS: u64 = 24 * 60 * 60;
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaunaConfig {
    pub sauna: SaunaSection,
    pub estimator: EstimatorSection,
    pub storage: StorageSection,
    pub schedule: ScheduleSection,
    pub sensor: SensorSection,
    pub display: DisplaySection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaunaSection {
    pub target_temp: f64,
    pub min_active_temp: f64,
    /// °C/hour; a steeper short-term drop raises the "add wood" advisory
    pub temp_drop_threshold_per_hour: f64,
    /// °C/hour; slower changes count as stable
    pub stable_threshold_per_hour: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorSection {
    pub strategy: EstimatorKind,
    pub lookback_minutes: i64,
    pub recent_minutes: i64,
    pub advisory_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub db_path: PathBuf,
    pub retention_days: u32,
    pub freshness_hours: i64,
    pub prune_interval_hours: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSection {
    pub active_update_interval_secs: u64,
    pub inactive_sleep_secs: u64,
    pub display_sleep_after_secs: u64,
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorSection {
    /// Bridge output to read: a file or FIFO path, or "-" for stdin
    pub source: String,
    pub mac: Option<String>,
    /// Live readings are stored at most this often
    pub store_interval_secs: u64,
    pub channel_capacity: usize,
    /// Poll period while following a regular file at EOF
    pub poll_interval_ms: u64,
    /// History export ingested at startup when the store is stale
    pub backfill_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySection {
    /// Where the status JSON for the display process is written
    pub status_file: Option<PathBuf>,
    pub series_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
}

impl Default for SaunaSection {
    fn default() -> Self {
        Self {
            target_temp: 65.0,
            min_active_temp: 40.0,
            temp_drop_threshold_per_hour: -5.0,
            stable_threshold_per_hour: 4.0,
        }
    }
}

impl Default for EstimatorSection {
    fn default() -> Self {
        Self {
            strategy: EstimatorKind::SingleWindow,
            lookback_minutes: 60,
            recent_minutes: 15,
            advisory_minutes: 30,
        }
    }
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("/var/lib/sauna/sauna_data.db"),
            retention_days: 10,
            freshness_hours: 2,
            prune_interval_hours: 24,
        }
    }
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            active_update_interval_secs: 60,
            inactive_sleep_secs: 50,
            display_sleep_after_secs: 300,
            shutdown_timeout_secs: 5,
        }
    }
}

impl Default for SensorSection {
    fn default() -> Self {
        Self {
            source: "/run/sauna/bridge.jsonl".to_string(),
            mac: None,
            store_interval_secs: 60,
            channel_capacity: 64,
            poll_interval_ms: 1000,
            backfill_path: None,
        }
    }
}

impl Default for DisplaySection {
    fn default() -> Self {
        Self {
            status_file: None,
            series_minutes: 120,
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl SaunaConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: SaunaConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject thresholds and intervals the pipeline cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.sauna;
        if !(s.target_temp.is_finite() && s.min_active_temp.is_finite()) {
            return Err(ConfigError::Invalid("temperatures must be finite".into()));
        }
        if s.min_active_temp >= s.target_temp {
            return Err(ConfigError::Invalid(format!(
                "min_active_temp ({}) must be below target_temp ({})",
                s.min_active_temp, s.target_temp
            )));
        }
        if !(s.stable_threshold_per_hour > 0.0) {
            return Err(ConfigError::Invalid("stable_threshold_per_hour must be positive".into()));
        }
        if !(s.temp_drop_threshold_per_hour < 0.0) {
            return Err(ConfigError::Invalid("temp_drop_threshold_per_hour must be negative".into()));
        }

        let e = &self.estimator;
        let spans = [e.recent_minutes, e.advisory_minutes, e.lookback_minutes, self.display.series_minutes];
        if spans.iter().any(|&m| m <= 0 || m > MAX_SPAN_MINUTES) {
            return Err(ConfigError::Invalid(format!(
                "estimator and display spans must be between 1 and {} minutes",
                MAX_SPAN_MINUTES
            )));
        }
        if e.lookback_minutes < e.recent_minutes.max(e.advisory_minutes) {
            return Err(ConfigError::Invalid(
                "lookback_minutes must cover recent_minutes and advisory_minutes".into(),
            ));
        }

        let st = &self.storage;
        if st.retention_days == 0 || st.freshness_hours <= 0 || st.prune_interval_hours == 0 {
            return Err(ConfigError::Invalid("storage horizons must be positive".into()));
        }
        if st.retention_days > MAX_RETENTION_DAYS {
            return Err(ConfigError::Invalid(format!(
                "retention_days must be at most {}",
                MAX_RETENTION_DAYS
            )));
        }
        if st.freshness_hours as u64 > MAX_HOURS || st.prune_interval_hours > MAX_HOURS {
            return Err(ConfigError::Invalid(format!(
                "freshness_hours and prune_interval_hours must be at most {}",
                MAX_HOURS
            )));
        }

        let sch = &self.schedule;
        if sch.active_update_interval_secs == 0 || sch.inactive_sleep_secs == 0 {
            return Err(ConfigError::Invalid("update intervals must be positive".into()));
        }
        let intervals = [
            ("active_update_interval_secs", sch.active_update_interval_secs),
            ("inactive_sleep_secs", sch.inactive_sleep_secs),
            ("display_sleep_after_secs", sch.display_sleep_after_secs),
            ("shutdown_timeout_secs", sch.shutdown_timeout_secs),
            ("store_interval_secs", self.sensor.store_interval_secs),
        ];
        if let Some((name, value)) = intervals.iter().find(|(_, v)| *v > MAX_INTERVAL_SECS) {
            return Err(ConfigError::Invalid(format!(
                "{} ({}) must be at most {}",
                name, value, MAX_INTERVAL_SECS
            )));
        }

        if self.sensor.channel_capacity == 0 {
            return Err(ConfigError::Invalid("sensor.channel_capacity must be positive".into()));
        }
        if self.sensor.poll_interval_ms == 0 || self.sensor.poll_interval_ms > MAX_POLL_INTERVAL_MS {
            return Err(ConfigError::Invalid(format!(
                "sensor.poll_interval_ms must be between 1 and {}",
                MAX_POLL_INTERVAL_MS
            )));
        }

        Ok(())
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            target_temp: self.sauna.target_temp,
            min_active_temp: self.sauna.min_active_temp,
            stable_rate_per_hour: self.sauna.stable_threshold_per_hour,
        }
    }

    pub fn drop_advisory(&self) -> DropAdvisory {
        DropAdvisory {
            horizon: Duration::minutes(self.estimator.advisory_minutes),
            threshold_per_hour: self.sauna.temp_drop_threshold_per_hour,
        }
    }

    pub fn evaluator(&self) -> Evaluator {
        let estimator = self
            .estimator
            .strategy
            .build(Duration::minutes(self.estimator.recent_minutes));
        Evaluator::new(estimator, self.thresholds(), self.drop_advisory())
    }

    pub fn formatter(&self) -> StatusFormatter {
        StatusFormatter::new(self.sauna.target_temp)
    }

    pub fn lookback(&self) -> Duration {
        Duration::minutes(self.estimator.lookback_minutes)
    }

    pub fn freshness(&self) -> Duration {
        Duration::hours(self.storage.freshness_hours)
    }

    pub fn series_span(&self) -> Duration {
        Duration::minutes(self.display.series_minutes)
    }

    pub fn active_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.schedule.active_update_interval_secs)
    }

    pub fn inactive_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.schedule.inactive_sleep_secs)
    }

    /// How long the sauna stays cold before the display sleeps
    pub fn display_sleep_after(&self) -> Duration {
        seconds(self.schedule.display_sleep_after_secs)
    }

    pub fn prune_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.storage.prune_interval_hours.saturating_mul(3600))
    }

    pub fn shutdown_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.schedule.shutdown_timeout_secs)
    }

    /// Minimum spacing of stored live readings
    pub fn store_interval(&self) -> Duration {
        seconds(self.sensor.store_interval_secs)
    }

    pub fn poll_interval(&self) -> StdDuration {
        StdDuration::from_millis(self.sensor.poll_interval_ms)
    }
}

// Saturates instead of wrapping for values past what a `Duration` holds
fn seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

/// Config path: explicit argument, then `$SAUNA_CONFIG`, then `/etc/sauna/config.toml`
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
}

/// Load the config file, or the defaults if it does not exist
pub fn load_config(path: &Path) -> Result<SaunaConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("No config at {}, using defaults", path.display());
        return SaunaConfig::from_toml_str(DEFAULT_CONFIG);
    }

    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    SaunaConfig::from_toml_str(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_file_matches_defaults() {
        let parsed = SaunaConfig::from_toml_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(parsed, SaunaConfig::default());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config = SaunaConfig::from_toml_str(
            r#"
            [sauna]
            target_temp = 80.0

            [estimator]
            strategy = "weighted_regression"
            "#,
        )
        .unwrap();

        assert_eq!(config.sauna.target_temp, 80.0);
        assert_eq!(config.sauna.min_active_temp, 40.0);
        assert_eq!(config.estimator.strategy, EstimatorKind::WeightedRegression);
        assert_eq!(config.storage.retention_days, 10);
        assert_eq!(config.evaluator().estimator_name(), "weighted_regression");
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let err = SaunaConfig::from_toml_str(
            r#"
            [sauna]
            target_temp = 40.0
            min_active_temp = 60.0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_positive_drop_threshold() {
        let result = SaunaConfig::from_toml_str("[sauna]\ntemp_drop_threshold_per_hour = 5.0\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_short_lookback() {
        let result = SaunaConfig::from_toml_str("[estimator]\nlookback_minutes = 10\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_oversized_values() {
        for toml in [
            "[schedule]\ndisplay_sleep_after_secs = 9223372036854775807\n",
            "[sensor]\nstore_interval_secs = 9223372036854775807\n",
            "[storage]\nprune_interval_hours = 9223372036854775807\n",
            "[storage]\nretention_days = 4294967295\n",
            "[storage]\nfreshness_hours = 9223372036854775807\n",
            "[estimator]\nlookback_minutes = 9223372036854775807\n",
            "[display]\nseries_minutes = 0\n",
            "[sensor]\npoll_interval_ms = 0\n",
        ] {
            let err = SaunaConfig::from_toml_str(toml).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "accepted {:?}", toml);
        }
    }

    #[test]
    fn test_interval_helpers_saturate() {
        let mut config = SaunaConfig::default();
        config.schedule.display_sleep_after_secs = u64::MAX;
        config.sensor.store_interval_secs = u64::MAX;
        config.storage.prune_interval_hours = u64::MAX;

        assert_eq!(config.display_sleep_after(), Duration::MAX);
        assert_eq!(config.store_interval(), Duration::MAX);
        assert_eq!(config.prune_interval(), StdDuration::from_secs(u64::MAX));
    }

    #[test]
    fn test_duration_helpers_at_defaults() {
        let config = SaunaConfig::default();
        assert_eq!(config.display_sleep_after(), Duration::minutes(5));
        assert_eq!(config.store_interval(), Duration::seconds(60));
        assert_eq!(config.prune_interval(), StdDuration::from_secs(24 * 3600));
        assert_eq!(config.poll_interval(), StdDuration::from_secs(1));
    }

    #[test]
    fn test_unknown_strategy_is_parse_error() {
        let err = SaunaConfig::from_toml_str("[estimator]\nstrategy = \"kalman\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, SaunaConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[storage]\nretention_days = 3\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.storage.retention_days, 3);
    }

    #[test]
    fn test_explicit_path_wins() {
        let explicit = Path::new("/tmp/explicit.toml");
        assert_eq!(config_path(Some(explicit)), explicit.to_path_buf());
    }
}
