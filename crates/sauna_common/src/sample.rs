//! Measurement samples and the window snapshot handed to the estimator
//!
//! Timestamps are local wall-clock time at second precision. The text form
//! `YYYY-MM-DD HH:MM:SS` sorts lexicographically in chronological order, which
//! the store relies on for range queries.

use chrono::{DateTime, Duration, Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::ReadingError;

/// Persisted timestamp format
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One measurement instant. Either field may be missing when the sensor
/// delivered temperature and humidity as separate records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(with = "timestamp_serde")]
    pub timestamp: NaiveDateTime,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
}

impl Sample {
    pub fn new(timestamp: NaiveDateTime, temperature: Option<f64>, humidity: Option<f64>) -> Self {
        Self {
            timestamp: truncate_to_second(timestamp),
            temperature,
            humidity,
        }
    }

    /// Both temperature and humidity present
    pub fn complete(timestamp: NaiveDateTime, temperature: f64, humidity: f64) -> Self {
        Self::new(timestamp, Some(temperature), Some(humidity))
    }

    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.humidity.is_none()
    }
}

/// Result ordering for store queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Chronological,
    MostRecentFirst,
}

/// A temperature observation usable for trend estimation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendPoint {
    pub at: NaiveDateTime,
    pub temperature: f64,
}

/// Immutable chronological view of the samples in `(now - horizon, now]`.
///
/// Built once per evaluation tick from a store query and passed by reference
/// through estimator, classifier and formatter.
#[derive(Debug, Clone)]
pub struct Window {
    now: NaiveDateTime,
    horizon: Duration,
    samples: Vec<Sample>,
    points: Vec<TrendPoint>,
}

impl Window {
    pub fn new(now: NaiveDateTime, horizon: Duration, mut samples: Vec<Sample>) -> Self {
        let start = now.checked_sub_signed(horizon);
        samples.retain(|s| start.map_or(true, |start| s.timestamp > start) && s.timestamp <= now);
        samples.sort_by_key(|s| s.timestamp);
        samples.dedup_by_key(|s| s.timestamp);

        let points = samples
            .iter()
            .filter_map(|s| {
                s.temperature
                    .filter(|t| t.is_finite())
                    .map(|temperature| TrendPoint { at: s.timestamp, temperature })
            })
            .collect();

        Self { now, horizon, samples, points }
    }

    pub fn empty(now: NaiveDateTime, horizon: Duration) -> Self {
        Self::new(now, horizon, Vec::new())
    }

    /// Evaluation instant
    pub fn now(&self) -> NaiveDateTime {
        self.now
    }

    pub fn horizon(&self) -> Duration {
        self.horizon
    }

    /// All samples, oldest first
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Samples carrying a temperature, oldest first
    pub fn points(&self) -> &[TrendPoint] {
        &self.points
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn latest_point(&self) -> Option<TrendPoint> {
        self.points.last().copied()
    }

    pub fn current_temperature(&self) -> Option<f64> {
        self.latest_point().map(|p| p.temperature)
    }

    pub fn current_humidity(&self) -> Option<f64> {
        self.samples.iter().rev().find_map(|s| s.humidity)
    }

    /// Points no older than `span` before the latest point
    pub fn trailing_points(&self, span: Duration) -> &[TrendPoint] {
        match self.points.last() {
            Some(last) => {
                let first = match last.at.checked_sub_signed(span) {
                    Some(cutoff) => self.points.partition_point(|p| p.at < cutoff),
                    None => 0,
                };
                &self.points[first..]
            }
            None => &[],
        }
    }

    /// Samples no older than `span` before `now`, most recent first
    pub fn recent_series(&self, span: Duration) -> Vec<Sample> {
        let cutoff = self.now.checked_sub_signed(span);
        self.samples
            .iter()
            .rev()
            .take_while(|s| cutoff.map_or(true, |cutoff| s.timestamp > cutoff))
            .copied()
            .collect()
    }
}

/// Elapsed time between two instants in fractional hours
pub fn elapsed_hours(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_milliseconds() as f64 / 3_600_000.0
}

pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Accepts the store format or RFC 3339 (converted to local time)
pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime, ReadingError> {
    let text = text.trim();
    if let Ok(ts) = NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT) {
        return Ok(ts);
    }
    DateTime::parse_from_rfc3339(text)
        .map(|dt| truncate_to_second(dt.with_timezone(&Local).naive_local()))
        .map_err(|_| ReadingError::BadTimestamp(text.to_string()))
}

/// Current local time at store precision
pub fn local_now() -> NaiveDateTime {
    truncate_to_second(Local::now().naive_local())
}

fn truncate_to_second(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_nanosecond(0).unwrap_or(ts)
}

pub mod timestamp_serde {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(*ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_timestamp(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_window_sorts_and_filters() {
        let now = at(12, 0);
        let samples = vec![
            Sample::complete(at(11, 50), 50.0, 10.0),
            Sample::complete(at(10, 0), 20.0, 30.0), // outside 1h horizon
            Sample::complete(at(11, 30), 40.0, 12.0),
            Sample::complete(at(12, 5), 60.0, 9.0), // in the future
        ];
        let window = Window::new(now, Duration::hours(1), samples);

        assert_eq!(window.samples().len(), 2);
        assert_eq!(window.samples()[0].timestamp, at(11, 30));
        assert_eq!(window.current_temperature(), Some(50.0));
    }

    #[test]
    fn test_window_skips_humidity_only_points() {
        let now = at(12, 0);
        let samples = vec![
            Sample::complete(at(11, 40), 40.0, 12.0),
            Sample::new(at(11, 50), None, Some(11.0)),
        ];
        let window = Window::new(now, Duration::hours(1), samples);

        assert_eq!(window.samples().len(), 2);
        assert_eq!(window.point_count(), 1);
        assert_eq!(window.current_humidity(), Some(11.0));
    }

    #[test]
    fn test_trailing_points_anchor_on_latest() {
        let now = at(12, 0);
        let samples = (0..7)
            .map(|i| Sample::complete(at(11, 10 + i * 5), 40.0 + i as f64, 10.0))
            .collect();
        let window = Window::new(now, Duration::hours(1), samples);

        // latest at 11:40, 15 minutes back reaches 11:25
        let recent = window.trailing_points(Duration::minutes(15));
        assert_eq!(recent.len(), 4);
        assert_eq!(recent[0].at, at(11, 25));
    }

    #[test]
    fn test_unbounded_horizon_keeps_all_past_samples() {
        let now = at(12, 0);
        let samples = vec![
            Sample::complete(at(0, 0), 20.0, 30.0),
            Sample::complete(at(11, 30), 40.0, 12.0),
        ];
        let huge = Duration::days(100_000_000);
        let window = Window::new(now, huge, samples);

        assert_eq!(window.samples().len(), 2);
        assert_eq!(window.trailing_points(huge).len(), 2);
        assert_eq!(window.recent_series(huge).len(), 2);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert_eq!(parse_timestamp("2024-03-02 11:30:00").unwrap(), at(11, 30));
        assert!(parse_timestamp("2024-03-02T11:30:00+00:00").is_ok());
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_sample_serializes_store_format() {
        let sample = Sample::complete(at(9, 15), 55.5, 8.0);
        let json = serde_json::to_string(&sample).unwrap();
        assert!(json.contains("\"2024-03-02 09:15:00\""));
        let back: Sample = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample);
    }
}
