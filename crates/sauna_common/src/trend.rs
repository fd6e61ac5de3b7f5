//! Trend Estimator - temperature rate of change from a window snapshot
//!
//! Two deterministic strategies sit behind [`TrendEstimator`]:
//! - [`SingleWindowRate`]: endpoint rate over the trailing 15 minutes,
//!   widening to the last two points when the recent span is too sparse.
//! - [`WeightedRegression`]: least-squares slopes over trailing 5/15/30 minute
//!   sub-windows combined with weights 3/2/1.
//!
//! All sub-windows are anchored on the latest point, not on the evaluation
//! instant, so a sensor that paused briefly still yields a rate.
//!
//! A rate is never infinite or NaN: fewer than two points or zero elapsed time
//! yields `None`.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::sample::{elapsed_hours, TrendPoint, Window};

/// Rate of change in °C per hour and the number of points it rests on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    pub rate_per_hour: f64,
    pub basis_point_count: usize,
}

/// Strategy seam between the window and the classifier
pub trait TrendEstimator: Send + Sync {
    fn estimate(&self, window: &Window) -> Option<TrendResult>;

    /// Short identifier for logs
    fn name(&self) -> &'static str;
}

/// Configurable choice of estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    #[default]
    SingleWindow,
    WeightedRegression,
}

impl EstimatorKind {
    pub fn build(self, recent: Duration) -> Box<dyn TrendEstimator> {
        match self {
            EstimatorKind::SingleWindow => Box::new(SingleWindowRate { recent }),
            EstimatorKind::WeightedRegression => Box::new(WeightedRegression::default()),
        }
    }
}

/// `(last - first) / elapsed` over the trailing `recent` span
#[derive(Debug, Clone)]
pub struct SingleWindowRate {
    pub recent: Duration,
}

impl Default for SingleWindowRate {
    fn default() -> Self {
        Self { recent: Duration::minutes(15) }
    }
}

impl TrendEstimator for SingleWindowRate {
    fn estimate(&self, window: &Window) -> Option<TrendResult> {
        let all = window.points();
        if all.len() < 2 {
            return None;
        }

        let recent = window.trailing_points(self.recent);
        let basis = if recent.len() >= 2 { recent } else { &all[all.len() - 2..] };
        endpoint_rate(basis)
    }

    fn name(&self) -> &'static str {
        "single_window"
    }
}

/// Weighted mean of least-squares slopes over nested trailing sub-windows
#[derive(Debug, Clone)]
pub struct WeightedRegression {
    /// (span, weight) pairs; shorter spans should carry larger weights
    pub spans: Vec<(Duration, f64)>,
}

impl Default for WeightedRegression {
    fn default() -> Self {
        Self {
            spans: vec![
                (Duration::minutes(5), 3.0),
                (Duration::minutes(15), 2.0),
                (Duration::minutes(30), 1.0),
            ],
        }
    }
}

impl TrendEstimator for WeightedRegression {
    fn estimate(&self, window: &Window) -> Option<TrendResult> {
        if window.point_count() < 2 {
            return None;
        }

        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        let mut basis = 0;

        for &(span, weight) in &self.spans {
            let points = window.trailing_points(span);
            if points.len() < 2 {
                continue;
            }
            if let Some(slope) = least_squares_slope(points) {
                weighted_sum += slope * weight;
                weight_total += weight;
                basis = basis.max(points.len());
            }
        }

        if weight_total <= 0.0 {
            return None;
        }

        Some(TrendResult {
            rate_per_hour: weighted_sum / weight_total,
            basis_point_count: basis,
        })
    }

    fn name(&self) -> &'static str {
        "weighted_regression"
    }
}

/// Rate between the first and last point of a chronological slice
pub fn endpoint_rate(points: &[TrendPoint]) -> Option<TrendResult> {
    if points.len() < 2 {
        return None;
    }
    let (first, last) = (points[0], points[points.len() - 1]);

    let hours = elapsed_hours(first.at, last.at);
    if hours <= 0.0 {
        return None;
    }

    Some(TrendResult {
        rate_per_hour: (last.temperature - first.temperature) / hours,
        basis_point_count: points.len(),
    })
}

/// Ordinary least-squares slope in °C per hour, `None` without time spread
pub fn least_squares_slope(points: &[TrendPoint]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }

    let origin = points[0].at;
    let n = points.len() as f64;
    let xs: Vec<f64> = points.iter().map(|p| elapsed_hours(origin, p.at)).collect();
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.temperature).sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (x, p) in xs.iter().zip(points) {
        let dx = x - mean_x;
        sxx += dx * dx;
        sxy += dx * (p.temperature - mean_y);
    }

    if sxx <= f64::EPSILON {
        return None;
    }
    Some(sxy / sxx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Sample;
    use chrono::{NaiveDate, NaiveDateTime};

    fn base() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 2)
            .unwrap()
            .and_hms_opt(18, 0, 0)
            .unwrap()
    }

    fn window_of(points: &[(i64, f64)], now_min: i64) -> Window {
        let samples = points
            .iter()
            .map(|&(m, t)| Sample::complete(base() + Duration::minutes(m), t, 10.0))
            .collect();
        Window::new(base() + Duration::minutes(now_min), Duration::hours(1), samples)
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-6, "{} != {}", a, b);
    }

    #[test]
    fn test_single_window_uses_recent_span() {
        // fast early rise, slower recent rise
        let window = window_of(&[(0, 20.0), (10, 40.0), (20, 45.0), (30, 50.0)], 30);
        let trend = SingleWindowRate::default().estimate(&window).unwrap();

        // 15 minutes back from 30 reaches the point at 20
        assert_close(trend.rate_per_hour, 30.0);
        assert_eq!(trend.basis_point_count, 2);
    }

    #[test]
    fn test_single_window_widens_to_last_two_points() {
        let window = window_of(&[(0, 20.0), (40, 60.0)], 45);
        let trend = SingleWindowRate::default().estimate(&window).unwrap();

        assert_close(trend.rate_per_hour, 60.0);
        assert_eq!(trend.basis_point_count, 2);
    }

    #[test]
    fn test_fewer_than_two_points_is_undefined() {
        let single = window_of(&[(10, 50.0)], 15);
        let empty = window_of(&[], 15);

        assert!(SingleWindowRate::default().estimate(&single).is_none());
        assert!(SingleWindowRate::default().estimate(&empty).is_none());
        assert!(WeightedRegression::default().estimate(&single).is_none());
        assert!(WeightedRegression::default().estimate(&empty).is_none());
    }

    #[test]
    fn test_zero_elapsed_is_undefined() {
        let at = base();
        let points = [
            TrendPoint { at, temperature: 40.0 },
            TrendPoint { at, temperature: 45.0 },
        ];
        assert!(endpoint_rate(&points).is_none());
        assert!(least_squares_slope(&points).is_none());
    }

    #[test]
    fn test_regression_on_linear_data() {
        let points: Vec<(i64, f64)> = (0..=30).map(|m| (m, 20.0 + 2.0 * m as f64)).collect();
        let window = window_of(&points, 30);
        let trend = WeightedRegression::default().estimate(&window).unwrap();

        assert_close(trend.rate_per_hour, 120.0);
        assert_eq!(trend.basis_point_count, 31);
    }

    #[test]
    fn test_regression_weights_recent_windows() {
        // flat, then a jump in the last five minutes
        let points = [
            (0, 20.0),
            (5, 20.0),
            (10, 20.0),
            (15, 20.0),
            (20, 20.0),
            (25, 20.0),
            (30, 30.0),
        ];
        let window = window_of(&points, 30);
        let trend = WeightedRegression::default().estimate(&window).unwrap();

        let five = 120.0;
        let fifteen = 36.0;
        let thirty = 12.0 * 30.0 / 28.0;
        assert_close(trend.rate_per_hour, (3.0 * five + 2.0 * fifteen + thirty) / 6.0);
        assert_eq!(trend.basis_point_count, 7);
    }

    #[test]
    fn test_regression_skips_sparse_sub_windows() {
        let window = window_of(&[(0, 30.0), (20, 40.0)], 25);
        let trend = WeightedRegression::default().estimate(&window).unwrap();

        // only the 30 minute sub-window holds two points
        assert_close(trend.rate_per_hour, 30.0);
        assert_eq!(trend.basis_point_count, 2);
    }

    #[test]
    fn test_regression_all_sub_windows_empty() {
        let window = window_of(&[(0, 30.0), (45, 40.0)], 50);
        assert!(WeightedRegression::default().estimate(&window).is_none());
    }

    #[test]
    fn test_estimator_kind_builds_named_strategy() {
        let single = EstimatorKind::SingleWindow.build(Duration::minutes(15));
        let weighted = EstimatorKind::WeightedRegression.build(Duration::minutes(15));
        assert_eq!(single.name(), "single_window");
        assert_eq!(weighted.name(), "weighted_regression");
    }
}
