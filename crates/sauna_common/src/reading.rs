//! Readings emitted by the sensor bridge
//!
//! The bridge (BLE scanner, history downloader) writes one JSON object per
//! line:
//!
//! ```text
//! {"mac": "AA:BB:CC:DD:EE:FF", "temperature": 54.2, "humidity": 11.5}
//! {"timestamp": "2024-03-02 18:04:00", "temperature": 51.0}
//! {"timestamp": "2024-03-02 18:04:00", "humidity": 12.25}
//! ```
//!
//! A line without a timestamp is a live broadcast and is stamped on arrival.
//! A line with a timestamp is historical and may carry only one field.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::warn;

use crate::error::{ImportError, ReadingError};
use crate::sample::{local_now, parse_timestamp, Sample};
use crate::store::SampleStore;

#[derive(Debug, Deserialize)]
struct RawReading {
    mac: Option<String>,
    timestamp: Option<String>,
    temperature: Option<f64>,
    humidity: Option<f64>,
}

/// A decoded reading and whether it was live or historical
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub sample: Sample,
    pub live: bool,
}

/// Parse one bridge line.
///
/// Returns `Ok(None)` for lines that carry nothing to store: blank lines,
/// `#` comments, readings from another sensor, or readings with neither
/// temperature nor humidity.
pub fn parse_line(
    line: &str,
    mac_filter: Option<&str>,
    now: NaiveDateTime,
) -> Result<Option<Reading>, ReadingError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let raw: RawReading = serde_json::from_str(line)?;

    if let (Some(wanted), Some(mac)) = (mac_filter, raw.mac.as_deref()) {
        if !wanted.eq_ignore_ascii_case(mac) {
            return Ok(None);
        }
    }

    check_finite("temperature", raw.temperature)?;
    check_finite("humidity", raw.humidity)?;

    let (timestamp, live) = match raw.timestamp.as_deref() {
        Some(text) => (parse_timestamp(text)?, false),
        None => (now, true),
    };

    let sample = Sample::new(timestamp, raw.temperature, raw.humidity);
    if sample.is_empty() {
        return Ok(None);
    }

    Ok(Some(Reading { sample, live }))
}

fn check_finite(field: &'static str, value: Option<f64>) -> Result<(), ReadingError> {
    match value {
        Some(v) if !v.is_finite() => Err(ReadingError::NonFinite { field }),
        _ => Ok(()),
    }
}

/// Outcome of a history import
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub stored: usize,
    /// Lines with nothing to store, or live readings without a timestamp
    pub skipped: usize,
    pub malformed: usize,
}

/// Store every timestamped reading from a JSON-lines history export.
///
/// Untimestamped lines are skipped: a history file has no arrival time to
/// stamp them with. Partial records merge with whatever is already stored.
pub fn import_lines<R: BufRead>(
    store: &SampleStore,
    reader: R,
    mac_filter: Option<&str>,
) -> Result<ImportReport, ImportError> {
    let now = local_now();
    let mut report = ImportReport::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        match parse_line(&line, mac_filter, now) {
            Ok(Some(reading)) if !reading.live => {
                store.store_sample(&reading.sample)?;
                report.stored += 1;
            }
            Ok(_) => report.skipped += 1,
            Err(e) => {
                warn!("History line {}: {}", index + 1, e);
                report.malformed += 1;
            }
        }
    }

    Ok(report)
}

pub fn import_file(
    store: &SampleStore,
    path: &Path,
    mac_filter: Option<&str>,
) -> Result<ImportReport, ImportError> {
    let file = File::open(path)?;
    import_lines(store, BufReader::new(file), mac_filter)
}
