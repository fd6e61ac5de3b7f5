//! Display output
//!
//! Pixel layout belongs to the display process. The daemon hands it a
//! [`Frame`]: the values, the status text and a recent series for the graph
//! and the measurement table.

use sauna_common::classifier::Assessment;
use sauna_common::sample::{format_timestamp, Sample};
use sauna_common::status::StatusMessage;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to write status file: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Everything a display needs for one refresh
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub title: String,
    pub message: String,
    pub state: &'static str,
    pub eta_minutes: Option<i64>,
    pub expected_ready: Option<String>,
    pub rate_per_hour: Option<f64>,
    pub updated_at: String,
    /// Most recent first
    pub series: Vec<Sample>,
}

impl Frame {
    pub fn new(assessment: &Assessment, status: StatusMessage, series: Vec<Sample>) -> Self {
        Self {
            temperature: assessment.current_temperature,
            humidity: assessment.current_humidity,
            title: status.title,
            message: status.message,
            state: assessment.state.label(),
            eta_minutes: assessment.state.eta_minutes(),
            expected_ready: assessment.state.expected_ready_time().map(format_timestamp),
            rate_per_hour: assessment.trend.map(|t| t.rate_per_hour),
            updated_at: format_timestamp(assessment.evaluated_at),
            series,
        }
    }
}

pub trait Renderer: Send {
    fn render(&mut self, frame: &Frame) -> Result<(), RenderError>;

    /// Blank or power down the display until the next `render`
    fn sleep(&mut self) -> Result<(), RenderError>;
}

/// Logs status changes; used when no display is attached
#[derive(Debug, Default)]
pub struct LogRenderer {
    last: Option<(String, String)>,
}

impl Renderer for LogRenderer {
    fn render(&mut self, frame: &Frame) -> Result<(), RenderError> {
        let current = (frame.title.clone(), frame.message.clone());
        if self.last.as_ref() != Some(&current) {
            info!(
                "[EVAL] {}: {} (temp={:?} humidity={:?})",
                frame.title, frame.message, frame.temperature, frame.humidity
            );
            self.last = Some(current);
        }
        Ok(())
    }

    fn sleep(&mut self) -> Result<(), RenderError> {
        info!("[EVAL] Display sleeping");
        self.last = None;
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusFile<'a> {
    asleep: bool,
    #[serde(flatten)]
    frame: Option<&'a Frame>,
}

/// Writes the frame as JSON for an external display process.
///
/// The file is replaced atomically so the reader never sees a partial write.
#[derive(Debug, Clone)]
pub struct StatusFileRenderer {
    path: PathBuf,
}

impl StatusFileRenderer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn write(&self, contents: &StatusFile<'_>) -> Result<(), RenderError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_vec_pretty(contents)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl Renderer for StatusFileRenderer {
    fn render(&mut self, frame: &Frame) -> Result<(), RenderError> {
        self.write(&StatusFile { asleep: false, frame: Some(frame) })
    }

    fn sleep(&mut self) -> Result<(), RenderError> {
        self.write(&StatusFile { asleep: true, frame: None })
    }
}
