//! Sauna Common - shared types for saunad and saunactl
//!
//! Sample store, trend estimation, state classification and status text.
//! Everything here is synchronous; the daemon owns scheduling.

pub mod classifier;
pub mod config;
pub mod error;
pub mod reading;
pub mod sample;
pub mod status;
pub mod store;
pub mod trend;

pub use classifier::{classify, Advisory, Assessment, DropAdvisory, Evaluator, ThermalState, Thresholds};
pub use config::{load_config, SaunaConfig};
pub use error::{ConfigError, ImportError, ReadingError, StorageError};
pub use reading::{import_file, import_lines, parse_line, ImportReport, Reading};
pub use sample::{Order, Sample, TrendPoint, Window};
pub use status::{StatusFormatter, StatusMessage};
pub use store::SampleStore;
pub use trend::{EstimatorKind, SingleWindowRate, TrendEstimator, TrendResult, WeightedRegression};
