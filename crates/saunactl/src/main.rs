// Sauna Control CLI
// Commands: status, history, import, prune, fresh
//
// Works directly on the daemon's measurement store; saunad does not need to
// be running.

use anyhow::{anyhow, Context, Result};
use chrono::Duration;
use clap::{Parser, Subcommand};
use sauna_common::config::{config_path, load_config, SaunaConfig};
use sauna_common::reading::import_file;
use sauna_common::sample::{format_timestamp, local_now, Order, Window};
use sauna_common::store::SampleStore;
use serde_json::json;
use std::path::{Path, PathBuf};

mod output;

#[derive(Parser)]
#[command(name = "saunactl")]
#[command(version, about = "Sauna monitor control CLI")]
struct Cli {
    /// Config file (default: $SAUNA_CONFIG or /etc/sauna/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the database path from the config
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate the sauna state now
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show recent measurements, most recent first
    History {
        /// How far back to look
        #[arg(long, default_value = "2")]
        hours: i64,
        /// Number of rows to show
        #[arg(short, long, default_value = "8")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Import a JSON-lines history export
    Import {
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete measurements older than the retention horizon
    Prune {
        /// Retention in days (default: from config)
        #[arg(long)]
        days: Option<u32>,
    },

    /// Check whether the store has recent data (exit code 1 when stale)
    Fresh {
        /// Freshness horizon in hours (default: from config)
        #[arg(long)]
        hours: Option<i64>,
    },
}

fn main() {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            std::process::exit(2);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let path = config_path(cli.config.as_deref());
    let config = load_config(&path).with_context(|| format!("Failed to load config from {}", path.display()))?;

    let db_path = cli.db.unwrap_or_else(|| config.storage.db_path.clone());
    let store = SampleStore::open(&db_path)
        .with_context(|| format!("Failed to open store at {}", db_path.display()))?;

    match cli.command {
        Commands::Status { json } => status(&config, &store, json),
        Commands::History { hours, limit, json } => history(&store, hours, limit, json),
        Commands::Import { file, json } => import(&config, &store, &file, json),
        Commands::Prune { days } => prune(&config, &store, days),
        Commands::Fresh { hours } => fresh(&config, &store, hours),
    }
}

fn status(config: &SaunaConfig, store: &SampleStore, json: bool) -> Result<i32> {
    let now = local_now();
    let samples = store
        .query_at(now, config.lookback(), Order::Chronological)
        .context("Failed to query measurements")?;
    let window = Window::new(now, config.lookback(), samples);

    let evaluator = config.evaluator();
    let assessment = evaluator.evaluate(&window);
    let status = config.formatter().format_assessment(&assessment);

    if json {
        let value = json!({
            "assessment": assessment,
            "status": status,
            "estimator": evaluator.estimator_name(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        output::display_status(&assessment, &status, evaluator.estimator_name());
    }
    Ok(0)
}

fn history(store: &SampleStore, hours: i64, limit: usize, json: bool) -> Result<i32> {
    let mut samples = store
        .query(hours_span(hours)?, Order::MostRecentFirst)
        .context("Failed to query measurements")?;
    samples.truncate(limit);

    if json {
        println!("{}", serde_json::to_string_pretty(&samples)?);
    } else if samples.is_empty() {
        println!("No measurements in the last {} h", hours);
    } else {
        print!("{}", output::history_table(&samples));
    }
    Ok(0)
}

/// `--hours` as a duration, rejecting negative or unrepresentable spans
fn hours_span(hours: i64) -> Result<Duration> {
    if hours < 0 {
        return Err(anyhow!("--hours must not be negative (got {})", hours));
    }
    Duration::try_hours(hours).ok_or_else(|| anyhow!("--hours {} is out of range", hours))
}

fn import(config: &SaunaConfig, store: &SampleStore, file: &Path, json: bool) -> Result<i32> {
    let report = import_file(store, file, config.sensor.mac.as_deref())
        .with_context(|| format!("Failed to import {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        output::display_import(&report);
    }
    Ok(0)
}

fn prune(config: &SaunaConfig, store: &SampleStore, days: Option<u32>) -> Result<i32> {
    let days = days.unwrap_or(config.storage.retention_days);
    let removed = store.prune(days).context("Failed to prune measurements")?;
    output::print_ok(&format!("Removed {} measurements older than {} days", removed, days));
    Ok(0)
}

fn fresh(config: &SaunaConfig, store: &SampleStore, hours: Option<i64>) -> Result<i32> {
    let max_age = match hours {
        Some(hours) => hours_span(hours)?,
        None => config.freshness(),
    };
    let is_fresh = store.is_fresh(max_age).context("Failed to check freshness")?;

    let latest = store.latest().context("Failed to read latest measurement")?;
    let latest_text = latest
        .map(|s| format_timestamp(s.timestamp))
        .unwrap_or_else(|| "none".to_string());

    if is_fresh {
        output::print_ok(&format!("Data is fresh (latest {})", latest_text));
        Ok(0)
    } else {
        println!("[STALE] No data in the last {} h (latest {})", max_age.num_hours(), latest_text);
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hours_span_bounds() {
        assert_eq!(hours_span(2).unwrap(), Duration::hours(2));
        assert!(hours_span(-1).is_err());
        assert!(hours_span(i64::MAX).is_err());
    }

    #[test]
    fn test_history_with_huge_hours_lists_everything() {
        let store = SampleStore::open_in_memory().unwrap();
        let now = local_now();
        store.store(now - Duration::days(30), Some(20.0), None).unwrap();
        store.store(now - Duration::minutes(5), Some(40.0), None).unwrap();

        // far enough back to pass every representable date
        let span = hours_span(3_000_000_000).unwrap();
        let rows = store.query(span, Order::MostRecentFirst).unwrap();
        assert_eq!(rows.len(), 2);
    }
}
