//! Terminal output for saunactl

use owo_colors::OwoColorize;
use sauna_common::classifier::{Assessment, ThermalState};
use sauna_common::reading::ImportReport;
use sauna_common::sample::Sample;
use sauna_common::status::{format_minutes, StatusMessage};

const SEPARATOR: &str = "----------------------------------------";

pub fn print_error(message: &str) {
    eprintln!("[ERROR] {}", message.red());
}

pub fn print_ok(message: &str) {
    println!("[OK] {}", message.green());
}

fn state_tag(state: &ThermalState) -> String {
    let tag = format!("[{}]", state.label().to_uppercase());
    match state {
        ThermalState::Ready => tag.bright_green().bold().to_string(),
        ThermalState::Heating { .. } => tag.yellow().to_string(),
        ThermalState::Stable => tag.green().to_string(),
        ThermalState::Cooling => tag.bright_red().to_string(),
        ThermalState::Cold => tag.blue().to_string(),
        ThermalState::InsufficientData | ThermalState::Unknown => tag.dimmed().to_string(),
    }
}

pub fn display_status(assessment: &Assessment, status: &StatusMessage, estimator: &str) {
    println!();
    println!("{}  {}", state_tag(&assessment.state), status.title.bold());
    println!("    {}", status.message);
    println!("{}", SEPARATOR.dimmed());
    println!("  Temperature : {}", optional(assessment.current_temperature, "°C"));
    println!("  Humidity    : {}", optional(assessment.current_humidity, "%"));

    match assessment.trend {
        Some(trend) => println!(
            "  Trend       : {:+.1} °C/h over {} points ({})",
            trend.rate_per_hour, trend.basis_point_count, estimator
        ),
        None => println!("  Trend       : {}", "-".dimmed()),
    }

    if let (Some(eta), Some(ready)) = (assessment.state.eta_minutes(), assessment.state.expected_ready_time()) {
        println!("  Ready in    : {} (around {})", format_minutes(eta), ready.format("%H:%M"));
    }
    println!();
}

/// Recent measurements, most recent first
pub fn history_table(samples: &[Sample]) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:<10} {:>8} {:>9}\n", "Time", "Temp", "Humidity"));
    for sample in samples {
        out.push_str(&format!(
            "{:<10} {:>8} {:>9}\n",
            sample.timestamp.format("%H:%M:%S"),
            optional(sample.temperature, "°C"),
            optional(sample.humidity, "%"),
        ));
    }
    out
}

pub fn display_import(report: &ImportReport) {
    print_ok(&format!("Imported {} readings", report.stored));
    if report.skipped > 0 {
        println!("  {} lines skipped", report.skipped);
    }
    if report.malformed > 0 {
        println!("  {} lines malformed", report.malformed.yellow());
    }
}

fn optional(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{:.1}{}", v, unit),
        None => "-".to_string(),
    }
}
