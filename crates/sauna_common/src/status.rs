//! Status Formatter - thermal state to display title/message
//!
//! Pure and total: every state, and the absence of one, has a message.

use serde::{Deserialize, Serialize};

use crate::classifier::{Advisory, Assessment, ThermalState};

/// Title/message pair shown on the display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub title: String,
    pub message: String,
}

impl StatusMessage {
    fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatusFormatter {
    target_temp: f64,
}

impl StatusFormatter {
    pub fn new(target_temp: f64) -> Self {
        Self { target_temp }
    }

    /// Message for a primary state. `None` (no evaluation yet) falls back to
    /// the unknown-status message.
    pub fn format(&self, state: Option<&ThermalState>, current_temp: Option<f64>) -> StatusMessage {
        let Some(state) = state else {
            return unknown();
        };

        match state {
            ThermalState::InsufficientData => StatusMessage::new("Collecting data", "Please wait..."),
            ThermalState::Cold => StatusMessage::new("Sauna is cold", "Turn on to heat"),
            ThermalState::Stable => match current_temp {
                Some(t) if t >= self.target_temp => StatusMessage::new("Temp stable", "Enjoy your sauna"),
                _ => StatusMessage::new("Temp stable", "Add wood to increase"),
            },
            ThermalState::Ready => StatusMessage::new("Sauna is ready!", "Enjoy your sauna"),
            ThermalState::Heating { eta_minutes, .. } => StatusMessage::new(
                "Heating",
                format!(
                    "{} to {}°C",
                    format_minutes(*eta_minutes),
                    format_temp(self.target_temp)
                ),
            ),
            ThermalState::Cooling => StatusMessage::new("Temp dropping", "Add wood if needed"),
            ThermalState::Unknown => unknown(),
        }
    }

    /// Message for a full assessment, applying the drop advisory.
    ///
    /// The advisory replaces the message of every state except
    /// `InsufficientData`, which has no trend to speak of. The state itself is
    /// left untouched.
    pub fn format_assessment(&self, assessment: &Assessment) -> StatusMessage {
        let overlay = match (&assessment.advisory, &assessment.state) {
            (_, ThermalState::InsufficientData) => None,
            (Some(Advisory::TemperatureDropping { .. }), _) => {
                Some(StatusMessage::new("Temperature dropping", "Add wood to stove"))
            }
            (None, _) => None,
        };

        overlay.unwrap_or_else(|| self.format(Some(&assessment.state), assessment.current_temperature))
    }
}

fn unknown() -> StatusMessage {
    StatusMessage::new("Status unknown", "Check sauna")
}

/// `1h 25min` above an hour, `45 min` otherwise
pub fn format_minutes(minutes: i64) -> String {
    if minutes > 60 {
        format!("{}h {}min", minutes / 60, minutes % 60)
    } else {
        format!("{} min", minutes)
    }
}

/// Whole degrees print without a decimal
pub fn format_temp(temp: f64) -> String {
    if temp.fract() == 0.0 {
        format!("{:.0}", temp)
    } else {
        format!("{:.1}", temp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn formatter() -> StatusFormatter {
        StatusFormatter::new(65.0)
    }

    fn heating(eta_minutes: i64) -> ThermalState {
        ThermalState::Heating {
            eta_minutes,
            expected_ready: NaiveDate::from_ymd_opt(2024, 3, 2)
                .unwrap()
                .and_hms_opt(19, 0, 0)
                .unwrap(),
        }
    }

    fn assessment(state: ThermalState, advisory: Option<Advisory>) -> Assessment {
        Assessment {
            state,
            current_temperature: Some(55.0),
            current_humidity: Some(12.0),
            trend: None,
            advisory,
            evaluated_at: NaiveDate::from_ymd_opt(2024, 3, 2)
                .unwrap()
                .and_hms_opt(18, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_state_table() {
        let f = formatter();
        let cases = [
            (ThermalState::InsufficientData, "Collecting data", "Please wait..."),
            (ThermalState::Cold, "Sauna is cold", "Turn on to heat"),
            (ThermalState::Ready, "Sauna is ready!", "Enjoy your sauna"),
            (ThermalState::Cooling, "Temp dropping", "Add wood if needed"),
            (ThermalState::Unknown, "Status unknown", "Check sauna"),
        ];

        for (state, title, message) in cases {
            let status = f.format(Some(&state), Some(50.0));
            assert_eq!(status.title, title);
            assert_eq!(status.message, message);
        }
    }

    #[test]
    fn test_missing_state_falls_back() {
        let status = formatter().format(None, None);
        assert_eq!(status, StatusMessage::new("Status unknown", "Check sauna"));
    }

    #[test]
    fn test_stable_depends_on_target() {
        let f = formatter();
        assert_eq!(f.format(Some(&ThermalState::Stable), Some(60.0)).message, "Add wood to increase");
        assert_eq!(f.format(Some(&ThermalState::Stable), Some(65.0)).message, "Enjoy your sauna");
        assert_eq!(f.format(Some(&ThermalState::Stable), None).message, "Add wood to increase");
    }

    #[test]
    fn test_heating_eta_rendering() {
        let f = formatter();
        assert_eq!(f.format(Some(&heating(45)), None).message, "45 min to 65°C");
        assert_eq!(f.format(Some(&heating(60)), None).message, "60 min to 65°C");
        assert_eq!(f.format(Some(&heating(61)), None).message, "1h 1min to 65°C");
        assert_eq!(f.format(Some(&heating(135)), None).message, "2h 15min to 65°C");
        assert_eq!(f.format(Some(&heating(45)), None).title, "Heating");
    }

    #[test]
    fn test_fractional_target() {
        let f = StatusFormatter::new(72.5);
        assert_eq!(f.format(Some(&heating(10)), None).message, "10 min to 72.5°C");
    }

    #[test]
    fn test_advisory_overrides_active_states() {
        let f = formatter();
        let dropping = Some(Advisory::TemperatureDropping { rate_per_hour: -12.0 });

        for state in [
            ThermalState::Cooling,
            ThermalState::Stable,
            ThermalState::Ready,
            ThermalState::Cold,
            ThermalState::Unknown,
            heating(30),
        ] {
            let status = f.format_assessment(&assessment(state, dropping));
            assert_eq!(status.title, "Temperature dropping");
            assert_eq!(status.message, "Add wood to stove");
        }
    }

    #[test]
    fn test_advisory_suppressed_while_collecting() {
        let f = formatter();
        let dropping = Some(Advisory::TemperatureDropping { rate_per_hour: -12.0 });

        let collecting = f.format_assessment(&assessment(ThermalState::InsufficientData, dropping));
        assert_eq!(collecting.title, "Collecting data");
        assert_eq!(collecting.message, "Please wait...");
    }

    #[test]
    fn test_no_advisory_uses_state_message() {
        let status = formatter().format_assessment(&assessment(ThermalState::Cooling, None));
        assert_eq!(status.title, "Temp dropping");
        assert_eq!(status.message, "Add wood if needed");
    }
}
