//! threshold evaluation: a reading plus limits in, the active alert set out.
//!
//! pure and synchronous. the creation time is passed in rather than read
//! from the clock so identical inputs always give identical output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Alert, AlertKind, SensorReading, Severity, Thresholds};

/// alerts currently breached by `reading`, temperature first
pub fn evaluate(reading: &SensorReading, thresholds: &Thresholds, at: DateTime<Utc>) -> Vec<Alert> {
    let mut alerts = Vec::with_capacity(2);

    if reading.inside_temp > thresholds.temp {
        alerts.push(alert(
            AlertKind::TemperatureHigh,
            format!("High temperature detected: {}°C", reading.inside_temp),
            at,
        ));
    }
    if reading.moisture < thresholds.moist {
        alerts.push(alert(
            AlertKind::MoistureLow,
            format!("Low soil moisture: {}%", reading.moisture),
            at,
        ));
    }

    alerts
}

fn alert(kind: AlertKind, message: String, at: DateTime<Utc>) -> Alert {
    Alert {
        id: kind.id(),
        kind,
        severity: Severity::Warning,
        message,
        timestamp: at,
    }
}

/// per-category notification toggles from the settings screen
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertPreferences {
    #[serde(default = "enabled")]
    pub temperature: bool,
    #[serde(default = "enabled")]
    pub moisture: bool,
}

fn enabled() -> bool {
    true
}

impl Default for AlertPreferences {
    fn default() -> Self {
        Self { temperature: true, moisture: true }
    }
}

impl AlertPreferences {
    /// drop muted categories, keeping order
    pub fn filter(&self, alerts: Vec<Alert>) -> Vec<Alert> {
        alerts
            .into_iter()
            .filter(|a| match a.kind {
                AlertKind::TemperatureHigh => self.temperature,
                AlertKind::MoistureLow => self.moisture,
            })
            .collect()
    }
}
