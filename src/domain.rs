//! ==============================================================================
//! domain.rs - data model shared by the prober, coordinator and views
//! ==============================================================================
//!
//! purpose:
//!     the shapes that travel between the controller and the dashboard.
//!     a reading is captured atomically by one fetch and replaced wholesale
//!     by the next one; nothing here is ever patched in place.
//!
//! relationships:
//!     - produced by: controller.rs (deserialised from GET /data)
//!     - consumed by: evaluator.rs (alerts), coordinator.rs (read-model)
//!     - serialised by: server.rs (snapshot json for the views)
//!
//! ==============================================================================

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer, Unexpected, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::liveness::Liveness;

/// one atomic snapshot of every sensor and actuator on the rig
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    /// greenhouse air temperature in celsius
    pub inside_temp: f64,
    /// ambient temperature in celsius
    pub outside_temp: f64,
    /// relative humidity inside (0-100%)
    pub inside_humidity: f64,
    /// relative humidity outside (0-100%)
    pub outside_humidity: f64,
    /// soil moisture (0-100%)
    pub moisture: f64,
    /// categorical light level as reported by the controller (e.g. "Bright")
    pub light: String,
    #[serde(deserialize_with = "flag")]
    pub rain: bool,
    /// irrigation valve open
    #[serde(deserialize_with = "flag")]
    pub valve: bool,
    /// cooling fan running
    #[serde(deserialize_with = "flag")]
    pub fan: bool,
    /// shed door open
    #[serde(deserialize_with = "flag")]
    pub shed: bool,
}

/// alerting limits, owned by the controller
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// alert when inside temperature is strictly above this
    #[serde(deserialize_with = "number_or_string")]
    pub temp: f64,
    /// alert when soil moisture is strictly below this
    #[serde(deserialize_with = "number_or_string")]
    pub moist: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { temp: 30.0, moist: 40.0 }
    }
}

/// body of GET /data
#[derive(Clone, Debug, Deserialize)]
pub struct DataResponse {
    pub sensors: SensorReading,
    pub thresholds: Thresholds,
}

/// alert category; doubles as the stable alert id
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    TemperatureHigh,
    MoistureLow,
}

impl AlertKind {
    pub fn id(self) -> &'static str {
        match self {
            AlertKind::TemperatureHigh => "temperature-high",
            AlertKind::MoistureLow => "moisture-low",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
}

/// a derived notice that the current reading breaches a threshold
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Alert {
    pub id: &'static str,
    /// same category as `id`; not repeated on the wire
    #[serde(skip_serializing)]
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// read-only view handed to the dashboard screens
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub sensor_data: Option<SensorReading>,
    pub esp32_status: Liveness,
    pub cam_status: Liveness,
    pub thresholds: Thresholds,
    pub last_update: Option<DateTime<Utc>>,
    pub alerts: Vec<Alert>,
}

// ==============================================================================
// lenient field parsers
// ==============================================================================
// the controller firmware reports actuators as 0/1 and thresholds as
// decimal strings ("30.0"); both shapes are accepted alongside plain json.

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    struct FlagVisitor;

    impl<'de> Visitor<'de> for FlagVisitor {
        type Value = bool;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a boolean or 0/1")
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<bool, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<bool, E> {
            match v {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(E::invalid_value(Unexpected::Unsigned(v), &self)),
            }
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<bool, E> {
            match v {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(E::invalid_value(Unexpected::Signed(v), &self)),
            }
        }
    }

    deserializer.deserialize_any(FlagVisitor)
}

fn number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    struct NumberVisitor;

    impl<'de> Visitor<'de> for NumberVisitor {
        type Value = f64;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a number or a decimal string")
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
            v.trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .ok_or_else(|| E::invalid_value(Unexpected::Str(v), &self))
        }
    }

    deserializer.deserialize_any(NumberVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "sensors": {
            "insideTemp": 32, "outsideTemp": 24.5,
            "insideHumidity": 61, "outsideHumidity": 48.2,
            "moisture": 55, "light": "Bright",
            "rain": 0, "valve": 1, "fan": true, "shed": 0
        },
        "thresholds": { "temp": "30.0", "moist": "40" }
    }"#;

    #[test]
    fn parses_controller_payload() {
        let body: DataResponse = serde_json::from_str(BODY).unwrap();

        assert_eq!(body.sensors.inside_temp, 32.0);
        assert_eq!(body.sensors.light, "Bright");
        assert!(!body.sensors.rain);
        assert!(body.sensors.valve);
        assert!(body.sensors.fan);
        assert_eq!(body.thresholds, Thresholds { temp: 30.0, moist: 40.0 });
    }

    #[test]
    fn numeric_thresholds_are_accepted() {
        let t: Thresholds = serde_json::from_str(r#"{"temp": 28.5, "moist": 35}"#).unwrap();
        assert_eq!(t, Thresholds { temp: 28.5, moist: 35.0 });
    }

    #[test]
    fn garbage_threshold_is_malformed() {
        assert!(serde_json::from_str::<Thresholds>(r#"{"temp": "hot", "moist": "40"}"#).is_err());
    }

    #[test]
    fn out_of_range_flag_is_malformed() {
        let body = BODY.replace(r#""valve": 1"#, r#""valve": 7"#);
        assert!(serde_json::from_str::<DataResponse>(&body).is_err());
    }

    #[test]
    fn missing_sensor_field_is_malformed() {
        let body = BODY.replace(r#""moisture": 55, "#, "");
        assert!(serde_json::from_str::<DataResponse>(&body).is_err());
    }

    #[test]
    fn snapshot_uses_view_field_names() {
        let snap = Snapshot {
            sensor_data: None,
            esp32_status: Liveness::Checking,
            cam_status: Liveness::Disconnected,
            thresholds: Thresholds::default(),
            last_update: None,
            alerts: Vec::new(),
        };
        let json = serde_json::to_value(&snap).unwrap();

        assert_eq!(json["esp32Status"], "checking");
        assert_eq!(json["camStatus"], "disconnected");
        assert_eq!(json["thresholds"]["temp"], 30.0);
        assert!(json["sensorData"].is_null());
        assert!(json["lastUpdate"].is_null());
    }

    #[test]
    fn alert_names_its_category_once() {
        let alert = Alert {
            id: AlertKind::MoistureLow.id(),
            kind: AlertKind::MoistureLow,
            severity: Severity::Warning,
            message: "Low soil moisture: 20%".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&alert).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();

        assert_eq!(json["id"], "moisture-low");
        assert_eq!(json["severity"], "warning");
        assert!(!keys.contains(&"kind"));
        assert_eq!(keys.len(), 4);
    }
}
