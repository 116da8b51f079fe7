//! farm-link: liveness tracking and data polling for a farm-monitoring rig.
//!
//! the controller's sensor API and its camera stream are probed
//! independently; sensor data is only polled while the controller answers,
//! and every applied reading re-derives the active alert set.

pub mod config;
pub mod controller;
pub mod coordinator;
pub mod domain;
pub mod evaluator;
pub mod liveness;
mod prober;
pub mod scheduler;
pub mod server;

#[cfg(test)]
pub(crate) mod testing;

pub use config::DashboardConfig;
pub use controller::{CameraFeed, ControllerApi, HttpCamera, HttpController};
pub use coordinator::{Dashboard, DashboardHandle, FetchOutcome};
pub use domain::{Alert, AlertKind, SensorReading, Snapshot, Thresholds};
pub use liveness::Liveness;
