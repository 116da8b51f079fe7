//! ==============================================================================
//! coordinator.rs - dashboard context and polling coordinator
//! ==============================================================================
//!
//! purpose:
//!     owns the read-model (reading, thresholds, alerts, last update) and
//!     decides when to fetch it. one Dashboard is one independent context:
//!     created by start(), torn down by shutdown() or drop. nothing here is
//!     global, so several rigs (or several tests) can run side by side.
//!
//! relationships:
//!     - uses: prober.rs (liveness ticker), scheduler.rs (data poll ticker)
//!     - uses: evaluator.rs (alerts derived from every applied reading)
//!     - used by: server.rs and main.rs through DashboardHandle
//!
//! scheduling:
//!
//! ```text
//!     esp32 liveness ──watch──► supervisor ──► Start / Stop / Keep
//!                                                 │
//!                                       RepeatingTask (3s) ──► fetch_data()
//!
//!     the data poll only exists while the controller is connected; it is
//!     rebuilt from scratch (immediate first fetch) on every reconnection.
//! ```
//!
//! ordering:
//!     every fetch takes a sequence number when issued. a completion older
//!     than the one already applied is dropped, so a slow early fetch can
//!     never overwrite a faster later one.
//!
//! ==============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

use crate::config::DashboardConfig;
use crate::controller::{CameraFeed, ControllerApi};
use crate::domain::{Alert, SensorReading, Snapshot, Thresholds};
use crate::evaluator::{evaluate, AlertPreferences};
use crate::liveness::{Liveness, LivenessCell, Tracked};
use crate::prober;
use crate::scheduler::RepeatingTask;

// ==============================================================================
// shared core
// ==============================================================================

/// what a single fetch did; informational only, never an error
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchOutcome {
    /// controller not connected, nothing requested
    Skipped,
    /// new reading published
    Applied,
    /// a newer fetch had already been applied
    Stale,
    /// request failed; controller marked disconnected
    Failed,
    /// completed after teardown
    Discarded,
}

/// the bundle views must never see half-updated
struct ReadModel {
    reading: Option<SensorReading>,
    thresholds: Thresholds,
    alerts: Vec<Alert>,
    last_update: Option<DateTime<Utc>>,
    preferences: AlertPreferences,
    /// sequence number of the fetch that produced this model
    applied: u64,
}

pub(crate) struct Timing {
    pub(crate) liveness_interval: Duration,
    pub(crate) data_interval: Duration,
    pub(crate) camera_timeout: Duration,
}

pub(crate) struct Core<C, K> {
    pub(crate) controller: C,
    pub(crate) camera: K,
    pub(crate) esp32: LivenessCell,
    pub(crate) cam: LivenessCell,
    pub(crate) timing: Timing,
    show_sensor_data: bool,
    model: RwLock<ReadModel>,
    issued: AtomicU64,
    shutdown: watch::Sender<bool>,
}

impl<C: ControllerApi, K: CameraFeed> Core<C, K> {
    pub(crate) fn new(config: &DashboardConfig, controller: C, camera: K) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            controller,
            camera,
            esp32: LivenessCell::new("esp32"),
            cam: LivenessCell::new("camera"),
            timing: Timing {
                liveness_interval: config.polling.liveness_interval(),
                data_interval: config.polling.data_interval(),
                camera_timeout: config.camera.probe_timeout(),
            },
            show_sensor_data: config.logging.show_sensor_data,
            model: RwLock::new(ReadModel {
                reading: None,
                thresholds: config.thresholds,
                alerts: Vec::new(),
                last_update: None,
                preferences: config.alerts,
                applied: 0,
            }),
            issued: AtomicU64::new(0),
            shutdown,
        }
    }

    /// resolves when the dashboard is torn down
    pub(crate) fn stopped(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.shutdown.subscribe();
        async move {
            let _ = rx.wait_for(|stopped| *stopped).await;
        }
    }

    /// run `apply` only if the dashboard is still up; teardown waits for it
    pub(crate) fn while_running<R>(&self, apply: impl FnOnce() -> R) -> Option<R> {
        // holding the borrow blocks stop() until the write has landed
        let stopped = self.shutdown.borrow();
        if *stopped {
            return None;
        }
        Some(apply())
    }

    pub(crate) fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    async fn fetch_data(&self) -> FetchOutcome {
        if self.esp32.get() != Liveness::Connected {
            return FetchOutcome::Skipped;
        }

        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        match self.controller.data().await {
            Ok(body) => {
                let now = Utc::now();
                let mut model = self.model.write().await;
                let outcome = self.while_running(|| {
                    if seq < model.applied {
                        tracing::debug!(target: "coordinator", seq, applied = model.applied, "stale fetch dropped");
                        return FetchOutcome::Stale;
                    }
                    let alerts = model
                        .preferences
                        .filter(evaluate(&body.sensors, &body.thresholds, now));
                    if self.show_sensor_data {
                        let r = &body.sensors;
                        tracing::info!(
                            target: "coordinator",
                            "[ESP32] Temp: {:.1}°C | Humidity: {:.1}% | Moisture: {:.0}% | Alerts: {}",
                            r.inside_temp, r.inside_humidity, r.moisture, alerts.len()
                        );
                    }
                    model.reading = Some(body.sensors);
                    model.thresholds = body.thresholds;
                    model.alerts = alerts;
                    model.last_update = Some(now);
                    model.applied = seq;
                    FetchOutcome::Applied
                });
                outcome.unwrap_or(FetchOutcome::Discarded)
            }
            Err(e) => {
                tracing::warn!(target: "coordinator", seq, "fetch failed: {:#}", e);
                self.while_running(|| self.esp32.set(Liveness::Disconnected))
                    .map_or(FetchOutcome::Discarded, |_| FetchOutcome::Failed)
            }
        }
    }

    async fn update_thresholds(&self, temp: f64, moist: f64) -> Result<()> {
        anyhow::ensure!(
            temp.is_finite() && moist.is_finite(),
            "thresholds must be finite numbers (got temp={}, moist={})",
            temp,
            moist
        );

        match self.controller.set_thresholds(temp, moist).await {
            Ok(()) => {
                tracing::info!(target: "coordinator", temp, moist, "thresholds written");
                // reconcile with whatever the controller actually stored
                self.fetch_data().await;
                Ok(())
            }
            Err(e) => {
                self.while_running(|| self.esp32.set(Liveness::Disconnected));
                Err(e.context("threshold update did not take effect"))
            }
        }
    }

    /// swap the alert toggles and re-derive the current alert set with them
    async fn set_alert_preferences(&self, preferences: AlertPreferences) {
        let mut model = self.model.write().await;
        let ReadModel { reading, thresholds, alerts, last_update, .. } = &mut *model;
        if let (Some(reading), Some(at)) = (reading.as_ref(), *last_update) {
            *alerts = preferences.filter(evaluate(reading, thresholds, at));
        }
        model.preferences = preferences;
        tracing::info!(target: "coordinator", ?preferences, "alert preferences changed");
    }

    async fn snapshot(&self) -> Snapshot {
        let model = self.model.read().await;
        Snapshot {
            sensor_data: model.reading.clone(),
            esp32_status: self.esp32.get(),
            cam_status: self.cam.get(),
            thresholds: model.thresholds,
            last_update: model.last_update,
            alerts: model.alerts.clone(),
        }
    }
}

// ==============================================================================
// poll supervisor - liveness transitions drive the data poll
// ==============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PollAction {
    /// (re)build the data poll, first fetch immediately
    Start,
    /// tear the data poll down
    Stop,
    Keep,
}

/// transition table; `prev` is the last value the supervisor acted on
pub(crate) fn poll_transition(prev: Tracked, next: Tracked) -> PollAction {
    let was = prev.state == Liveness::Connected;
    let is = next.state == Liveness::Connected;
    match (was, is) {
        (false, true) => PollAction::Start,
        (true, false) => PollAction::Stop,
        // left and came back between two wake-ups
        (true, true) if next.transitions != prev.transitions => PollAction::Start,
        _ => PollAction::Keep,
    }
}

fn spawn_data_poll<C: ControllerApi, K: CameraFeed>(core: Arc<Core<C, K>>) -> RepeatingTask {
    let period = core.timing.data_interval;
    RepeatingTask::spawn("data-poll", period, move || {
        let core = core.clone();
        async move {
            core.fetch_data().await;
        }
    })
}

async fn supervise<C: ControllerApi, K: CameraFeed>(core: Arc<Core<C, K>>) {
    let mut rx = core.esp32.subscribe();
    let mut seen = Tracked { state: Liveness::Checking, transitions: 0 };
    let mut poller: Option<RepeatingTask> = None;

    loop {
        let next = *rx.borrow_and_update();
        match poll_transition(seen, next) {
            PollAction::Start => poller = Some(spawn_data_poll(core.clone())),
            PollAction::Stop => poller = None,
            PollAction::Keep => {}
        }
        seen = next;

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = core.stopped() => break,
        }
    }

    drop(poller);
}

// ==============================================================================
// public surface
// ==============================================================================

/// cheap, cloneable view of one dashboard
pub struct DashboardHandle<C, K> {
    core: Arc<Core<C, K>>,
}

impl<C, K> Clone for DashboardHandle<C, K> {
    fn clone(&self) -> Self {
        Self { core: self.core.clone() }
    }
}

impl<C: ControllerApi, K: CameraFeed> DashboardHandle<C, K> {
    pub async fn snapshot(&self) -> Snapshot {
        self.core.snapshot().await
    }

    pub fn esp32_status(&self) -> Liveness {
        self.core.esp32.get()
    }

    pub fn cam_status(&self) -> Liveness {
        self.core.cam.get()
    }

    /// fetch once now; a no-op unless the controller is connected
    pub async fn fetch_data(&self) -> FetchOutcome {
        self.core.fetch_data().await
    }

    pub async fn alert_preferences(&self) -> AlertPreferences {
        self.core.model.read().await.preferences
    }

    pub async fn set_alert_preferences(&self, preferences: AlertPreferences) {
        self.core.set_alert_preferences(preferences).await
    }

    /// write new limits to the controller, then re-read them
    pub async fn update_thresholds(&self, temp: f64, moist: f64) -> Result<()> {
        self.core.update_thresholds(temp, moist).await
    }
}

/// a running dashboard: the liveness ticker plus the poll supervisor
pub struct Dashboard<C: ControllerApi, K: CameraFeed> {
    handle: DashboardHandle<C, K>,
    _prober: RepeatingTask,
    supervisor: JoinHandle<()>,
}

impl<C: ControllerApi, K: CameraFeed> Dashboard<C, K> {
    /// must be called from within a tokio runtime
    pub fn start(config: &DashboardConfig, controller: C, camera: K) -> Self {
        let core = Arc::new(Core::new(config, controller, camera));
        let supervisor = tokio::spawn(supervise(core.clone()));
        let prober = prober::spawn(core.clone());
        tracing::info!(target: "coordinator", "dashboard started");
        Self {
            handle: DashboardHandle { core },
            _prober: prober,
            supervisor,
        }
    }

    pub fn handle(&self) -> DashboardHandle<C, K> {
        self.handle.clone()
    }

    pub fn shutdown(self) {
        drop(self);
    }
}

impl<C: ControllerApi, K: CameraFeed> Drop for Dashboard<C, K> {
    fn drop(&mut self) {
        self.handle.core.stop();
        self.supervisor.abort();
        tracing::info!(target: "coordinator", "dashboard stopped");
    }
}
