//! in-memory stand-ins for the controller and the camera

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering::SeqCst};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;

use crate::config::DashboardConfig;
use crate::controller::{CameraFeed, ControllerApi};
use crate::domain::{DataResponse, SensorReading, Thresholds};

pub(crate) fn config() -> DashboardConfig {
    DashboardConfig::default()
}

/// a controller the test can flip between healthy and broken
pub(crate) struct FakeController {
    pub reachable: AtomicBool,
    pub data_ok: AtomicBool,
    pub set_ok: AtomicBool,
    pub status_calls: AtomicU32,
    pub data_calls: AtomicU32,
    pub set_calls: AtomicU32,
    reading: Mutex<SensorReading>,
    limits: Mutex<Thresholds>,
    /// per-call (delay, inside temp) overrides for /data, consumed in order
    scripted: Mutex<VecDeque<(Duration, f64)>>,
}

/// the fake firmware refuses temperature limits above this
pub(crate) const MAX_TEMP_LIMIT: f64 = 33.0;

impl FakeController {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            reachable: AtomicBool::new(true),
            data_ok: AtomicBool::new(true),
            set_ok: AtomicBool::new(true),
            status_calls: AtomicU32::new(0),
            data_calls: AtomicU32::new(0),
            set_calls: AtomicU32::new(0),
            reading: Mutex::new(reading(25.0, 55.0)),
            limits: Mutex::new(Thresholds { temp: 30.0, moist: 40.0 }),
            scripted: Mutex::new(VecDeque::new()),
        })
    }

    pub fn set_reading(&self, inside_temp: f64, moisture: f64) {
        *self.reading.lock().unwrap() = reading(inside_temp, moisture);
    }

    pub fn script(&self, delay: Duration, inside_temp: f64) {
        self.scripted.lock().unwrap().push_back((delay, inside_temp));
    }
}

pub(crate) fn reading(inside_temp: f64, moisture: f64) -> SensorReading {
    SensorReading {
        inside_temp,
        outside_temp: 21.0,
        inside_humidity: 60.0,
        outside_humidity: 52.0,
        moisture,
        light: "Bright".to_string(),
        rain: false,
        valve: false,
        fan: inside_temp > 30.0,
        shed: false,
    }
}

impl ControllerApi for Arc<FakeController> {
    fn status(&self) -> impl Future<Output = Result<()>> + Send {
        async move {
            self.status_calls.fetch_add(1, SeqCst);
            if self.reachable.load(SeqCst) {
                Ok(())
            } else {
                anyhow::bail!("connection refused")
            }
        }
    }

    fn data(&self) -> impl Future<Output = Result<DataResponse>> + Send {
        async move {
            self.data_calls.fetch_add(1, SeqCst);
            let scripted = self.scripted.lock().unwrap().pop_front();
            if let Some((delay, _)) = scripted {
                tokio::time::sleep(delay).await;
            }
            if !self.data_ok.load(SeqCst) {
                anyhow::bail!("connection reset");
            }
            let mut sensors = self.reading.lock().unwrap().clone();
            if let Some((_, temp)) = scripted {
                sensors.inside_temp = temp;
            }
            let thresholds = *self.limits.lock().unwrap();
            Ok(DataResponse { sensors, thresholds })
        }
    }

    fn set_thresholds(&self, temp: f64, moist: f64) -> impl Future<Output = Result<()>> + Send {
        async move {
            self.set_calls.fetch_add(1, SeqCst);
            if !self.set_ok.load(SeqCst) {
                anyhow::bail!("500 Internal Server Error");
            }
            *self.limits.lock().unwrap() = Thresholds { temp: temp.min(MAX_TEMP_LIMIT), moist };
            Ok(())
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum CamMode {
    /// a frame arrives after the delay
    Frame(Duration),
    Fail,
    /// the stream never answers
    Hang,
}

pub(crate) struct FakeCamera {
    pub mode: Mutex<CamMode>,
    pub frame_calls: AtomicU32,
}

impl FakeCamera {
    pub fn new(mode: CamMode) -> Arc<Self> {
        Arc::new(Self { mode: Mutex::new(mode), frame_calls: AtomicU32::new(0) })
    }
}

impl CameraFeed for Arc<FakeCamera> {
    fn first_frame(&self) -> impl Future<Output = Result<()>> + Send {
        async move {
            self.frame_calls.fetch_add(1, SeqCst);
            let mode = *self.mode.lock().unwrap();
            match mode {
                CamMode::Frame(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(())
                }
                CamMode::Fail => anyhow::bail!("stream refused"),
                CamMode::Hang => std::future::pending().await,
            }
        }
    }
}
