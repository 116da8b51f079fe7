//! ==============================================================================
//! prober.rs - liveness prober for the controller and the camera
//! ==============================================================================
//!
//! purpose:
//!     answers "is the controller / camera reachable right now?" on a fixed
//!     cadence without ever blocking anything else.
//!
//! behaviour:
//!     - both probes run at start and then every liveness interval (10s)
//!     - each tick's probes are their own tasks: a hung probe never holds
//!       back the next tick
//!     - failures are state transitions (-> disconnected), never errors
//!
//! camera:
//!     the camera has no health endpoint, so one frame of the live stream
//!     is requested. the frame loader and a timeout timer race; a
//!     settle-once guard lets exactly one of {frame, error, timeout} decide
//!     the attempt, and the winner aborts the loser.
//!
//! ==============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::AbortHandle;

use crate::controller::{CameraFeed, ControllerApi};
use crate::coordinator::Core;
use crate::liveness::Liveness;
use crate::scheduler::RepeatingTask;

/// start the liveness ticker; dropping the returned task stops it
pub(crate) fn spawn<C: ControllerApi, K: CameraFeed>(core: Arc<Core<C, K>>) -> RepeatingTask {
    let period = core.timing.liveness_interval;
    RepeatingTask::spawn("liveness", period, move || {
        let core = core.clone();
        async move {
            probe_camera(core.clone());
            probe_controller(&core).await;
        }
    })
}

pub(crate) async fn probe_controller<C: ControllerApi, K: CameraFeed>(core: &Core<C, K>) {
    let next = match core.controller.status().await {
        Ok(()) => Liveness::Connected,
        Err(e) => {
            tracing::debug!(target: "prober", "controller status probe failed: {:#}", e);
            Liveness::Disconnected
        }
    };
    core.while_running(|| core.esp32.set(next));
}

/// fire one camera probe attempt; the outcome lands asynchronously
pub(crate) fn probe_camera<C: ControllerApi, K: CameraFeed>(core: Arc<Core<C, K>>) {
    let attempt = Arc::new(ProbeAttempt::default());

    let timer = tokio::spawn({
        let core = core.clone();
        let attempt = attempt.clone();
        let timeout = core.timing.camera_timeout;
        let stopped = core.stopped();
        async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    if attempt.settle(Side::Timer) {
                        tracing::debug!(target: "prober", ?timeout, "camera frame timed out");
                        apply(&core, Liveness::Disconnected);
                    }
                }
                _ = stopped => {}
            }
        }
    });

    // a hung stream never ends by itself; the loader stops with the dashboard
    let loader = tokio::spawn({
        let core = core.clone();
        let attempt = attempt.clone();
        let stopped = core.stopped();
        async move {
            let frame = tokio::select! {
                frame = core.camera.first_frame() => frame,
                _ = stopped => return,
            };
            let next = match frame {
                Ok(()) => Liveness::Connected,
                Err(e) => {
                    tracing::debug!(target: "prober", "camera frame failed: {:#}", e);
                    Liveness::Disconnected
                }
            };
            if attempt.settle(Side::Loader) {
                apply(&core, next);
            }
        }
    });

    attempt.arm(loader.abort_handle(), timer.abort_handle());
}

fn apply<C: ControllerApi, K: CameraFeed>(core: &Core<C, K>, next: Liveness) {
    core.while_running(|| core.cam.set(next));
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Loader,
    Timer,
}

/// single-resolution guard for one camera probe attempt
#[derive(Default)]
struct ProbeAttempt {
    settled: AtomicBool,
    loader: Mutex<Option<AbortHandle>>,
    timer: Mutex<Option<AbortHandle>>,
}

impl ProbeAttempt {
    fn arm(&self, loader: AbortHandle, timer: AbortHandle) {
        // the race may already be over by the time the handles are stored
        if self.settled.load(Ordering::Acquire) {
            loader.abort();
            timer.abort();
            return;
        }
        if let Ok(mut slot) = self.loader.lock() {
            *slot = Some(loader);
        }
        if let Ok(mut slot) = self.timer.lock() {
            *slot = Some(timer);
        }
    }

    /// true for the first caller only; the winner cancels the other side
    fn settle(&self, by: Side) -> bool {
        if self
            .settled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let other = match by {
            Side::Loader => &self.timer,
            Side::Timer => &self.loader,
        };
        if let Some(handle) = other.lock().ok().and_then(|mut slot| slot.take()) {
            handle.abort();
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{config, CamMode, FakeCamera, FakeController};
    use std::sync::atomic::Ordering::SeqCst;
    use std::time::Duration;
    use tokio::time::sleep;

    type TestCore = Core<Arc<FakeController>, Arc<FakeCamera>>;

    fn core(mode: CamMode) -> Arc<TestCore> {
        Arc::new(Core::new(&config(), FakeController::new(), FakeCamera::new(mode)))
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn first_settle_wins() {
        let attempt = ProbeAttempt::default();
        assert!(attempt.settle(Side::Loader));
        assert!(!attempt.settle(Side::Timer));
        assert!(!attempt.settle(Side::Loader));
    }

    #[tokio::test]
    async fn controller_probe_follows_status() {
        let core = core(CamMode::Hang);

        probe_controller(&core).await;
        assert_eq!(core.esp32.get(), Liveness::Connected);

        core.controller.reachable.store(false, SeqCst);
        probe_controller(&core).await;
        assert_eq!(core.esp32.get(), Liveness::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn camera_frame_before_timeout_connects() {
        let core = core(CamMode::Frame(ms(2_000)));
        probe_camera(core.clone());

        sleep(ms(1_000)).await;
        assert_eq!(core.cam.get(), Liveness::Checking);
        sleep(ms(1_100)).await;
        assert_eq!(core.cam.get(), Liveness::Connected);

        // the timer was cancelled, nothing flips it at 10s
        sleep(ms(15_000)).await;
        assert_eq!(core.cam.get(), Liveness::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_camera_times_out() {
        let core = core(CamMode::Hang);
        probe_camera(core.clone());

        sleep(ms(9_900)).await;
        assert_eq!(core.cam.get(), Liveness::Checking);
        sleep(ms(200)).await;
        assert_eq!(core.cam.get(), Liveness::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn late_frame_after_timeout_is_ignored() {
        let core = core(CamMode::Frame(ms(12_000)));
        probe_camera(core.clone());

        sleep(ms(10_100)).await;
        assert_eq!(core.cam.get(), Liveness::Disconnected);
        sleep(ms(5_000)).await;
        assert_eq!(core.cam.get(), Liveness::Disconnected);
    }

    #[tokio::test]
    async fn status_after_teardown_is_dropped() {
        let core = core(CamMode::Hang);
        core.stop();

        probe_controller(&core).await;
        assert_eq!(core.esp32.get(), Liveness::Checking);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_camera_load_ends_with_teardown() {
        let core = core(CamMode::Hang);
        probe_camera(core.clone());
        sleep(ms(1_000)).await;
        assert_eq!(Arc::strong_count(&core), 3);

        core.stop();
        sleep(ms(120_000)).await;

        // both the timer and the loader have let go of the core
        assert_eq!(Arc::strong_count(&core), 1);
        assert_eq!(core.cam.get(), Liveness::Checking);
    }

    #[tokio::test(start_paused = true)]
    async fn camera_error_disconnects_immediately() {
        let core = core(CamMode::Fail);
        probe_camera(core.clone());

        sleep(ms(10)).await;
        assert_eq!(core.cam.get(), Liveness::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_probes_every_interval() {
        let core = core(CamMode::Frame(ms(10)));
        let _ticker = spawn(core.clone());

        sleep(ms(25_000)).await;
        assert_eq!(core.controller.status_calls.load(SeqCst), 3);
        assert_eq!(core.camera.frame_calls.load(SeqCst), 3);
        assert_eq!(core.cam.get(), Liveness::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_camera_does_not_delay_controller_checks() {
        let core = core(CamMode::Hang);
        let _ticker = spawn(core.clone());

        sleep(ms(100)).await;
        assert_eq!(core.esp32.get(), Liveness::Connected);
        assert_eq!(core.cam.get(), Liveness::Checking);

        core.controller.reachable.store(false, SeqCst);
        sleep(ms(10_000)).await;
        assert_eq!(core.esp32.get(), Liveness::Disconnected);
        assert_eq!(core.cam.get(), Liveness::Disconnected);
    }
}
