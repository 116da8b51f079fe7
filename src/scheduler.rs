//! ==============================================================================
//! scheduler.rs - cancellable repeating tasks
//! ==============================================================================
//!
//! purpose:
//!     the ticking backbone of the dashboard: the 10s liveness poll and the
//!     3s data poll are both a RepeatingTask.
//!
//! behaviour:
//!     - the first tick fires immediately, then once per period
//!     - every tick's work is spawned as its own task, so a hung probe or a
//!       slow fetch never delays the next tick
//!     - cancelling (or dropping) the task stops the ticker at once; work
//!       that already started is left to finish and guards its own effects
//!
//! ==============================================================================

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

pub struct RepeatingTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl RepeatingTask {
    /// start ticking `tick` every `period`, beginning now
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        tracing::debug!(target: "scheduler", task = name, ?period, "started");
        let handle = tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tokio::spawn(tick());
            }
        });
        Self { name, handle }
    }

    pub fn cancel(&self) {
        if !self.handle.is_finished() {
            tracing::debug!(target: "scheduler", task = self.name, "cancelled");
        }
        self.handle.abort();
    }
}

impl Drop for RepeatingTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
