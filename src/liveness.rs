//! reachability state for one remote endpoint.
//!
//! a cell is a `watch` channel: readers borrow the latest value, the poll
//! supervisor subscribes to changes. writes that repeat the current value
//! wake nobody, so only real transitions drive the scheduler.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    /// no probe has resolved yet
    #[default]
    Checking,
    Connected,
    Disconnected,
}

/// a liveness value plus the number of real transitions so far
///
/// the counter lets a subscriber notice that the value left and came back
/// between two of its wake-ups even though it only sees the latest value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tracked {
    pub state: Liveness,
    pub transitions: u64,
}

pub struct LivenessCell {
    name: &'static str,
    tx: watch::Sender<Tracked>,
}

impl LivenessCell {
    pub fn new(name: &'static str) -> Self {
        let (tx, _) = watch::channel(Tracked { state: Liveness::Checking, transitions: 0 });
        Self { name, tx }
    }

    pub fn get(&self) -> Liveness {
        self.tx.borrow().state
    }

    /// later write wins; returns true when the value actually changed
    pub fn set(&self, next: Liveness) -> bool {
        let mut from = next;
        let changed = self.tx.send_if_modified(|cur| {
            if cur.state == next {
                return false;
            }
            from = cur.state;
            cur.state = next;
            cur.transitions += 1;
            true
        });
        if changed {
            tracing::info!(target: "liveness", endpoint = self.name, ?from, to = ?next, "status changed");
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<Tracked> {
        self.tx.subscribe()
    }
}
