use std::{sync::Arc, time::Duration};

use tokio::{sync::Mutex, task::JoinHandle, time};
use tracing::debug;

use crate::presence::PresenceTracker;

pub type SharedPresence = Arc<Mutex<PresenceTracker>>;

/// Runs [`task`] in the background. Abort the handle to stop sweeping.
pub fn spawn(presence: SharedPresence, every: Duration) -> JoinHandle<()> {
    tokio::spawn(task(presence, every))
}

/// 清道夫：每 `every` 掃一次，移除過期游標
pub async fn task(presence: SharedPresence, every: Duration) {
    let mut tick = time::interval(every);
    tick.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    tick.tick().await; // first tick fires immediately
    loop {
        tick.tick().await;
        let gone = presence.lock().await.sweep(time::Instant::now());
        if !gone.is_empty() {
            debug!(?gone, "stale cursors removed");
        }
    }
}
