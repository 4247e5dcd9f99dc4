//! Viewer-side consumer: folds the events a connection receives into a canvas and a
//! cursor map, and owns the presence sweep for as long as it lives.

use std::sync::Arc;

use tokio::{sync::Mutex, task::JoinHandle, time::Instant};

use crate::{
    canvas::Canvas,
    model::CanvasOp,
    presence::{PresencePolicy, PresenceTracker},
    protocol::ServerEvent,
    utils::clean::{self, SharedPresence},
};

pub struct Viewer {
    canvas: Canvas,
    presence: SharedPresence,
    sweeper: JoinHandle<()>,
}

impl Viewer {
    /// Must be called inside a tokio runtime; starts the sweep task.
    pub fn start(policy: PresencePolicy) -> Self {
        let presence = Arc::new(Mutex::new(PresenceTracker::new(policy.stale_after)));
        let sweeper = clean::spawn(presence.clone(), policy.sweep_every);
        Self { canvas: Canvas::new(), presence, sweeper }
    }

    pub async fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::Replay { commands, .. } => self.canvas.replay(commands),
            ServerEvent::StrokeProgress { stroke, .. } => {
                self.canvas.apply(&CanvasOp::Stroke(stroke.clone()))
            }
            ServerEvent::StrokeEnd { stroke: Some(stroke), .. } => {
                self.canvas.apply(&CanvasOp::Stroke(stroke.clone()))
            }
            ServerEvent::Clear { .. } => self.canvas.apply(&CanvasOp::Clear),
            ServerEvent::CursorMove { participant_id, x, y, .. } => {
                self.presence.lock().await.observe(participant_id, *x, *y, Instant::now())
            }
            // roster changes don't touch presence; the sweep handles departures
            _ => {}
        }
    }

    pub fn canvas(&self) -> &Canvas { &self.canvas }

    pub fn presence(&self) -> SharedPresence { self.presence.clone() }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}
