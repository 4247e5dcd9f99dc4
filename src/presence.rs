//! Viewer-local cursor presence. Built only from relayed `cursor-move` events and expired by
//! age, so a peer that vanishes without a `leave` still disappears.

use std::{collections::HashMap, time::Duration};

use tokio::time::Instant;

pub const SWEEP_EVERY: Duration = Duration::from_secs(3);
pub const STALE_AFTER: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresencePolicy {
    pub sweep_every: Duration,
    pub stale_after: Duration,
}

impl Default for PresencePolicy {
    fn default() -> Self {
        Self { sweep_every: SWEEP_EVERY, stale_after: STALE_AFTER }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cursor {
    pub x: f64,
    pub y: f64,
    pub seen_at: Instant,
}

#[derive(Debug)]
pub struct PresenceTracker {
    peers: HashMap<String, Cursor>,
    stale_after: Duration,
}

impl PresenceTracker {
    pub fn new(stale_after: Duration) -> Self {
        Self { peers: HashMap::new(), stale_after }
    }

    pub fn observe(&mut self, peer: &str, x: f64, y: f64, now: Instant) {
        self.peers.insert(peer.to_string(), Cursor { x, y, seen_at: now });
    }

    /// Drops every peer not refreshed within the threshold; returns who was dropped.
    pub fn sweep(&mut self, now: Instant) -> Vec<String> {
        let stale_after = self.stale_after;
        let mut gone = Vec::new();
        self.peers.retain(|peer, c| {
            let fresh = now.saturating_duration_since(c.seen_at) < stale_after;
            if !fresh {
                gone.push(peer.clone());
            }
            fresh
        });
        gone
    }

    pub fn get(&self, peer: &str) -> Option<&Cursor> { self.peers.get(peer) }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cursor)> {
        self.peers.iter().map(|(p, c)| (p.as_str(), c))
    }

    pub fn len(&self) -> usize { self.peers.len() }

    pub fn is_empty(&self) -> bool { self.peers.is_empty() }
}
