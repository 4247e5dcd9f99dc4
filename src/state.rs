use std::{collections::HashMap, sync::Arc};

use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    model::{CanvasOp, DrawingCommand},
    protocol::ServerEvent,
    store::CommandLog,
};

/// One per socket; lets the relay skip the sender even when two sockets share a participant id.
pub type ConnId = Uuid;

/// What travels on a room channel: the event plus the connection that caused it.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub origin: ConnId,
    pub event: ServerEvent,
}

pub type Tx = broadcast::Sender<Envelope>;

/* ------------ WebSocket 房間 ------------ */
pub struct RoomState {
    pub tx:    Tx,
    pub users: Vec<String>,    // participant ids, duplicates allowed
}

impl RoomState {
    fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, users: Vec::new() }
    }
}

/// Room registry, relay and history replay. Rosters live only in memory.
pub struct Gateway {
    rooms: RwLock<HashMap<String, RoomState>>,
    log: Arc<dyn CommandLog>,
    capacity: usize,
}

impl Gateway {
    pub fn new(log: Arc<dyn CommandLog>, capacity: usize) -> Self {
        Self { rooms: RwLock::default(), log, capacity: capacity.max(1) }
    }

    pub fn log(&self) -> &Arc<dyn CommandLog> { &self.log }

    /// Creates an empty roster entry if the room is unknown. Nothing is persisted.
    pub async fn ensure_room(&self, room_id: &str) {
        let mut m = self.rooms.write().await;
        m.entry(room_id.to_string()).or_insert_with(|| RoomState::new(self.capacity));
    }

    pub async fn roster(&self, room_id: &str) -> Option<Vec<String>> {
        self.rooms.read().await.get(room_id).map(|st| st.users.clone())
    }

    /// Adds `participant_id` to the roster, subscribes `conn` and tells the others.
    /// History is fetched separately with [`Gateway::replay`].
    pub async fn join(&self, room_id: &str, participant_id: &str, conn: ConnId) -> Subscription {
        let mut m = self.rooms.write().await;
        let st = m.entry(room_id.to_string()).or_insert_with(|| RoomState::new(self.capacity));
        let rx = st.tx.subscribe();
        st.users.push(participant_id.to_string());
        info!(room = room_id, participant = participant_id, %conn, users = st.users.len(), "joined");

        st.tx.send(Envelope {
            origin: conn,
            event: ServerEvent::UserJoined {
                room_id: room_id.to_string(),
                participant_id: participant_id.to_string(),
            },
        }).ok();

        Subscription { room_id: room_id.to_string(), conn, rx }
    }

    /// Removes one occurrence of `participant_id` and notifies who is left.
    /// Returns false (and stays silent) when the id wasn't on the roster.
    pub async fn leave(&self, room_id: &str, participant_id: &str, conn: ConnId) -> bool {
        let mut m = self.rooms.write().await;
        let Some(st) = m.get_mut(room_id) else { return false };
        let Some(pos) = st.users.iter().position(|u| u == participant_id) else {
            debug!(room = room_id, participant = participant_id, "leave for unknown participant");
            return false;
        };
        st.users.remove(pos);
        info!(room = room_id, participant = participant_id, %conn, users = st.users.len(), "left");

        st.tx.send(Envelope {
            origin: conn,
            event: ServerEvent::UserLeft {
                room_id: room_id.to_string(),
                participant_id: participant_id.to_string(),
            },
        }).ok();
        true
    }

    /// Fans `event` out to every subscriber of the room except `origin`.
    /// Returns how many other subscribers the channel held at send time.
    pub async fn relay(&self, room_id: &str, origin: ConnId, event: ServerEvent) -> usize {
        let m = self.rooms.read().await;
        let Some(st) = m.get(room_id) else {
            debug!(room = room_id, "relay to unknown room dropped");
            return 0;
        };
        // the sender is subscribed too
        let reached = st.tx.send(Envelope { origin, event }).map(|n| n.saturating_sub(1)).unwrap_or(0);
        debug!(room = room_id, %origin, reached, "relayed");
        reached
    }

    /// Appends to the command log. Failures are logged and swallowed.
    pub async fn persist(&self, room_id: &str, op: CanvasOp) -> Option<DrawingCommand> {
        let kind = op.kind();
        match self.log.append(room_id, op).await {
            Ok(cmd) => Some(cmd),
            Err(e) => {
                error!(room = room_id, kind, error = %e, "append failed, command dropped");
                None
            }
        }
    }

    /// History for a joining connection; `None` when empty or when the store is unavailable.
    pub async fn replay(&self, room_id: &str) -> Option<ServerEvent> {
        match self.log.read_all(room_id).await {
            Ok(commands) if commands.is_empty() => None,
            Ok(commands) => Some(ServerEvent::Replay { room_id: room_id.to_string(), commands }),
            Err(e) => {
                error!(room = room_id, error = %e, "history unavailable, starting blank");
                None
            }
        }
    }
}

/// A connection's view of one room channel. Dropping it unsubscribes.
pub struct Subscription {
    room_id: String,
    conn: ConnId,
    rx: broadcast::Receiver<Envelope>,
}

impl Subscription {
    pub fn room_id(&self) -> &str { &self.room_id }

    /// Next event from someone else; `None` once the room channel is gone.
    /// Events overwritten while this receiver lagged are skipped, not redelivered.
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        loop {
            match self.rx.recv().await {
                Ok(env) if env.origin == self.conn => continue,
                Ok(env) => return Some(env.event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(room = %self.room_id, conn = %self.conn, skipped = n, "receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
