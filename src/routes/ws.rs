use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, Extension},
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::{bad, AppResult},
    model::CanvasOp,
    protocol::{ClientEvent, ServerEvent},
    state::{ConnId, Gateway},
};

/// Outgoing frames buffered per connection before the room receivers start lagging.
const OUTBOX: usize = 64;

pub fn router() -> Router {
    Router::new().route("/canvas", get(ws_handler))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(gateway): Extension<Arc<Gateway>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |s| user_ws(s, gateway))
}

/* ---------------- per connection ---------------- */
async fn user_ws(sock: WebSocket, gateway: Arc<Gateway>) {
    let (mut sink, mut stream) = sock.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerEvent>(OUTBOX);
    let mut session = Session::new(gateway, out_tx.clone());
    let conn = session.conn();
    info!(%conn, "socket connected");

    let writer = tokio::spawn(async move {
        while let Some(ev) = out_rx.recv().await {
            let Ok(text) = serde_json::to_string(&ev) else { continue };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(raw)) => {
                if let Err(e) = session.handle_text(&raw).await {
                    warn!(%conn, error = %e, "event rejected");
                    out_tx.send(ServerEvent::error(e.to_string())).await.ok();
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    /* 離房 */
    session.close().await;
    writer.abort();
    info!(%conn, "socket closed");
}

struct Membership {
    participant_id: String,
    forward: JoinHandle<()>,
}

/// Protocol state of one socket: the rooms it joined and its ordered persistence queue.
pub struct Session {
    conn: ConnId,
    gateway: Arc<Gateway>,
    out: mpsc::Sender<ServerEvent>,
    joined: HashMap<String, Membership>,
    persist_tx: mpsc::UnboundedSender<(String, CanvasOp)>,
    persister: JoinHandle<()>,
}

impl Session {
    pub fn new(gateway: Arc<Gateway>, out: mpsc::Sender<ServerEvent>) -> Self {
        let (persist_tx, mut persist_rx) = mpsc::unbounded_channel::<(String, CanvasOp)>();
        let gw = gateway.clone();
        // appends run here, one at a time, so a sender's own commands keep their order
        let persister = tokio::spawn(async move {
            while let Some((room_id, op)) = persist_rx.recv().await {
                gw.persist(&room_id, op).await;
            }
        });

        Self { conn: Uuid::new_v4(), gateway, out, joined: HashMap::new(), persist_tx, persister }
    }

    pub fn conn(&self) -> ConnId { self.conn }

    pub async fn handle_text(&mut self, raw: &str) -> AppResult<()> {
        let event = ClientEvent::parse(raw)?;
        self.handle(event).await
    }

    pub async fn handle(&mut self, event: ClientEvent) -> AppResult<()> {
        match event {
            ClientEvent::Join { room_id, participant_id } => {
                self.join(room_id, participant_id).await;
                Ok(())
            }
            ClientEvent::Leave { room_id, participant_id } => {
                self.leave(&room_id, &participant_id).await
            }
            live => self.relay(live).await,
        }
    }

    async fn join(&mut self, room_id: String, participant_id: String) {
        if self.joined.contains_key(&room_id) {
            debug!(conn = %self.conn, room = %room_id, "already joined");
            return;
        }

        /* 進房 */
        let mut sub = self.gateway.join(&room_id, &participant_id, self.conn).await;
        let (gateway, out, room) = (self.gateway.clone(), self.out.clone(), room_id.clone());
        // subscribed before reading history, so nothing falls between replay and live.
        // A stroke appended in that window shows up twice: inside the replay and as a live
        // event. Replaying it again only redraws the same segment.
        let forward = tokio::spawn(async move {
            if let Some(replay) = gateway.replay(&room).await {
                if out.send(replay).await.is_err() {
                    return;
                }
            }
            while let Some(ev) = sub.recv().await {
                if out.send(ev).await.is_err() {
                    break;
                }
            }
        });

        self.joined.insert(room_id, Membership { participant_id, forward });
    }

    /// Leaves as the identity the socket joined with; the id in the event is only logged.
    async fn leave(&mut self, room_id: &str, participant_id: &str) -> AppResult<()> {
        let Some(m) = self.joined.remove(room_id) else {
            return Err(bad(format!("not joined to room {room_id}")));
        };
        m.forward.abort();
        if m.participant_id != participant_id {
            debug!(conn = %self.conn, room = room_id, joined_as = %m.participant_id,
                   "leave names a different participant");
        }
        self.gateway.leave(room_id, &m.participant_id, self.conn).await;
        Ok(())
    }

    async fn relay(&mut self, event: ClientEvent) -> AppResult<()> {
        let room_id = event.room_id().to_string();
        let Some(m) = self.joined.get(&room_id) else {
            return Err(bad(format!("not joined to room {room_id}")));
        };

        if let Some(out) = event.to_relayed(&m.participant_id) {
            self.gateway.relay(&room_id, self.conn, out).await;
        }
        if let Some(op) = event.persisted_op() {
            self.persist_tx.send((room_id, op)).ok();
        }
        Ok(())
    }

    /// Leaves every joined room and waits for queued appends to finish.
    pub async fn close(mut self) {
        let joined: Vec<_> = self.joined.drain().collect();
        for (room_id, m) in joined {
            m.forward.abort();
            self.gateway.leave(&room_id, &m.participant_id, self.conn).await;
        }
        drop(self.persist_tx);
        self.persister.await.ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{model::Stroke, store::MemoryCommandLog};
    use std::time::Duration;
    use tokio::time::timeout;

    fn gateway() -> Arc<Gateway> { Arc::new(Gateway::new(Arc::new(MemoryCommandLog::new()), 32)) }

    fn session(gw: &Arc<Gateway>) -> (Session, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(32);
        (Session::new(gw.clone(), tx), rx)
    }

    async fn next(rx: &mut mpsc::Receiver<ServerEvent>) -> ServerEvent {
        timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap()
    }

    /// No event arrives; a closed outbox counts as quiet.
    async fn assert_quiet(rx: &mut mpsc::Receiver<ServerEvent>) {
        if let Ok(Some(ev)) = timeout(Duration::from_millis(30), rx.recv()).await {
            panic!("unexpected event {ev:?}");
        }
    }

    /// Lets the forward tasks finish their (empty) replay before anyone draws.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    const JOIN_A: &str = r#"{"type":"join","roomId":"R1","participantId":"alice"}"#;
    const JOIN_B: &str = r#"{"type":"join","roomId":"R1","participantId":"bob"}"#;
    const PROGRESS: &str = r#"{"type":"stroke-progress","roomId":"R1",
        "stroke":{"x0":0,"y0":0,"x1":10,"y1":10,"color":"black","width":2}}"#;

    #[tokio::test]
    async fn late_joiner_gets_replay_of_earlier_stroke() {
        let gw = gateway();
        let (mut a, mut rx_a) = session(&gw);
        a.handle_text(JOIN_A).await.unwrap();
        a.handle_text(PROGRESS).await.unwrap();
        a.handle_text(r#"{"type":"leave","roomId":"R1","participantId":"alice"}"#).await.unwrap();
        a.close().await; // flushes the append queue
        assert_quiet(&mut rx_a).await;

        let (mut b, mut rx_b) = session(&gw);
        b.handle_text(JOIN_B).await.unwrap();
        match next(&mut rx_b).await {
            ServerEvent::Replay { room_id, commands } => {
                assert_eq!(room_id, "R1");
                assert_eq!(commands.len(), 1);
                assert_eq!(
                    commands[0].op(),
                    CanvasOp::Stroke(Stroke::new(0.0, 0.0, 10.0, 10.0, "black", 2.0))
                );
            }
            other => panic!("expected replay, got {other:?}"),
        }
        b.close().await;
    }

    #[tokio::test]
    async fn live_stroke_reaches_peer_not_sender() {
        let gw = gateway();
        let (mut a, mut rx_a) = session(&gw);
        let (mut b, mut rx_b) = session(&gw);
        a.handle_text(JOIN_A).await.unwrap();
        b.handle_text(JOIN_B).await.unwrap();
        assert!(matches!(next(&mut rx_a).await, ServerEvent::UserJoined { participant_id, .. } if participant_id == "bob"));
        settle().await;

        a.handle_text(PROGRESS).await.unwrap();
        match next(&mut rx_b).await {
            ServerEvent::StrokeProgress { participant_id, stroke, .. } => {
                assert_eq!(participant_id, "alice");
                assert_eq!(stroke.color, "black");
            }
            other => panic!("expected stroke, got {other:?}"),
        }
        assert_quiet(&mut rx_a).await;

        a.close().await;
        assert!(matches!(next(&mut rx_b).await, ServerEvent::UserLeft { participant_id, .. } if participant_id == "alice"));
        assert_eq!(gw.roster("R1").await.unwrap(), vec!["bob"]);
        b.close().await;
    }

    #[tokio::test]
    async fn clear_is_relayed_and_persisted() {
        let gw = gateway();
        let (mut a, _rx_a) = session(&gw);
        let (mut b, mut rx_b) = session(&gw);
        a.handle_text(JOIN_A).await.unwrap();
        b.handle_text(JOIN_B).await.unwrap();
        settle().await;

        a.handle_text(PROGRESS).await.unwrap();
        a.handle_text(r#"{"type":"clear","roomId":"R1"}"#).await.unwrap();
        assert!(matches!(next(&mut rx_b).await, ServerEvent::StrokeProgress { .. }));
        assert!(matches!(next(&mut rx_b).await, ServerEvent::Clear { .. }));

        a.close().await;
        let ops: Vec<_> = gw.log().read_all("R1").await.unwrap().iter().map(|c| c.op()).collect();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[1], CanvasOp::Clear);
        b.close().await;
    }

    #[tokio::test]
    async fn cursor_and_stroke_end_are_not_persisted() {
        let gw = gateway();
        let (mut a, _rx) = session(&gw);
        a.handle_text(JOIN_A).await.unwrap();
        a.handle_text(r#"{"type":"cursor-move","roomId":"R1","x":3,"y":4}"#).await.unwrap();
        a.handle_text(r#"{"type":"stroke-start","roomId":"R1","x":0,"y":0,"color":"red","width":3}"#)
            .await
            .unwrap();
        a.handle_text(r#"{"type":"stroke-end","roomId":"R1"}"#).await.unwrap();
        a.close().await;
        assert!(gw.log().read_all("R1").await.unwrap().is_empty());
        assert!(gw.log().find_room("R1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_or_unjoined_events_are_rejected() {
        let gw = gateway();
        let (mut a, _rx_a) = session(&gw);
        let (mut b, mut rx_b) = session(&gw);
        b.handle_text(JOIN_B).await.unwrap();

        assert!(a.handle_text("{oops").await.is_err());
        assert!(a.handle_text(PROGRESS).await.is_err()); // not joined

        a.handle_text(JOIN_A).await.unwrap();
        assert!(matches!(next(&mut rx_b).await, ServerEvent::UserJoined { .. }));
        assert!(a
            .handle_text(r#"{"type":"cursor-move","roomId":"R1","x":null,"y":1}"#)
            .await
            .is_err());
        assert_quiet(&mut rx_b).await;

        a.close().await;
        b.close().await;
        assert!(gw.log().read_all("R1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_join_on_one_socket_is_ignored() {
        let gw = gateway();
        let (mut a, _rx) = session(&gw);
        a.handle_text(JOIN_A).await.unwrap();
        a.handle_text(JOIN_A).await.unwrap();
        assert_eq!(gw.roster("R1").await.unwrap(), vec!["alice"]);
        a.close().await;
        assert!(gw.roster("R1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn leave_uses_joined_identity() {
        let gw = gateway();
        let (mut a, _rx) = session(&gw);
        a.handle_text(JOIN_A).await.unwrap();
        a.handle_text(r#"{"type":"leave","roomId":"R1","participantId":"al1ce"}"#).await.unwrap();
        assert!(gw.roster("R1").await.unwrap().is_empty());

        a.close().await;
        assert!(gw.roster("R1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn leave_cannot_remove_someone_else() {
        let gw = gateway();
        let (mut a, _rx_a) = session(&gw);
        let (mut b, mut rx_b) = session(&gw);
        let (mut outsider, _rx_o) = session(&gw);
        b.handle_text(JOIN_B).await.unwrap();
        a.handle_text(JOIN_A).await.unwrap();
        assert!(matches!(next(&mut rx_b).await, ServerEvent::UserJoined { .. }));

        // alice's socket names bob: alice leaves, bob stays
        a.handle_text(r#"{"type":"leave","roomId":"R1","participantId":"bob"}"#).await.unwrap();
        assert!(matches!(next(&mut rx_b).await, ServerEvent::UserLeft { participant_id, .. } if participant_id == "alice"));
        assert_eq!(gw.roster("R1").await.unwrap(), vec!["bob"]);

        // a socket that never joined is rejected and nothing is broadcast
        assert!(outsider
            .handle_text(r#"{"type":"leave","roomId":"R1","participantId":"bob"}"#)
            .await
            .is_err());
        assert_quiet(&mut rx_b).await;
        assert_eq!(gw.roster("R1").await.unwrap(), vec!["bob"]);

        a.close().await;
        outsider.close().await;
        b.close().await;
    }
}
