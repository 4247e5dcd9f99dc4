//! JSON events exchanged over the room socket. Every frame carries a kebab-case `type`.

use serde::{Deserialize, Serialize};

use crate::{
    error::{bad, AppResult},
    model::{validate_pen, CanvasOp, DrawingCommand, Stroke},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    Join { room_id: String, participant_id: String },
    Leave { room_id: String, participant_id: String },
    CursorMove { room_id: String, x: f64, y: f64 },
    StrokeStart { room_id: String, x: f64, y: f64, color: String, width: f64 },
    StrokeProgress { room_id: String, stroke: Stroke },
    StrokeEnd {
        room_id: String,
        #[serde(default)]
        stroke: Option<Stroke>,
    },
    Clear { room_id: String },
}

impl ClientEvent {
    pub fn parse(raw: &str) -> AppResult<Self> {
        let ev: Self = serde_json::from_str(raw).map_err(bad)?;
        ev.validate()?;
        Ok(ev)
    }

    pub fn room_id(&self) -> &str {
        match self {
            ClientEvent::Join { room_id, .. }
            | ClientEvent::Leave { room_id, .. }
            | ClientEvent::CursorMove { room_id, .. }
            | ClientEvent::StrokeStart { room_id, .. }
            | ClientEvent::StrokeProgress { room_id, .. }
            | ClientEvent::StrokeEnd { room_id, .. }
            | ClientEvent::Clear { room_id } => room_id,
        }
    }

    fn validate(&self) -> AppResult<()> {
        if self.room_id().trim().is_empty() {
            return Err(bad("roomId must not be empty"));
        }
        match self {
            ClientEvent::Join { participant_id, .. } | ClientEvent::Leave { participant_id, .. }
                if participant_id.trim().is_empty() =>
            {
                Err(bad("participantId must not be empty"))
            }
            ClientEvent::CursorMove { x, y, .. } if !(x.is_finite() && y.is_finite()) => {
                Err(bad("cursor position must be finite"))
            }
            ClientEvent::StrokeStart { x, y, color, width, .. } => {
                if !(x.is_finite() && y.is_finite()) {
                    return Err(bad("stroke start must be finite"));
                }
                validate_pen(color, *width)
            }
            ClientEvent::StrokeProgress { stroke, .. } => stroke.validate(),
            ClientEvent::StrokeEnd { stroke: Some(stroke), .. } => stroke.validate(),
            _ => Ok(()),
        }
    }

    /// The durable command this event produces, if any.
    pub fn persisted_op(&self) -> Option<CanvasOp> {
        match self {
            ClientEvent::StrokeProgress { stroke, .. } => Some(CanvasOp::Stroke(stroke.clone())),
            ClientEvent::Clear { .. } => Some(CanvasOp::Clear),
            _ => None,
        }
    }

    /// What peers receive for a live event; `None` for join/leave.
    pub fn to_relayed(&self, participant_id: &str) -> Option<ServerEvent> {
        let participant_id = participant_id.to_string();
        let ev = match self.clone() {
            ClientEvent::Join { .. } | ClientEvent::Leave { .. } => return None,
            ClientEvent::CursorMove { room_id, x, y } => {
                ServerEvent::CursorMove { room_id, participant_id, x, y }
            }
            ClientEvent::StrokeStart { room_id, x, y, color, width } => {
                ServerEvent::StrokeStart { room_id, participant_id, x, y, color, width }
            }
            ClientEvent::StrokeProgress { room_id, stroke } => {
                ServerEvent::StrokeProgress { room_id, participant_id, stroke }
            }
            ClientEvent::StrokeEnd { room_id, stroke } => {
                ServerEvent::StrokeEnd { room_id, participant_id, stroke }
            }
            ClientEvent::Clear { room_id } => ServerEvent::Clear { room_id, participant_id },
        };
        Some(ev)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    UserJoined { room_id: String, participant_id: String },
    UserLeft { room_id: String, participant_id: String },
    /// Sent once, to the joining connection only.
    Replay { room_id: String, commands: Vec<DrawingCommand> },
    CursorMove { room_id: String, participant_id: String, x: f64, y: f64 },
    StrokeStart { room_id: String, participant_id: String, x: f64, y: f64, color: String, width: f64 },
    StrokeProgress { room_id: String, participant_id: String, stroke: Stroke },
    StrokeEnd {
        room_id: String,
        participant_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stroke: Option<Stroke>,
    },
    Clear { room_id: String, participant_id: String },
    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error { message: message.into() }
    }
}
