//! Durable drawing data: strokes, commands and the room record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppErr, AppResult};

pub const MAX_COLOR_LEN: usize = 64;

/// One line segment of a stroke, `(x0, y0)` to `(x1, y1)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub color: String,
    pub width: f64,
}

impl Stroke {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64, color: impl Into<String>, width: f64) -> Self {
        Self { x0, y0, x1, y1, color: color.into(), width }
    }

    pub fn validate(&self) -> AppResult<()> {
        if ![self.x0, self.y0, self.x1, self.y1].iter().all(|v| v.is_finite()) {
            return Err(AppErr::Bad("stroke coordinates must be finite".into()));
        }
        validate_pen(&self.color, self.width)
    }
}

/// Color/width checks shared by complete segments and `stroke-start`.
pub fn validate_pen(color: &str, width: f64) -> AppResult<()> {
    if !(width.is_finite() && width > 0.0) {
        return Err(AppErr::Bad("stroke width must be a positive number".into()));
    }
    if color.trim().is_empty() || color.len() > MAX_COLOR_LEN {
        return Err(AppErr::Bad("stroke color must be 1..=64 characters".into()));
    }
    Ok(())
}

/// A canvas mutation before the store has stamped it.
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasOp {
    Stroke(Stroke),
    Clear,
}

impl CanvasOp {
    pub fn kind(&self) -> &'static str {
        match self {
            CanvasOp::Stroke(_) => "stroke",
            CanvasOp::Clear => "clear",
        }
    }

    pub fn stamp(self, timestamp: DateTime<Utc>) -> DrawingCommand {
        match self {
            CanvasOp::Stroke(data) => DrawingCommand::Stroke { data, timestamp },
            CanvasOp::Clear => DrawingCommand::Clear { timestamp },
        }
    }
}

/// Immutable entry of a room's history. Serialized as
/// `{"type":"stroke","data":{..},"timestamp":..}` or `{"type":"clear","timestamp":..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DrawingCommand {
    Stroke { data: Stroke, timestamp: DateTime<Utc> },
    Clear { timestamp: DateTime<Utc> },
}

impl DrawingCommand {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            DrawingCommand::Stroke { timestamp, .. } | DrawingCommand::Clear { timestamp } => *timestamp,
        }
    }

    pub fn op(&self) -> CanvasOp {
        match self {
            DrawingCommand::Stroke { data, .. } => CanvasOp::Stroke(data.clone()),
            DrawingCommand::Clear { .. } => CanvasOp::Clear,
        }
    }
}

/// Durable room: exists once the first command has been appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRecord {
    pub room_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub commands: Vec<DrawingCommand>,
}
