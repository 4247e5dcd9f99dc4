//! Command log: the durable, append-only history of every room.

use std::{collections::HashMap, str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Row, SqlitePool,
};
use tokio::sync::RwLock;
use tracing::warn;

use crate::{
    error::AppResult,
    model::{CanvasOp, DrawingCommand, RoomRecord, Stroke},
};

#[async_trait]
pub trait CommandLog: Send + Sync {
    /// Appends to the room's history, creating the room record if it is missing.
    /// Returns the command as stored, timestamp included.
    async fn append(&self, room_id: &str, op: CanvasOp) -> AppResult<DrawingCommand>;

    /// Full history in append order; empty when the room has never been written.
    async fn read_all(&self, room_id: &str) -> AppResult<Vec<DrawingCommand>>;

    async fn find_room(&self, room_id: &str) -> AppResult<Option<RoomRecord>>;
}

/* ------------ SQLite -------------- */
pub struct SqliteCommandLog {
    pool: SqlitePool,
}

impl SqliteCommandLog {
    pub fn new(pool: SqlitePool) -> Self { Self { pool } }

    /// Opens (creating if needed) the database at `url` and makes sure the schema exists.
    pub async fn connect(url: &str) -> AppResult<Self> {
        let opts = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new().connect_with(opts).await?;
        let log = Self::new(pool);
        log.init().await?;
        Ok(log)
    }

    pub async fn init(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rooms (
                room_id       TEXT PRIMARY KEY,
                created_at    TEXT NOT NULL,
                last_activity TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS drawing_commands (
                seq       INTEGER PRIMARY KEY AUTOINCREMENT,
                room_id   TEXT NOT NULL REFERENCES rooms(room_id),
                kind      TEXT NOT NULL,
                data      TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_commands_room ON drawing_commands(room_id, seq);
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CommandLog for SqliteCommandLog {
    async fn append(&self, room_id: &str, op: CanvasOp) -> AppResult<DrawingCommand> {
        let now = Utc::now();
        let data = match &op {
            CanvasOp::Stroke(s) => serde_json::to_string(s)?,
            CanvasOp::Clear => "{}".to_string(),
        };

        // upsert + insert in one transaction; SQLite serializes concurrent writers
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO rooms (room_id, created_at, last_activity) VALUES (?, ?, ?)
            ON CONFLICT(room_id) DO UPDATE SET last_activity = excluded.last_activity
            "#,
        )
        .bind(room_id)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO drawing_commands (room_id, kind, data, timestamp) VALUES (?, ?, ?, ?)")
            .bind(room_id)
            .bind(op.kind())
            .bind(&data)
            .bind(now.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(op.stamp(now))
    }

    async fn read_all(&self, room_id: &str) -> AppResult<Vec<DrawingCommand>> {
        let rows = sqlx::query(
            "SELECT kind, data, timestamp FROM drawing_commands WHERE room_id = ? ORDER BY seq",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(cmd) = decode_command(row)? {
                out.push(cmd);
            }
        }
        Ok(out)
    }

    async fn find_room(&self, room_id: &str) -> AppResult<Option<RoomRecord>> {
        let row = sqlx::query("SELECT created_at, last_activity FROM rooms WHERE room_id = ?")
            .bind(room_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else { return Ok(None) };
        let created_at = parse_ts(row.try_get("created_at")?)?;
        let last_activity = parse_ts(row.try_get("last_activity")?)?;
        let commands = self.read_all(room_id).await?;

        Ok(Some(RoomRecord { room_id: room_id.to_string(), created_at, last_activity, commands }))
    }
}

fn decode_command(row: &SqliteRow) -> AppResult<Option<DrawingCommand>> {
    let kind: String = row.try_get("kind")?;
    let data: String = row.try_get("data")?;
    let timestamp = parse_ts(row.try_get("timestamp")?)?;

    let op = match kind.as_str() {
        "stroke" => CanvasOp::Stroke(serde_json::from_str::<Stroke>(&data)?),
        "clear"  => CanvasOp::Clear,
        other => {
            warn!(kind = other, "skipping unknown command kind");
            return Ok(None);
        }
    };
    Ok(Some(op.stamp(timestamp)))
}

fn parse_ts(raw: String) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)).into())
}

/* ------------ 記憶體版 -------------- */
/// Process-local log. Writes hold the lock for the whole upsert+append.
#[derive(Default)]
pub struct MemoryCommandLog {
    rooms: RwLock<HashMap<String, RoomRecord>>,
}

impl MemoryCommandLog {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl CommandLog for MemoryCommandLog {
    async fn append(&self, room_id: &str, op: CanvasOp) -> AppResult<DrawingCommand> {
        let now = Utc::now();
        let cmd = op.stamp(now);

        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(room_id.to_string()).or_insert_with(|| RoomRecord {
            room_id: room_id.to_string(),
            created_at: now,
            last_activity: now,
            commands: Vec::new(),
        });
        room.last_activity = now;
        room.commands.push(cmd.clone());
        Ok(cmd)
    }

    async fn read_all(&self, room_id: &str) -> AppResult<Vec<DrawingCommand>> {
        Ok(self
            .rooms
            .read()
            .await
            .get(room_id)
            .map(|r| r.commands.clone())
            .unwrap_or_default())
    }

    async fn find_room(&self, room_id: &str) -> AppResult<Option<RoomRecord>> {
        Ok(self.rooms.read().await.get(room_id).cloned())
    }
}
