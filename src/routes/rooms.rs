//! routes/rooms.rs: room lookup and create-or-confirm
use std::sync::Arc;

use axum::{
    extract::{Extension, Json, Path},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppErr, AppResult},
    model::RoomRecord,
    state::Gateway,
};

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct JoinInput {
    room_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JoinJson {
    success: bool,
    room_id: String,
}

#[derive(Serialize)]
struct RoomJson {
    exists: bool,
    users: Vec<String>,
    room: Option<RoomRecord>,
}

pub fn router() -> Router {
    Router::new()
        .route("/rooms/join", post(join))
        .route("/rooms/:room_id", get(lookup))
}

/* ---------------- Create or confirm ---------------- */
async fn join(
    Extension(gateway): Extension<Arc<Gateway>>,
    body: Option<Json<JoinInput>>,
) -> Json<JoinJson> {
    let input = body.map(|Json(p)| p).unwrap_or_default();
    let room_id = input
        .room_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    gateway.ensure_room(&room_id).await;
    Json(JoinJson { success: true, room_id })
}

/* ---------------- Lookup ---------------- */
async fn lookup(
    Extension(gateway): Extension<Arc<Gateway>>,
    Path(room_id): Path<String>,
) -> AppResult<Json<RoomJson>> {
    let room = gateway.log().find_room(&room_id).await?;
    let users = gateway.roster(&room_id).await;

    if room.is_none() && users.is_none() {
        return Err(AppErr::NotFound(format!("room {room_id}")));
    }
    Ok(Json(RoomJson { exists: true, users: users.unwrap_or_default(), room }))
}
