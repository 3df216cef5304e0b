use crate::engine::dispatcher::broadcast_server_status;
use crate::models::ctrl::{CtrlCommandResponse, RoomCtrlInfo, RoomsCtrlResponse};
use crate::state::{ServerStatus, SharedState};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct RoomsCtrlQuery {
    /// Sort key: name, users, messages or activity (default).
    #[serde(default)]
    pub order: Option<String>,
    /// Room to force-delete.
    #[serde(rename = "deleteRoomName", default)]
    pub delete_room_name: Option<String>,
}

/// Admin room listing, with an optional force-delete side entrance.
pub async fn rooms_ctrl(
    State(state): State<SharedState>,
    Query(query): Query<RoomsCtrlQuery>,
) -> Response {
    if let Some(name) = &query.delete_room_name {
        let name = crate::engine::dispatcher::normalize_room_name(name);
        match state.registry.remove(&name).await {
            Some(room) => {
                let mut room_state = room.state.lock().await;
                room_state.is_deleted = true;
                let sockets = room_state.socket_snapshot();
                drop(room_state);
                for socket in sockets {
                    socket.terminate().await;
                }
                warn!(room = %name, "room force-deleted by admin");
            }
            None => return (StatusCode::NOT_FOUND, "room not found").into_response(),
        }
    }

    let rooms = state.registry.snapshot().await;
    let mut infos = Vec::with_capacity(rooms.len());
    let mut users_online = 0;
    for room in &rooms {
        let room_state = room.state.lock().await;
        let online = room_state.online_count();
        users_online += online;
        infos.push(RoomCtrlInfo {
            id: room.id.clone(),
            name: room.name.clone(),
            has_password: room.has_password(),
            users_total: room_state.member_count(),
            users_online: online,
            messages: room_state.messages.len(),
            created_at: room.created_at.to_rfc3339(),
            last_active_at: chrono::DateTime::from_timestamp(room_state.last_active_at, 0)
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
        });
    }

    match query.order.as_deref() {
        Some("name") => infos.sort_by(|a, b| a.name.cmp(&b.name)),
        Some("users") => infos.sort_by(|a, b| b.users_online.cmp(&a.users_online)),
        Some("messages") => infos.sort_by(|a, b| b.messages.cmp(&a.messages)),
        _ => infos.sort_by(|a, b| b.last_active_at.cmp(&a.last_active_at)),
    }

    Json(RoomsCtrlResponse {
        rooms_count: infos.len(),
        users_online,
        rooms: infos,
    })
    .into_response()
}

#[derive(Debug, Deserialize)]
pub struct CtrlCommandQuery {
    #[serde(rename = "ctrlCommand", default)]
    pub command: String,
}

/// Admin commands flipping the advertised server status. Every room hears
/// about the change immediately.
pub async fn ctrl_command(
    State(state): State<SharedState>,
    Query(query): Query<CtrlCommandQuery>,
) -> Response {
    let status = match query.command.as_str() {
        "notify_shutdown" => ServerStatus::ShuttingDown,
        "notify_restart" => ServerStatus::Restarting,
        "notify_online" => ServerStatus::Online,
        other => {
            return (
                StatusCode::BAD_REQUEST,
                format!("unknown command: {other}"),
            )
                .into_response()
        }
    };
    info!(command = %query.command, "admin command accepted");
    broadcast_server_status(&state, status).await;
    Json(CtrlCommandResponse {
        command: query.command,
        result: format!("server status set to {}", status.as_str()),
    })
    .into_response()
}
