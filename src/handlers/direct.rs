use crate::engine::broadcast::{write_message_frame, write_notification};
use crate::engine::dispatcher::normalize_room_name;
use crate::engine::housekeeper::start_housekeeper;
use crate::engine::password::{hash_password, verify_password};
use crate::engine::registry::validate_room_creds;
use crate::engine::room::Room;
use crate::engine::{MAX_MESSAGE_LEN, MESSAGES_APPROACH_BREAKPOINTS};
use crate::models::frame::Command;
use crate::state::SharedState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

const DEFAULT_RETRIEVAL_LIMIT: usize = 50;

const TEXT_HELP_HEADER: &str = "# params: r=<room> p=<password> l=<max messages> \
id=<only messages after this id> format=json quite=true\n";

#[derive(Debug, Deserialize)]
pub struct DirectQuery {
    #[serde(default)]
    pub r: String,
    #[serde(default)]
    pub p: String,
    #[serde(default)]
    pub m: Option<String>,
    #[serde(default)]
    pub l: Option<usize>,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub quite: Option<String>,
}

impl DirectQuery {
    fn wants_json(&self) -> bool {
        self.format.as_deref() == Some("json")
    }

    fn quiet(&self) -> bool {
        matches!(self.quite.as_deref(), Some("true") | Some("1"))
    }
}

fn plain(status: StatusCode, text: impl Into<String>) -> Response {
    (status, text.into()).into_response()
}

/// Find the addressed room, creating it on the fly when missing, and check
/// its password. Shared by the retrieval and sending endpoints.
async fn open_room(state: &SharedState, query: &DirectQuery) -> Result<Arc<Room>, Response> {
    let name = normalize_room_name(&query.r);
    if let Err(e) = validate_room_creds(&name, &query.p, &state.config.forbidden_room_names()) {
        return Err(plain(StatusCode::BAD_REQUEST, format!("bad room parameters: {e:?}")));
    }
    let room = match state.registry.get(&name).await {
        Some(room) => room,
        None => {
            let fresh = Room::new(name.clone(), hash_password(&query.p));
            let (winner, inserted) = state.registry.insert_if_vacant(fresh).await;
            if inserted {
                info!(room = %name, "room auto-created via direct access");
                start_housekeeper(Arc::clone(&winner), Arc::clone(state));
            }
            winner
        }
    };
    if let Some(hash) = &room.password_hash {
        if !verify_password(&query.p, hash) {
            return Err(plain(StatusCode::FORBIDDEN, "wrong room password"));
        }
    }
    Ok(room)
}

/// Read-only message retrieval over plain HTTP, for clients that cannot hold
/// a WebSocket. Plain text by default, JSON on request. A missing room is
/// created empty, mirroring the sending path.
pub async fn directly_retrieve(
    State(state): State<SharedState>,
    Query(query): Query<DirectQuery>,
) -> Response {
    let room = match open_room(&state, &query).await {
        Ok(room) => room,
        Err(resp) => return resp,
    };

    let limit = query.l.unwrap_or(DEFAULT_RETRIEVAL_LIMIT);
    let after_id = query.id.unwrap_or(0);
    let mut room_state = room.state.lock().await;
    room_state.touch();
    let selected: Vec<_> = room_state
        .messages
        .range((after_id + 1)..)
        .map(|(_, m)| m.clone())
        .collect();
    let selected = if selected.len() > limit {
        selected[selected.len() - limit..].to_vec()
    } else {
        selected
    };
    let named: Vec<(String, _)> = selected
        .into_iter()
        .map(|m| {
            let author = room_state
                .user_name_for(&m.user_in_room_id)
                .unwrap_or_else(|| "unknown".to_string());
            (author, m)
        })
        .collect();
    drop(room_state);

    if query.wants_json() {
        let messages: Vec<serde_json::Value> = named
            .iter()
            .map(|(author, m)| {
                serde_json::json!({
                    "id": m.id,
                    "author": author,
                    "text": m.text,
                    "createdAt": m.created_at_sec,
                })
            })
            .collect();
        return Json(serde_json::json!({
            "room": room.name,
            "messages": messages,
        }))
        .into_response();
    }

    let mut out = String::new();
    if !query.quiet() {
        out.push_str(TEXT_HELP_HEADER);
    }
    for (author, m) in &named {
        out.push_str(&format!("[{}] {}: {}\n", m.id, author, m.text));
    }
    plain(StatusCode::OK, out)
}

/// Push one message into a room over plain HTTP. The room is created on the
/// fly when missing; authorship goes to the room's external technical user.
pub async fn directly_send(
    State(state): State<SharedState>,
    Query(query): Query<DirectQuery>,
) -> Response {
    let text = query.m.clone().unwrap_or_default().trim().to_string();
    if text.is_empty() {
        return plain(StatusCode::BAD_REQUEST, "empty message");
    }
    if text.chars().count() > MAX_MESSAGE_LEN {
        return plain(StatusCode::BAD_REQUEST, "message is too large");
    }
    let room = match open_room(&state, &query).await {
        Ok(room) => room,
        Err(resp) => return resp,
    };

    let mut room_state = room.state.lock().await;
    room_state.touch();
    let Some(author_id) = room_state.external_tech_user_id() else {
        return plain(StatusCode::INTERNAL_SERVER_ERROR, "room has no external sender");
    };
    let dto = room_state.add_message(&author_id, text, None, None);
    let id = dto.id.unwrap_or_default();
    write_message_frame(&room_state, Command::TextMessage, dto);
    let backlog = room_state.messages.len();
    if MESSAGES_APPROACH_BREAKPOINTS.contains(&backlog) {
        write_notification(
            &room_state,
            Command::NotifyMessagesLimitApproaching,
            backlog.to_string(),
        );
    }
    if let Some(lowest_kept) = room_state.shrink_if_over_limit() {
        write_notification(
            &room_state,
            Command::NotifyMessagesLimitReached,
            lowest_kept.to_string(),
        );
    }
    drop(room_state);

    if query.wants_json() {
        return Json(serde_json::json!({ "result": "sent", "id": id })).into_response();
    }
    if query.quiet() {
        return plain(StatusCode::OK, "");
    }
    plain(StatusCode::OK, format!("sent id={id}\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::state::AppState;

    fn query(pairs: &[(&str, &str)]) -> DirectQuery {
        let qs: String = pairs
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        serde_urlencoded::from_str(&qs).unwrap()
    }

    #[tokio::test]
    async fn send_creates_room_and_retrieval_sees_message() {
        let state = AppState::new(Config::default());
        let resp = directly_send(
            State(Arc::clone(&state)),
            Query(query(&[("r", "ops room"), ("m", "deploy done"), ("quite", "true")])),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let room = state.registry.get("ops room").await.expect("room created");
        let room_state = room.state.lock().await;
        assert_eq!(room_state.messages.len(), 1);
        let author = room_state.external_tech_user_id().unwrap();
        assert_eq!(room_state.messages[&1].user_in_room_id, author);
    }

    #[tokio::test]
    async fn retrieval_auto_creates_missing_room() {
        let state = AppState::new(Config::default());
        let resp = directly_retrieve(
            State(Arc::clone(&state)),
            Query(query(&[("r", "nowhere"), ("quite", "true")])),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(state.registry.contains("nowhere").await);
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let state = AppState::new(Config::default());
        let resp = directly_send(
            State(Arc::clone(&state)),
            Query(query(&[("r", "secret room"), ("p", "letmein"), ("m", "hi")])),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = directly_send(
            State(state),
            Query(query(&[("r", "secret room"), ("p", "wrong"), ("m", "hi")])),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let state = AppState::new(Config::default());
        let resp = directly_send(
            State(state),
            Query(query(&[("r", "ops room"), ("m", "   ")])),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
