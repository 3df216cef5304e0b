use crate::engine::dispatcher::run_session;
use crate::engine::READ_LIMIT;
use crate::state::SharedState;
use axum::extract::{State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct SessionToken {
    #[serde(rename = "sessionUUID")]
    session_uuid: String,
}

/// Pull the session id out of the base64 JSON session cookie.
fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    for pair in raw.split(';') {
        let Ok(cookie) = cookie::Cookie::parse(pair.trim().to_string()) else {
            continue;
        };
        if cookie.name() != "session" {
            continue;
        }
        let decoded = BASE64.decode(cookie.value()).ok()?;
        let token: SessionToken = serde_json::from_slice(&decoded).ok()?;
        if token.session_uuid.is_empty() {
            return None;
        }
        return Some(token.session_uuid);
    }
    None
}

fn origin_allowed(headers: &HeaderMap, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let Some(origin) = headers
        .get(axum::http::header::ORIGIN)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let origin = origin.to_lowercase();
    allowed.iter().any(|a| *a == origin)
}

/// WebSocket entry point. Checks the origin, requires a session cookie, then
/// hands the upgraded socket to the engine.
pub async fn ws_entry(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Response {
    if !origin_allowed(&headers, &state.config.allowed_origins()) {
        debug!("rejected upgrade from disallowed origin");
        return StatusCode::FORBIDDEN.into_response();
    }
    let Some(session_id) = session_id_from_headers(&headers) else {
        return (StatusCode::UNAUTHORIZED, "missing session").into_response();
    };
    ws.max_message_size(READ_LIMIT)
        .on_upgrade(move |socket| run_session(socket, session_id, state))
}
