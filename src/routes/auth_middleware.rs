use crate::state::SharedState;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::debug;

/// HTTP basic auth gate for the admin routes, checked against the
/// configured control credentials.
pub async fn basic_auth(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|v| BASE64.decode(v).ok())
        .and_then(|v| String::from_utf8(v).ok())
        .map(|creds| {
            creds
                == format!(
                    "{}:{}",
                    state.config.ctrl_auth_login, state.config.ctrl_auth_passwd
                )
        })
        .unwrap_or(false);

    if !authorized {
        debug!("rejected unauthenticated admin request");
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"ctrl\"")],
            "authentication required",
        )
            .into_response();
    }
    next.run(request).await
}
