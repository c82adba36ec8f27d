use axum::extract::State;
use axum::extract::ws::{WebSocketUpgrade, rejection::WebSocketUpgradeRejection};
use axum::http::{HeaderMap, Uri, header};
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::errors::GatewayError;
use crate::http::AppState;
use crate::realtime::run_connection;
use crate::sessions::{SessionError, SessionState};

/// `GET /v1/ws`: authenticate, check `Origin`, then upgrade.
///
/// Both checks run before the handshake; a failure is a plain 403 and
/// nothing is registered.
pub async fn upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, GatewayError> {
    let session = match state.sessions.load_state::<SessionState>(&headers, &uri).await {
        Ok((_, session)) => session,
        Err(e @ SessionError::StoreUnavailable(_)) => return Err(e.into()),
        Err(e) => return Err(GatewayError::ConnectionRejected(format!("session: {e}"))),
    };

    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if origin != &*state.allowed_origin {
        return Err(GatewayError::ConnectionRejected(format!(
            "origin {origin:?} is not allowed"
        )));
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let principal = session.user.id;
    let registry = state.registry.clone();
    debug!(principal, "upgrading websocket");

    Ok(ws.on_upgrade(move |socket| run_connection(socket, principal, registry)))
}
