use std::net::SocketAddr;

use axum::Json;
use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use tracing::{error, info, warn};

use crate::analytics;
use crate::errors::GatewayError;
use crate::http::AppState;
use crate::sessions::SessionState;
use crate::users::{Credentials, UsersError, decoy_password_check};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const MAX_CREDENTIALS_BODY: usize = 64 * 1024;

const OWN_SESSION_SEGMENT: &str = "mine";

// -----------------------------------------------------------------------------
// ----- Handlers --------------------------------------------------------------

/// `POST /v1/sessions`: sign in with `{email, password}`.
pub async fn begin_session(
    State(state): State<AppState>,
    req: Request,
) -> Result<Response, GatewayError> {
    let is_json = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    if !is_json {
        return Err(GatewayError::UnsupportedMediaType);
    }

    let ip = client_ip(req.headers(), req.extensions().get::<ConnectInfo<SocketAddr>>());

    let body = axum::body::to_bytes(req.into_body(), MAX_CREDENTIALS_BODY)
        .await
        .map_err(|e| GatewayError::BadRequest(format!("failed to read request body: {e}")))?;
    let credentials: Credentials = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::BadRequest(format!("failed to decode credentials: {e}")))?;

    let record = match state.users.get_by_email(&credentials.email).await {
        Ok(record) => record,
        Err(UsersError::UnknownUser { email }) => {
            warn!(%email, %ip, "sign-in for unknown account");
            if let Some(hash) = state.users.decoy_hash() {
                let password = credentials.password;
                let _ = tokio::task::spawn_blocking(move || decoy_password_check(&password, &hash))
                    .await;
            }
            tokio::time::sleep(state.auth_failure_delay).await;
            return Err(GatewayError::InvalidCredentials);
        }
        Err(e) => return Err(GatewayError::Internal(format!("account lookup: {e}"))),
    };

    // bcrypt is CPU-bound; keep it off the async workers.
    let password = credentials.password;
    let verifying = record.clone();
    let verified = tokio::task::spawn_blocking(move || verifying.authenticate(&password))
        .await
        .map_err(|e| GatewayError::Internal(format!("password check task: {e}")))?;

    match verified {
        Ok(()) => {}
        Err(UsersError::BadPassword) => {
            warn!(user_id = record.id, %ip, "sign-in with wrong password");
            tokio::time::sleep(state.auth_failure_delay).await;
            return Err(GatewayError::InvalidCredentials);
        }
        Err(e) => {
            error!(user_id = record.id, "stored password hash unusable: {e}");
            return Err(GatewayError::Internal("password check failed".into()));
        }
    }

    let profile = record.profile();
    let mut headers = HeaderMap::new();
    state
        .sessions
        .begin_session(&SessionState::new(profile.clone()), &mut headers)
        .await?;

    analytics::inc_sign_in();
    info!(user_id = profile.id, %ip, "signed in");

    Ok((StatusCode::CREATED, headers, Json(profile)).into_response())
}

/// `DELETE /v1/sessions/mine`: sign out.
pub async fn end_session(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<&'static str, GatewayError> {
    if segment != OWN_SESSION_SEGMENT {
        return Err(GatewayError::Forbidden(format!(
            "Last element of URL must be {OWN_SESSION_SEGMENT}, got {segment}"
        )));
    }

    state.sessions.end_session(&headers, &uri).await?;

    Ok("Signed out")
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

/// First `X-Forwarded-For` entry, else the peer address.
fn client_ip(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(ConnectInfo(addr))) => addr.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayPools;
    use crate::http::build_router;
    use crate::realtime::ConnectionRegistry;
    use crate::sessions::{MemoryStore, SessionManager};
    use crate::users::{UserRecord, UserStore};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{HeaderValue, Request};
    use secrecy::SecretString;
    use std::num::NonZeroUsize;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    /// No accounts; counts how often a decoy hash is asked for.
    struct NoAccounts {
        decoys: AtomicUsize,
    }

    #[async_trait]
    impl UserStore for NoAccounts {
        async fn get_by_email(&self, email: &str) -> Result<UserRecord, UsersError> {
            Err(UsersError::UnknownUser {
                email: email.to_string(),
            })
        }

        async fn get_by_id(&self, id: i64) -> Result<UserRecord, UsersError> {
            Err(UsersError::UnknownId { id })
        }

        fn decoy_hash(&self) -> Option<SecretString> {
            self.decoys.fetch_add(1, Ordering::Relaxed);
            Some(SecretString::new(bcrypt::hash("x", 4).unwrap().into_boxed_str()))
        }
    }

    #[tokio::test]
    async fn unknown_account_still_pays_for_a_password_check() {
        let users = Arc::new(NoAccounts {
            decoys: AtomicUsize::new(0),
        });
        let store = MemoryStore::new(Duration::from_secs(60), NonZeroUsize::new(4).unwrap());
        let state = AppState {
            sessions: SessionManager::new(
                SecretString::new("k".to_string().into_boxed_str()),
                Arc::new(store),
            ),
            users: users.clone(),
            registry: Arc::new(ConnectionRegistry::new()),
            pools: Arc::new(GatewayPools::new(&[]).unwrap()),
            allowed_origin: Arc::from("https://app.example.com"),
            auth_failure_delay: Duration::ZERO,
        };

        let req = Request::post("/v1/sessions")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"email":"ghost@example.com","password":"123456"}"#))
            .unwrap();
        let resp = build_router(state, &[], reqwest::Client::new())
            .oneshot(req)
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(users.decoys.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn client_ip_prefers_first_forwarded_entry() {
        let peer = ConnectInfo(SocketAddr::from(([10, 0, 0, 9], 5555)));

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers, Some(&peer)), "203.0.113.7");

        assert_eq!(client_ip(&HeaderMap::new(), Some(&peer)), "10.0.0.9");
        assert_eq!(client_ip(&HeaderMap::new(), None), "unknown");
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
