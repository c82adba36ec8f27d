use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{any, delete, get, post};
use tracing::{debug, warn};

use super::handlers::{health, sessions, socket, users};
use crate::config::RouteRecord;
use crate::gateway::proxy::{self, Dispatcher};
use crate::gateway::GatewayPools;
use crate::realtime::ConnectionRegistry;
use crate::sessions::SessionManager;
use crate::users::UserStore;

// -----------------------------------------------------------------------------
// ----- AppState --------------------------------------------------------------

/// Shared by every gateway-owned handler.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionManager,
    pub users: Arc<dyn UserStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub pools: Arc<GatewayPools>,
    pub allowed_origin: Arc<str>,
    pub auth_failure_delay: Duration,
}

// -----------------------------------------------------------------------------
// ----- Router ----------------------------------------------------------------

/// Gateway endpoints plus one dispatcher per proxied route.
///
/// A route path ending in `/` also claims everything below it.
pub fn build_router(state: AppState, routes: &[RouteRecord], client: reqwest::Client) -> Router {
    let mut app = Router::new()
        .route("/v1/sessions", post(sessions::begin_session))
        .route("/v1/sessions/{segment}", delete(sessions::end_session))
        .route("/v1/users/{id}", get(users::profile))
        .route("/v1/ws", get(socket::upgrade))
        .route("/health", get(health::health))
        .with_state(state.clone());

    for route in routes {
        let Some(pool) = state.pools.get(&route.name) else {
            warn!(route = %route.name, "no target pool for route; skipping");
            continue;
        };

        let dispatcher = Dispatcher::new(pool, state.sessions.clone(), client.clone());

        let mut proxied = Router::new();
        for path in &route.paths {
            proxied = proxied.route(path, any(proxy::forward));
            if path.ends_with('/') {
                proxied = proxied.route(&format!("{path}{{*rest}}"), any(proxy::forward));
            }
        }

        debug!(route = %route.name, paths = ?route.paths, "mounted proxied route");
        app = app.merge(proxied.with_state(dispatcher));
    }

    app
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RoutesConfig, UsersConfig};
    use crate::sessions::MemoryStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use secrecy::SecretString;
    use std::num::NonZeroUsize;
    use tower::ServiceExt;

    const ROUTES: &str = r#"
        [[routes]]
        name = "api"
        paths = ["/api/", "/exact"]
        targets = "127.0.0.1:1"
    "#;

    fn app() -> Router {
        let hash = bcrypt::hash("123456", 4).unwrap();
        let users = UsersConfig::parse(&format!(
            r#"
            [[users]]
            id = 1
            email = "stanley@gmail.com"
            password_hash = "{hash}"
            user_name = "swu"
            "#
        ))
        .unwrap();

        let routes = RoutesConfig::parse(ROUTES).unwrap().routes();
        let store = MemoryStore::new(Duration::from_secs(60), NonZeroUsize::new(16).unwrap());

        let state = AppState {
            sessions: SessionManager::new(
                SecretString::new("router tests".to_string().into_boxed_str()),
                Arc::new(store),
            ),
            users: Arc::new(users),
            registry: Arc::new(ConnectionRegistry::new()),
            pools: Arc::new(GatewayPools::new(&routes).unwrap()),
            allowed_origin: Arc::from("https://app.example.com"),
            auth_failure_delay: Duration::ZERO,
        };

        build_router(state, &routes, reqwest::Client::new())
    }

    async fn status(method: &str, uri: &str) -> StatusCode {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        app().oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn gateway_endpoints_are_mounted() {
        assert_eq!(status("GET", "/health").await, StatusCode::OK);
        assert_eq!(status("GET", "/v1/users/me").await, StatusCode::UNAUTHORIZED);
        assert_eq!(
            status("DELETE", "/v1/sessions/mine").await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status("PUT", "/v1/sessions").await,
            StatusCode::METHOD_NOT_ALLOWED
        );
    }

    #[tokio::test]
    async fn proxied_paths_match_exact_or_subtree() {
        assert_eq!(status("GET", "/exact").await, StatusCode::BAD_GATEWAY);
        assert_eq!(status("GET", "/api/").await, StatusCode::BAD_GATEWAY);
        assert_eq!(status("POST", "/api/a/b").await, StatusCode::BAD_GATEWAY);

        assert_eq!(status("GET", "/exact/more").await, StatusCode::NOT_FOUND);
        assert_eq!(status("GET", "/apix").await, StatusCode::NOT_FOUND);
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
