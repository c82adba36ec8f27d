use std::{net::SocketAddr, num::NonZeroUsize, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{Request, State},
};
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::{net::TcpListener, sync::oneshot, time::sleep};

use gatecrab::{
    AppState, build_router,
    config::{RoutesConfig, UsersConfig},
    gateway::GatewayPools,
    net,
    realtime::{ConnectionRegistry, FanoutBridge, MemoryPublisher, memory_queue},
    sessions::{MemoryStore, SessionManager},
};

pub const EMAIL: &str = "stanley@gmail.com";
pub const PASSWORD: &str = "123456";
pub const ALLOWED_ORIGIN: &str = "https://app.example.com";

// -----------------------------------------------------------------------------
// ----- Gateway ---------------------------------------------------------------

#[allow(dead_code)]
pub struct TestGateway {
    pub addr: SocketAddr,
    pub registry: Arc<ConnectionRegistry>,
    pub events: MemoryPublisher,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

#[allow(dead_code)]
impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn ws_url(&self, query: &str) -> String {
        format!("ws://{}/v1/ws{query}", self.addr)
    }

    /// Sign in as the seeded account and return `(status, authorization, body)`.
    pub async fn sign_in(
        &self,
        client: &reqwest::Client,
        email: &str,
        password: &str,
    ) -> (reqwest::StatusCode, Option<String>, String) {
        let resp = client
            .post(self.url("/v1/sessions"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("sign-in request");

        let status = resp.status();
        let authorization = resp
            .headers()
            .get("authorization")
            .map(|v| v.to_str().unwrap().to_string());
        let body = resp.text().await.unwrap();

        (status, authorization, body)
    }

    /// Sign in with the seeded credentials and return the `Authorization` value.
    pub async fn bearer(&self, client: &reqwest::Client) -> String {
        let (status, authorization, body) = self.sign_in(client, EMAIL, PASSWORD).await;
        assert_eq!(status, 201, "sign-in failed: {body}");
        authorization.expect("authorization header")
    }

    /// Wait until the registry holds exactly `n` connections.
    pub async fn wait_for_connections(&self, n: usize) {
        for _ in 0..100 {
            if self.registry.len() == n {
                return;
            }
            sleep(Duration::from_millis(20)).await;
        }
        panic!(
            "registry never reached {n} connections (has {})",
            self.registry.len()
        );
    }
}

/// Boot the gateway in-process on an ephemeral port, without TLS, with an
/// in-memory session store and an in-memory event queue.
pub async fn spawn_gateway(routes_toml: Option<&str>) -> TestGateway {
    let users = UsersConfig::parse(&users_toml()).expect("users toml");
    let routes = routes_toml
        .map(|raw| RoutesConfig::parse(raw).expect("routes toml").routes())
        .unwrap_or_default();

    let store = MemoryStore::new(Duration::from_secs(3600), NonZeroUsize::new(1024).unwrap());
    let sessions = SessionManager::new(
        SecretString::new("integration tests".to_string().into_boxed_str()),
        Arc::new(store),
    );

    let registry = Arc::new(ConnectionRegistry::new());
    let pools = Arc::new(GatewayPools::new(&routes).expect("pools"));

    let state = AppState {
        sessions,
        users: Arc::new(users),
        registry: registry.clone(),
        pools,
        allowed_origin: Arc::from(ALLOWED_ORIGIN),
        auth_failure_delay: Duration::from_millis(10),
    };

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();
    let app = build_router(state, &routes, client);

    let (events, source) = memory_queue();
    let bridge = FanoutBridge::new(registry.clone());
    tokio::spawn(async move { bridge.run(source).await });

    let listener = net::bind("127.0.0.1:0".parse().unwrap()).expect("bind gateway");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let _ = net::serve(listener, app, None, async {
            let _ = rx.await;
        })
        .await;
    });

    TestGateway {
        addr,
        registry,
        events,
        shutdown: Some(tx),
    }
}

fn users_toml() -> String {
    let hash = bcrypt::hash(PASSWORD, 4).unwrap();
    format!(
        r#"
        [[users]]
        id = 1
        email = "{EMAIL}"
        password_hash = "{hash}"
        user_name = "swu"
        first_name = "Stanley"
        last_name = "Wu"

        [[users]]
        id = 2
        email = "ada@example.com"
        password_hash = "{hash}"
        user_name = "ada"
        first_name = "Ada"
        last_name = "Lovelace"
        "#
    )
}

// -----------------------------------------------------------------------------
// ----- Fake backends ---------------------------------------------------------

/// What a fake backend saw, echoed back as JSON.
#[allow(dead_code)]
#[derive(Debug, Deserialize)]
pub struct Echo {
    pub backend: String,
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    #[serde(rename = "xUser")]
    pub x_user: Option<String>,
    #[serde(rename = "xForwardedFor")]
    pub x_forwarded_for: Option<String>,
    pub body: String,
}

/// Start a backend that answers every request with an [`Echo`].
#[allow(dead_code)]
pub async fn spawn_backend(name: &'static str) -> SocketAddr {
    let app = Router::new().fallback(echo).with_state(name);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind backend");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    addr
}

async fn echo(State(name): State<&'static str>, req: Request) -> Json<Value> {
    let (parts, body) = req.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    Json(json!({
        "backend": name,
        "method": parts.method.as_str(),
        "path": parts.uri.path(),
        "query": parts.uri.query(),
        "xUser": header("x-user"),
        "xForwardedFor": header("x-forwarded-for"),
        "body": String::from_utf8_lossy(&body),
    }))
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
