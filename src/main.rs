use std::io;
use std::num::NonZeroUsize;
use std::sync::Arc;

use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use gatecrab::config::Config;
use gatecrab::gateway::GatewayPools;
use gatecrab::realtime::{ConnectionRegistry, FanoutBridge, RedisStreamSource};
use gatecrab::sessions::{MemoryStore, RedisStore, SessionManager, SessionStore};
use gatecrab::{AppState, build_router, net, tls};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const APP_NAME: &str = "🦀 gatecrab";

const MEMORY_STORE_CAPACITY: NonZeroUsize = NonZeroUsize::new(100_000).unwrap();

// -----------------------------------------------------------------------------
// ----- Main ------------------------------------------------------------------

#[tokio::main]
async fn main() -> io::Result<()> {
    setup().await;
    run_forever().await
}

// -----------------------------------------------------------------------------
// ----- Setup -----------------------------------------------------------------

async fn setup() {
    // This has to be the first thing we do, because it initializes the config
    Config::init().await;

    init_tracing();
    spawn_reload_on_hangup();
}

fn init_tracing() {
    let config = Config::snapshot();
    let filter = EnvFilter::try_new(config.log_level.as_str())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

/// SIGHUP re-reads the accounts and routes files. A file that fails to
/// parse keeps its previous contents.
fn spawn_reload_on_hangup() {
    #[cfg(unix)]
    tokio::spawn(async {
        use signal::unix::{SignalKind, signal};

        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                warn!("config reload on SIGHUP disabled: {e}");
                return;
            }
        };

        while hangup.recv().await.is_some() {
            info!("SIGHUP received; reloading config files");
            Config::reload().await;
        }
    });
}

// -----------------------------------------------------------------------------
// ----- Run -------------------------------------------------------------------

async fn run_forever() -> io::Result<()> {
    // Config might reload, but the fields used by run_forever are set at startup
    let config = Config::snapshot();

    let acceptor = tls::load_acceptor(&config.tls_cert_location, &config.tls_key_location)
        .map_err(io::Error::other)?;

    let store: Arc<dyn SessionStore> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisStore::connect(url, config.session_ttl)
                .await
                .map_err(io::Error::other)?,
        ),
        None => {
            warn!("no redis url configured; sessions live in process memory");
            Arc::new(MemoryStore::new(config.session_ttl, MEMORY_STORE_CAPACITY))
        }
    };

    let routes = config.routes.routes();
    let pools = Arc::new(GatewayPools::new(&routes).map_err(io::Error::other)?);
    let registry = Arc::new(ConnectionRegistry::new());

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(io::Error::other)?;

    let state = AppState {
        sessions: SessionManager::new(config.session_key.clone(), store),
        users: Arc::new(config.users.clone()),
        registry: registry.clone(),
        pools,
        allowed_origin: Arc::from(config.allowed_origin.as_str()),
        auth_failure_delay: config.auth_failure_delay,
    };

    let app = build_router(state, &routes, client);

    match &config.redis_url {
        Some(url) => match RedisStreamSource::connect(url, &config.events).await {
            Ok(source) => {
                let bridge = FanoutBridge::new(registry);
                tokio::spawn(async move { bridge.run(source).await });
            }
            Err(e) => error!("event fanout disabled: {e}"),
        },
        None => warn!("no redis url configured; event fanout disabled"),
    }

    let listener = net::bind(config.listen_addr)?;

    info!("{} listening on {}", APP_NAME, config.listen_addr);

    net::serve(listener, app, Some(acceptor), async {
        let _ = signal::ctrl_c().await;
    })
    .await?;

    info!("{} shutting down", APP_NAME);

    Ok(())
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
