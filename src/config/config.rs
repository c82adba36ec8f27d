use parking_lot::RwLock;
use secrecy::SecretString;
use std::{
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, OnceLock},
    time::Duration,
};

use super::{
    cli::{CliConfig, EventsConfig},
    routes::RoutesConfig,
    types::LogLevel,
    users::UsersConfig,
};

// -----------------------------------------------------------------------------
// ----- Global Singleton ------------------------------------------------------

static ROOT_CONFIG: OnceLock<Arc<RwLock<Config>>> = OnceLock::new();

// -----------------------------------------------------------------------------
// ----- Config ----------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: LogLevel,
    pub tls_cert_location: PathBuf,
    pub tls_key_location: PathBuf,
    pub session_key: SecretString,
    pub session_ttl: Duration,
    pub redis_url: Option<String>,
    pub allowed_origin: String,
    pub events: EventsConfig,
    pub auth_failure_delay: Duration,
    pub routes: &'static RoutesConfig,
    pub users: &'static UsersConfig,
}

// -----------------------------------------------------------------------------
// ----- Config: Static --------------------------------------------------------

impl Config {
    /// Async because the file-backed sub-configs load with non-blocking IO.
    pub async fn init() {
        CliConfig::init();

        let cli = CliConfig::snapshot();
        RoutesConfig::init(&cli.routes_file_location).await;
        UsersConfig::init(&cli.users_file_location).await;

        Self::load();
    }

    /// Re-read the file-backed sub-configs, then rebuild the snapshot.
    /// A sub-config that fails to parse keeps its previous value.
    pub async fn reload() {
        let cli = CliConfig::snapshot();
        RoutesConfig::reload(&cli.routes_file_location).await;
        UsersConfig::reload(&cli.users_file_location).await;

        Self::load();
    }

    pub fn snapshot() -> Config {
        Self::handle().read().clone()
    }
}

// -----------------------------------------------------------------------------
// ----- Config: Private -------------------------------------------------------

impl Config {
    fn load() {
        let cli = CliConfig::snapshot();

        let next = Config {
            listen_addr: cli.listen_addr,
            log_level: cli.log_level,
            tls_cert_location: cli.tls_cert_location,
            tls_key_location: cli.tls_key_location,
            session_key: cli.session_key,
            session_ttl: cli.session_ttl,
            redis_url: cli.redis_url,
            allowed_origin: cli.allowed_origin,
            events: cli.events,
            auth_failure_delay: cli.auth_failure_delay,
            routes: RoutesConfig::handle(),
            users: UsersConfig::handle(),
        };

        if let Some(handle) = ROOT_CONFIG.get() {
            *handle.write() = next;
        } else {
            let _ = ROOT_CONFIG.set(Arc::new(RwLock::new(next)));
        }
    }

    fn handle() -> Arc<RwLock<Config>> {
        ROOT_CONFIG
            .get()
            .expect("Config not initialized; call Config::init().await first")
            .clone()
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
