use clap::Parser;
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use std::{
    fs,
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
    time::Duration,
};

use super::types::{LogLevel, parse_duration};

// -----------------------------------------------------------------------------
// ----- Global Singleton ------------------------------------------------------

static CLI_CONFIG: OnceLock<Arc<RwLock<CliConfig>>> = OnceLock::new();

// -----------------------------------------------------------------------------
// ----- CliConfig -------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct CliConfig {
    pub listen_addr: SocketAddr,
    pub log_level: LogLevel,
    pub routes_file_location: PathBuf,
    pub users_file_location: PathBuf,
    pub tls_cert_location: PathBuf,
    pub tls_key_location: PathBuf,
    pub session_key: SecretString,
    pub session_ttl: Duration,
    pub redis_url: Option<String>,
    pub allowed_origin: String,
    pub events: EventsConfig,
    pub auth_failure_delay: Duration,
}

/// Where the fanout bridge reads backend events from.
#[derive(Clone, Debug)]
pub struct EventsConfig {
    pub stream: String,
    pub group: String,
    pub consumer: String,
}

impl CliConfig {
    pub fn init() {
        CLI_CONFIG.get_or_init(|| {
            let cfg = Self::from_args();
            cfg.validate();
            Arc::new(RwLock::new(cfg))
        });
    }

    pub fn snapshot() -> CliConfig {
        handle().read().clone()
    }
}

// -----------------------------------------------------------------------------
// ----- CliConfig: Private ----------------------------------------------------

impl CliConfig {
    fn from_args() -> Self {
        let args = Args::try_parse().unwrap_or_else(|e| panic!("Invalid CLI/ENV: {e}"));

        Self {
            listen_addr: SocketAddr::from((args.host, args.port)),
            log_level: args.log_level,
            routes_file_location: args.routes_file,
            users_file_location: args.users_file,
            tls_cert_location: args.tls_cert,
            tls_key_location: args.tls_key,
            session_key: SecretString::new(args.session_key.into_boxed_str()),
            session_ttl: args.session_ttl,
            redis_url: args.redis_url.filter(|url| !url.trim().is_empty()),
            allowed_origin: args.allowed_origin,
            events: EventsConfig {
                stream: args.events_stream,
                group: args.events_group,
                consumer: args.events_consumer,
            },
            auth_failure_delay: args.auth_failure_delay,
        }
    }

    fn validate(&self) {
        must_exist_file(&self.routes_file_location, "--routes / routes.toml");
        must_exist_file(&self.users_file_location, "--users / users.toml");
        must_exist_file(&self.tls_cert_location, "--tls-cert / GATECRAB_TLS_CERT");
        must_exist_file(&self.tls_key_location, "--tls-key / GATECRAB_TLS_KEY");

        if self.session_key.expose_secret().is_empty() {
            panic!("session signing key is empty (from --session-key / GATECRAB_SESSION_KEY)");
        }

        if self.allowed_origin.trim().is_empty() {
            panic!("allowed origin is empty (from --allowed-origin / GATECRAB_ALLOWED_ORIGIN)");
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Args ------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "gatecrab", version, about = "Session-aware API gateway")]
struct Args {
    // IPv4 or IPv6 literal (e.g., 0.0.0.0, ::).
    #[arg(long = "host", short = 'H', env = "GATECRAB_HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    #[arg(long = "port", short = 'p', env = "GATECRAB_PORT", default_value_t = 443)]
    port: u16,

    // Not required via CLI or ENV (defaults to info).
    #[arg(long = "log", env = "GATECRAB_LOG", default_value = "info")]
    log_level: LogLevel,

    // Must exist; no defaults.
    #[arg(long = "routes", env = "GATECRAB_ROUTES_FILE")]
    routes_file: PathBuf,

    // Must exist; no defaults.
    #[arg(long = "users", env = "GATECRAB_USERS_FILE")]
    users_file: PathBuf,

    #[arg(long = "tls-cert", env = "GATECRAB_TLS_CERT")]
    tls_cert: PathBuf,

    #[arg(long = "tls-key", env = "GATECRAB_TLS_KEY")]
    tls_key: PathBuf,

    // Prefer the env var; CLI args show up in `ps`.
    #[arg(long = "session-key", env = "GATECRAB_SESSION_KEY", hide_env_values = true)]
    session_key: String,

    #[arg(
        long = "session-ttl",
        env = "GATECRAB_SESSION_TTL",
        default_value = "100000h",
        value_parser = parse_duration
    )]
    session_ttl: Duration,

    // Absent: in-memory sessions, no event fanout.
    #[arg(long = "redis", env = "GATECRAB_REDIS_URL")]
    redis_url: Option<String>,

    #[arg(long = "allowed-origin", env = "GATECRAB_ALLOWED_ORIGIN")]
    allowed_origin: String,

    #[arg(long = "events-stream", env = "GATECRAB_EVENTS_STREAM", default_value = "events")]
    events_stream: String,

    #[arg(long = "events-group", env = "GATECRAB_EVENTS_GROUP", default_value = "gateway")]
    events_group: String,

    #[arg(long = "events-consumer", env = "GATECRAB_EVENTS_CONSUMER", default_value = "gateway-1")]
    events_consumer: String,

    #[arg(
        long = "auth-failure-delay",
        env = "GATECRAB_AUTH_FAILURE_DELAY",
        default_value = "1s",
        value_parser = parse_duration
    )]
    auth_failure_delay: Duration,
}

// -----------------------------------------------------------------------------
// ----- Private Utils ---------------------------------------------------------

fn handle() -> Arc<RwLock<CliConfig>> {
    CLI_CONFIG
        .get()
        .expect("config not initialized; call Config::init().await first")
        .clone()
}

fn must_exist_file(path: &Path, hint: &str) {
    let md = fs::metadata(path).unwrap_or_else(|_| {
        panic!("required file missing: {} (from {hint})", path.display());
    });

    if !md.is_file() {
        panic!("path is not a file: {} (from {hint})", path.display());
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
