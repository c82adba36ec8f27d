pub mod analytics;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod http;
pub mod net;
pub mod realtime;
pub mod sessions;
pub mod tls;
pub mod users;

pub use config::Config;
pub use errors::GatewayError;
pub use http::{AppState, build_router};
