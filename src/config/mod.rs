pub mod cli;
#[allow(clippy::module_inception)]
pub mod config;
pub mod routes;
pub mod types;
pub mod users;

pub use config::Config;
pub use routes::{RouteRecord, RoutesConfig, RoutesError};
pub use types::LogLevel;
pub use users::UsersConfig;
