//! Route target pools and the authenticated reverse-proxy dispatcher.

pub mod pool;
pub mod proxy;

pub use pool::{BackendTarget, GatewayPools, PoolError, PoolStats, TargetPool};
pub use proxy::{Dispatcher, IDENTITY_HEADER};
