//! The gateway's own HTTP surface and the router that ties it to the
//! proxied routes.

pub mod handlers;
pub mod router;

pub use router::{AppState, build_router};
