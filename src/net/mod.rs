//! Listening socket and the per-connection accept loop.

pub mod listener;

pub use listener::{bind, serve};
