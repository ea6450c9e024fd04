//! Listener and per-client sessions

mod server;
mod session;

pub use server::{Proxy, shutdown_signal};
pub use session::Session;
