//! JSON-line caching proxy
//!
//! A TCP proxy that sits in front of a single backend speaking a
//! newline-delimited JSON request/response protocol.
//!
//! # Features
//!
//! - **Shared LRU cache**: identical requests (in any key order) are answered
//!   without contacting the backend
//! - **Lazy backend connections**: one private backend socket per client
//!   session, opened on first miss and reopened after any failure
//! - **Fault isolation**: malformed input, backend outages and abrupt
//!   disconnects only ever affect the session they happen on
//! - **Graceful shutdown**: stop accepting, let in-flight sessions finish

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod protocol;
pub mod proxy;
pub mod stats;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Prefix on every error message the proxy itself synthesizes
pub const PROXY_ERROR_PREFIX: &str = "Proxy";

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber
                .with(fmt::layer().json())
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to install subscriber: {e}")))?;
        }
        _ => {
            subscriber
                .with(fmt::layer())
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to install subscriber: {e}")))?;
        }
    }

    Ok(())
}
