//! Backend connection management
//!
//! Every client session owns one [`BackendConnector`]. The connector opens
//! its TCP connection lazily, reuses it for later requests, and drops it on
//! any connect, send or receive failure so the next request reconnects.
//! Connectors are never shared between sessions.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::config::BackendConfig;
use crate::protocol::JsonLineCodec;
use crate::{Error, Result};

/// Backend coordinates shared by every session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    /// Backend host
    pub host: String,
    /// Backend port
    pub port: u16,
    /// Bound on each connection attempt
    pub connect_timeout: Duration,
    /// Bound on waiting for one response line
    pub read_timeout: Option<Duration>,
}

impl BackendTarget {
    /// Build from configuration
    #[must_use]
    pub fn from_config(config: &BackendConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
        }
    }
}

impl fmt::Display for BackendTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Live backend socket with its own read buffer
type Connection = Framed<TcpStream, JsonLineCodec>;

/// Per-session backend connection
pub struct BackendConnector {
    /// Where to connect
    target: Arc<BackendTarget>,
    /// Current connection, `None` until first needed or after a failure
    connection: Option<Connection>,
    /// Successful connects over the connector's lifetime
    connects: u64,
}

impl BackendConnector {
    /// Create a connector; no connection is opened yet
    #[must_use]
    pub fn new(target: Arc<BackendTarget>) -> Self {
        Self {
            target,
            connection: None,
            connects: 0,
        }
    }

    /// Backend this connector dials
    pub fn target(&self) -> &BackendTarget {
        &self.target
    }

    /// Whether a connection is currently held
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Number of successful connects so far
    pub fn connects(&self) -> u64 {
        self.connects
    }

    /// Connect if not already connected
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendUnavailable`] if the connection is refused or
    /// the attempt exceeds the connect timeout. Nothing is retried.
    pub async fn ensure_connected(&mut self) -> Result<()> {
        if self.connection.is_some() {
            return Ok(());
        }

        let target = &self.target;
        let attempt = TcpStream::connect((target.host.as_str(), target.port));
        let stream = match timeout(target.connect_timeout, attempt).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!(backend = %target, error = %e, "Backend connect failed");
                return Err(Error::BackendUnavailable(e.to_string()));
            }
            Err(_) => {
                warn!(backend = %target, timeout = ?target.connect_timeout, "Backend connect timed out");
                return Err(Error::BackendUnavailable(format!(
                    "connect timed out after {:?}",
                    target.connect_timeout
                )));
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY on backend socket");
        }

        self.connects += 1;
        info!(backend = %target, "Connected to backend");
        self.connection = Some(Framed::new(stream, JsonLineCodec::new()));
        Ok(())
    }

    /// Send one request and read exactly one response line
    ///
    /// Any failure drops the connection before returning.
    ///
    /// # Errors
    ///
    /// - [`Error::BackendUnavailable`] if not connected
    /// - [`Error::Forward`] if the send fails
    /// - [`Error::BackendClosed`] if the backend closes before answering
    /// - [`Error::BackendRead`] / [`Error::BackendTimeout`] if the read fails
    pub async fn send_and_receive(&mut self, request: &Value) -> Result<Bytes> {
        let result = self.exchange(request).await;
        if result.as_ref().is_err_and(Error::invalidates_backend) {
            self.invalidate();
        }
        result
    }

    async fn exchange(&mut self, request: &Value) -> Result<Bytes> {
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| Error::BackendUnavailable("not connected".to_string()))?;

        connection
            .send(request)
            .await
            .map_err(|e| Error::Forward(io_detail(e)))?;

        let next = match self.target.read_timeout {
            Some(limit) => timeout(limit, connection.next())
                .await
                .map_err(|_| Error::BackendTimeout(limit))?,
            None => connection.next().await,
        };

        match next {
            Some(Ok(line)) => Ok(line),
            Some(Err(e)) => Err(Error::BackendRead(io_detail(e))),
            None => Err(Error::BackendClosed),
        }
    }

    /// Close and forget the current connection
    pub fn invalidate(&mut self) {
        if self.connection.take().is_some() {
            debug!(backend = %self.target, "Backend connection closed");
        }
    }
}

/// Strip the crate-level prefix from transport errors
fn io_detail(error: Error) -> String {
    match error {
        Error::Io(e) => e.to_string(),
        other => other.to_string(),
    }
}
