//! Per-client session loop
//!
//! A session reads one request line at a time, answers from the shared
//! cache when it can, otherwise forwards through its own backend connector,
//! and writes exactly one response before reading the next request.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::backend::{BackendConnector, BackendTarget};
use crate::cache::ResponseCache;
use crate::protocol::{JsonLineCodec, Request, failure_detail};
use crate::stats::ProxyStats;
use crate::{Error, Result};

/// State owned by one client connection
pub struct Session {
    /// Client address, for logging
    peer: SocketAddr,
    /// Client socket with its read buffer
    client: Framed<TcpStream, JsonLineCodec>,
    /// This session's private backend connection
    backend: BackendConnector,
    /// Cache shared by all sessions
    cache: Arc<ResponseCache>,
    /// Counters shared by all sessions
    stats: Arc<ProxyStats>,
}

impl Session {
    /// Wrap an accepted client connection
    #[must_use]
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        target: Arc<BackendTarget>,
        cache: Arc<ResponseCache>,
        stats: Arc<ProxyStats>,
    ) -> Self {
        Self {
            peer,
            client: Framed::new(stream, JsonLineCodec::new()),
            backend: BackendConnector::new(target),
            cache,
            stats,
        }
    }

    /// Serve the client until it disconnects or a write to it fails
    pub async fn run(mut self) {
        let peer = self.peer;
        info!(client = %peer, "Client connected");
        self.stats.session_opened();

        loop {
            let line = match self.client.next().await {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    debug!(client = %peer, error = %e, "Client read failed");
                    break;
                }
                None => {
                    info!(client = %peer, "Client disconnected");
                    break;
                }
            };

            let Some(response) = self.handle_line(&line).await else {
                continue;
            };

            if let Err(e) = self.client.send(&response).await {
                debug!(client = %peer, error = %e, "Client write failed");
                break;
            }
        }

        self.backend.invalidate();
        self.stats.session_closed();
        info!(client = %peer, backend_connects = self.backend.connects(), "Session finished");
    }

    /// Produce the response for one line, or `None` for a blank line
    async fn handle_line(&mut self, line: &[u8]) -> Option<Value> {
        if line.trim_ascii().is_empty() {
            return None;
        }
        self.stats.record_request();

        match self.respond(line).await {
            Ok(response) => Some(response),
            Err(e) => {
                match e {
                    Error::InvalidJsonRequest(_) | Error::InvalidRequest(_) => {
                        self.stats.record_invalid();
                        warn!(client = %self.peer, error = %e, "Rejected request");
                    }
                    _ => {
                        self.stats.record_backend_failure();
                        warn!(
                            client = %self.peer,
                            backend = %self.backend.target(),
                            error = %e,
                            "Backend exchange failed"
                        );
                    }
                }
                Some(e.to_response())
            }
        }
    }

    async fn respond(&mut self, line: &[u8]) -> Result<Value> {
        let request: Value = serde_json::from_slice(line)
            .map_err(|e| Error::InvalidJsonRequest(e.to_string()))?;
        let mode = Request::validate(&request)?.mode;

        let key = ResponseCache::build_key(&request);
        if let Some(cached) = self.cache.get(&key) {
            info!(client = %self.peer, mode = %mode, "Cache HIT");
            self.stats.record_cache_hit();
            return Ok(cached);
        }
        debug!(
            client = %self.peer,
            mode = %mode,
            reuse = self.backend.is_connected(),
            "Cache MISS"
        );

        self.backend.ensure_connected().await?;
        self.stats.record_forward();
        let raw = self.backend.send_and_receive(&request).await?;

        let response: Value = serde_json::from_slice(&raw)
            .map_err(|e| Error::InvalidBackendJson(e.to_string()))?;
        if let Some(error) = failure_detail(&response) {
            debug!(client = %self.peer, mode = %mode, error, "Backend reported failure");
        }

        self.cache.put(&key, response.clone());
        Ok(response)
    }
}
