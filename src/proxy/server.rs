//! Proxy listener

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket, lookup_host};
use tokio::signal;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::session::Session;
use crate::backend::BackendTarget;
use crate::cache::ResponseCache;
use crate::config::Config;
use crate::stats::ProxyStats;
use crate::{Error, Result};

/// Pause after a failed `accept` (e.g. out of file descriptors)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Bound listener plus the state every session shares
pub struct Proxy {
    /// Configuration
    config: Config,
    /// Listening socket
    listener: TcpListener,
    /// Backend coordinates
    target: Arc<BackendTarget>,
    /// The one response cache
    cache: Arc<ResponseCache>,
    /// Proxy-wide counters
    stats: Arc<ProxyStats>,
}

impl Proxy {
    /// Bind the listening socket
    ///
    /// # Errors
    ///
    /// Returns an error if the host does not resolve or the bind fails.
    pub async fn bind(config: Config) -> Result<Self> {
        let host = config.server.host.as_str();
        let addr = lookup_host((host, config.server.port))
            .await?
            .next()
            .ok_or_else(|| Error::Config(format!("Host did not resolve: {host}")))?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(config.server.backlog)?;

        let target = Arc::new(BackendTarget::from_config(&config.backend));
        let cache = Arc::new(ResponseCache::new(config.cache.capacity));

        Ok(Self {
            config,
            listener,
            target,
            cache,
            stats: Arc::new(ProxyStats::new()),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared response cache
    pub fn cache(&self) -> Arc<ResponseCache> {
        Arc::clone(&self.cache)
    }

    /// Shared counters
    pub fn stats(&self) -> Arc<ProxyStats> {
        Arc::clone(&self.stats)
    }

    /// Run until Ctrl+C or SIGTERM
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Accept connections until `shutdown` resolves, then drain sessions
    ///
    /// Each connection gets its own task. After `shutdown` fires no new
    /// connections are accepted; sessions still running are given
    /// `server.shutdown_timeout` to finish before they are aborted.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let Self {
            config,
            listener,
            target,
            cache,
            stats,
        } = self;

        info!(
            host = %config.server.host,
            port = listener.local_addr()?.port(),
            backend = %target,
            cache = cache.capacity(),
            "Listening"
        );

        let mut sessions = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("No longer accepting connections");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(client = %peer, error = %e, "Failed to set TCP_NODELAY");
                        }
                        let session = Session::new(
                            stream,
                            peer,
                            Arc::clone(&target),
                            Arc::clone(&cache),
                            Arc::clone(&stats),
                        );
                        sessions.spawn(session.run());
                    }
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                        tokio::select! {
                            () = &mut shutdown => {
                                info!("No longer accepting connections");
                                break;
                            }
                            () = tokio::time::sleep(ACCEPT_BACKOFF) => {}
                        }
                    }
                },
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Session task failed");
                    }
                }
            }
        }

        drop(listener);

        if !sessions.is_empty() {
            info!(sessions = sessions.len(), "Waiting for open sessions to finish");
            let drain = async {
                while let Some(joined) = sessions.join_next().await {
                    if let Err(e) = joined {
                        error!(error = %e, "Session task failed");
                    }
                }
            };
            if tokio::time::timeout(config.server.shutdown_timeout, drain)
                .await
                .is_err()
            {
                warn!(
                    sessions = sessions.len(),
                    "Shutdown timeout elapsed, aborting open sessions"
                );
                sessions.shutdown().await;
            }
        }

        let totals = stats.snapshot();
        let cache_stats = cache.stats();
        info!(
            sessions = totals.sessions_opened,
            requests = totals.requests,
            invalid = totals.invalid_requests,
            cache_hits = totals.cache_hits,
            forwards = totals.backend_forwards,
            backend_failures = totals.backend_failures,
            cache_size = cache_stats.size,
            cache_hit_rate = cache_stats.hit_rate,
            evictions = cache_stats.evictions,
            "Proxy stopped"
        );

        Ok(())
    }
}

/// Resolve on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
