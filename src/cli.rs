//! Command-line interface

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::Config;

/// JSON-line TCP proxy with a shared LRU response cache
#[derive(Parser, Debug)]
#[command(name = "jsonline-proxy")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "JSONLINE_PROXY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Host to listen on
    #[arg(long, env = "JSONLINE_PROXY_LISTEN_HOST")]
    pub listen_host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "JSONLINE_PROXY_LISTEN_PORT")]
    pub listen_port: Option<u16>,

    /// Backend host
    #[arg(long, env = "JSONLINE_PROXY_SERVER_HOST")]
    pub server_host: Option<String>,

    /// Backend port
    #[arg(long, env = "JSONLINE_PROXY_SERVER_PORT")]
    pub server_port: Option<u16>,

    /// LRU cache size (responses)
    #[arg(long, env = "JSONLINE_PROXY_CACHE_SIZE")]
    pub cache_size: Option<usize>,

    /// Seconds to wait when connecting to the backend
    #[arg(long, env = "JSONLINE_PROXY_SERVER_TIMEOUT", value_parser = parse_seconds)]
    pub server_timeout: Option<Duration>,

    /// Seconds to wait for a backend response (0 waits forever)
    #[arg(long, env = "JSONLINE_PROXY_READ_TIMEOUT", value_parser = parse_seconds_or_zero)]
    pub read_timeout: Option<Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "JSONLINE_PROXY_LOG_LEVEL")]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "JSONLINE_PROXY_LOG_FORMAT")]
    pub log_format: Option<String>,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    pub print_config: bool,
}

impl Cli {
    /// Apply command-line overrides on top of a loaded configuration
    pub fn apply(&self, config: &mut Config) {
        if let Some(ref host) = self.listen_host {
            config.server.host.clone_from(host);
        }
        if let Some(port) = self.listen_port {
            config.server.port = port;
        }
        if let Some(ref host) = self.server_host {
            config.backend.host.clone_from(host);
        }
        if let Some(port) = self.server_port {
            config.backend.port = port;
        }
        if let Some(size) = self.cache_size {
            config.cache.capacity = size;
        }
        if let Some(timeout) = self.server_timeout {
            config.backend.connect_timeout = timeout;
        }
        if let Some(timeout) = self.read_timeout {
            config.backend.read_timeout = (!timeout.is_zero()).then_some(timeout);
        }
    }
}

fn parse_seconds(s: &str) -> Result<Duration, String> {
    let timeout = parse_seconds_or_zero(s)?;
    if timeout.is_zero() {
        return Err("timeout must be positive".to_string());
    }
    Ok(timeout)
}

fn parse_seconds_or_zero(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .parse()
        .map_err(|e| format!("expected seconds, got '{s}': {e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid seconds '{s}': {e}"))
}
