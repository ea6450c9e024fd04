//! Configuration management

use std::{path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_CAPACITY;
use crate::{Error, Result};

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "JSONLINE_PROXY_";

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listener configuration
    pub server: ServerConfig,
    /// Backend target configuration
    pub backend: BackendConfig,
    /// Response cache configuration
    pub cache: CacheConfig,
}

/// Listener configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Pending-connection queue length passed to `listen(2)`
    pub backlog: u32,
    /// How long to wait for in-flight sessions after accepting stops
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5554,
            backlog: 100,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Backend target configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend host
    pub host: String,
    /// Backend port
    pub port: u16,
    /// Bound on each connection attempt
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Bound on waiting for one response line (`None` waits forever)
    #[serde(with = "humantime_serde::option")]
    pub read_timeout: Option<Duration>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5555,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Response cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached responses (0 disables retention)
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        // Load from file if provided
        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (JSONLINE_PROXY_ prefix)
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the listener or connector cannot use
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(Error::Config("server.host must not be empty".to_string()));
        }
        if self.backend.host.is_empty() {
            return Err(Error::Config("backend.host must not be empty".to_string()));
        }
        if self.backend.port == 0 {
            return Err(Error::Config("backend.port must not be 0".to_string()));
        }
        if self.backend.connect_timeout.is_zero() {
            return Err(Error::Config(
                "backend.connect_timeout must be positive".to_string(),
            ));
        }
        if self.server.backlog == 0 {
            return Err(Error::Config("server.backlog must be positive".to_string()));
        }
        Ok(())
    }

    /// Render the effective configuration as YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s", "250ms")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(*duration))
    }

    /// Deserialize a duration string (e.g., "30s", "5m", "100ms", "2.5s") or
    /// a bare number of seconds (`5`, `2.5`)
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the value cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        DurationValue::deserialize(deserializer)?
            .into_duration()
            .map_err(serde::de::Error::custom)
    }

    /// Accepted shapes; env vars and unquoted YAML scalars arrive as numbers
    #[derive(Deserialize)]
    #[serde(untagged)]
    pub(crate) enum DurationValue {
        Secs(u64),
        FractionalSecs(f64),
        Text(String),
    }

    impl DurationValue {
        pub(crate) fn into_duration(self) -> Result<Duration, String> {
            match self {
                Self::Secs(secs) => Ok(Duration::from_secs(secs)),
                Self::FractionalSecs(secs) => Duration::try_from_secs_f64(secs)
                    .map_err(|e| format!("invalid duration '{secs}': {e}")),
                Self::Text(s) => parse_duration(&s),
            }
        }
    }

    pub(crate) fn format_duration(duration: Duration) -> String {
        if duration.subsec_nanos() == 0 {
            format!("{}s", duration.as_secs())
        } else {
            format!("{}ms", duration.as_millis())
        }
    }

    /// Parse "30s", "5m", "100ms", "0.5s" or bare seconds
    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        // "ms" must be tried before "m" and "s"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| format!("invalid duration '{s}': {e}"))
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|e| format!("invalid duration '{s}': {e}"))
        } else {
            // Seconds, suffixed or bare
            let secs = s.strip_suffix('s').unwrap_or(s).trim();
            secs.parse::<f64>()
                .map_err(|e| format!("invalid duration '{s}': {e}"))
                .and_then(|v| {
                    Duration::try_from_secs_f64(v)
                        .map_err(|e| format!("invalid duration '{s}': {e}"))
                })
        }
    }

    /// Same as the parent module, for `Option<Duration>` (`null` / absent = `None`)
    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        /// Serialize `Option<Duration>`
        ///
        /// # Errors
        ///
        /// Returns a serialization error if the serializer fails.
        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => serializer.serialize_some(&super::format_duration(*d)),
                None => serializer.serialize_none(),
            }
        }

        /// Deserialize `Option<Duration>`
        ///
        /// # Errors
        ///
        /// Returns a deserialization error if the value cannot be parsed as a duration.
        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<super::DurationValue>::deserialize(deserializer)?
                .map(|v| v.into_duration().map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 5554);
        assert_eq!(config.server.backlog, 100);
        assert_eq!(config.backend.port, 5555);
        assert_eq!(config.backend.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.cache.capacity, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
server:
  port: 6000
backend:
  host: "10.0.0.2"
  connect_timeout: "250ms"
  read_timeout: ~
cache:
  capacity: 16
"#
        )
        .unwrap();
        drop(f);

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.server.port, 6000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.backend.host, "10.0.0.2");
        assert_eq!(config.backend.connect_timeout, Duration::from_millis(250));
        assert_eq!(config.backend.read_timeout, None);
        assert_eq!(config.cache.capacity, 16);
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = Config::load(Some(Path::new("/nonexistent/proxy.yaml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("proxy.yaml", "backend:\n  port: 7000\ncache:\n  capacity: 8\n")?;
            jail.set_env("JSONLINE_PROXY_BACKEND__PORT", "7100");
            jail.set_env("JSONLINE_PROXY_SERVER__SHUTDOWN_TIMEOUT", "2s");

            let config = Config::load(Some(Path::new("proxy.yaml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.backend.port, 7100);
            assert_eq!(config.cache.capacity, 8);
            assert_eq!(config.server.shutdown_timeout, Duration::from_secs(2));
            Ok(())
        });
    }

    #[test]
    fn test_env_accepts_bare_seconds() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("JSONLINE_PROXY_BACKEND__CONNECT_TIMEOUT", "5");
            jail.set_env("JSONLINE_PROXY_BACKEND__READ_TIMEOUT", "0.25");

            let config = Config::load(None).map_err(|e| e.to_string())?;
            assert_eq!(config.backend.connect_timeout, Duration::from_secs(5));
            assert_eq!(config.backend.read_timeout, Some(Duration::from_millis(250)));
            Ok(())
        });
    }

    #[test]
    fn test_yaml_accepts_numeric_durations() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "proxy.yaml",
                "server:\n  shutdown_timeout: 10\nbackend:\n  connect_timeout: 1.5\n  read_timeout: 2.5\n",
            )?;

            let config = Config::load(Some(Path::new("proxy.yaml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.server.shutdown_timeout, Duration::from_secs(10));
            assert_eq!(config.backend.connect_timeout, Duration::from_millis(1500));
            assert_eq!(config.backend.read_timeout, Some(Duration::from_millis(2500)));
            Ok(())
        });
    }

    #[test]
    fn test_negative_duration_is_rejected() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("JSONLINE_PROXY_BACKEND__CONNECT_TIMEOUT", "-3");
            assert!(matches!(Config::load(None), Err(Error::Config(_))));
            Ok(())
        });
    }

    #[test]
    fn test_validate_rejects_zero_connect_timeout() {
        let mut config = Config::default();
        config.backend.connect_timeout = Duration::ZERO;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_yaml_round_trip() {
        let mut config = Config::default();
        config.backend.read_timeout = Some(Duration::from_millis(1500));

        let yaml = config.to_yaml().unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_parse_duration_units() {
        use humantime_serde::parse_duration;

        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("100ms"), Ok(Duration::from_millis(100)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("0.5"), Ok(Duration::from_millis(500)));
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("-1s").is_err());
    }
}
