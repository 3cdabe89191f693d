//! Gateway configuration.
//!
//! Everything is read from the environment at startup. Malformed values are
//! rejected here so the node never starts half-configured.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use streamgate_cluster::{ClusterConfig, MembershipBackend};
use streamgate_control::{ReaperConfig, SessionConfig, WarmupConfig};
use streamgate_store::RedisStoreConfig;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// A configuration value that could not be accepted.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The value could not be parsed.
    #[error("invalid {var}={value:?}: {reason}")]
    Invalid {
        /// Environment variable name.
        var: &'static str,
        /// Offending value.
        value: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A duration that must be positive was zero.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Which session store backs the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Embedded `RocksDB`, for a single host.
    #[default]
    Rocksdb,
    /// Shared Redis, for a cluster.
    Redis,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rocksdb" | "rocks" => Ok(Self::Rocksdb),
            "redis" => Ok(Self::Redis),
            other => Err(format!("unknown store backend {other:?}")),
        }
    }
}

/// Configuration for a gateway node.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Listen address (e.g., "0.0.0.0:9091").
    #[serde(default = "GatewayConfig::default_listen_addr")]
    pub listen_addr: String,

    /// Host peers use to reach this node. Detected when unset.
    #[serde(default)]
    pub advertise_host: Option<String>,

    /// Default tracing filter when `RUST_LOG` is unset.
    #[serde(default = "GatewayConfig::default_log_level")]
    pub log_level: String,

    /// Session store backend.
    #[serde(default)]
    pub store_backend: StoreBackend,

    /// `RocksDB` data directory.
    #[serde(default = "GatewayConfig::default_data_dir")]
    pub data_dir: PathBuf,

    /// Redis backend settings.
    #[serde(default)]
    pub redis: RedisStoreConfig,

    /// Cluster membership settings.
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Inactivity after which an SSE session is evicted.
    #[serde(default = "GatewayConfig::default_session_timeout")]
    pub session_timeout_seconds: u64,

    /// Time between reaper sweeps.
    #[serde(default = "GatewayConfig::default_sweep_period")]
    pub sweep_period_seconds: u64,

    /// Delay before the first reaper sweep.
    #[serde(default = "GatewayConfig::default_sweep_initial_delay")]
    pub sweep_initial_delay_seconds: u64,

    /// Upper bound for one store call.
    #[serde(default = "GatewayConfig::default_store_timeout")]
    pub store_timeout_ms: u64,

    /// Whether startup warmup runs.
    #[serde(default = "GatewayConfig::default_warmup_enabled")]
    pub warmup_enabled: bool,

    /// Interface prefixes admitted for warmup.
    #[serde(default)]
    pub warmup_whitelist: Vec<String>,

    /// JSON catalog of approved services.
    #[serde(default)]
    pub warmup_catalog_path: Option<PathBuf>,

    /// Timeout for one warmup connection.
    #[serde(default = "GatewayConfig::default_warmup_connect_timeout")]
    pub warmup_connect_timeout_ms: u64,

    /// Allowed CORS origins.
    #[serde(default = "GatewayConfig::default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    #[serde(default = "GatewayConfig::default_max_body")]
    pub max_body_bytes: usize,

    /// Timeout for non-streaming requests, in seconds.
    #[serde(default = "GatewayConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl GatewayConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:9091".to_string()
    }

    fn default_log_level() -> String {
        "info".to_string()
    }

    fn default_data_dir() -> PathBuf {
        PathBuf::from("/data/streamgate")
    }

    const fn default_session_timeout() -> u64 {
        600
    }

    const fn default_sweep_period() -> u64 {
        60
    }

    const fn default_sweep_initial_delay() -> u64 {
        60
    }

    const fn default_store_timeout() -> u64 {
        2000
    }

    const fn default_warmup_enabled() -> bool {
        true
    }

    const fn default_warmup_connect_timeout() -> u64 {
        3000
    }

    fn default_cors_origins() -> Vec<String> {
        vec!["*".to_string()]
    }

    const fn default_max_body() -> usize {
        1024 * 1024 // 1 MB
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for any malformed or out-of-range value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for any malformed or out-of-range value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get("LISTEN_ADDR") {
            config.listen_addr = v;
        }
        config.advertise_host = get("ADVERTISE_HOST");
        if let Some(v) = get("LOG_LEVEL") {
            EnvFilter::try_new(&v).map_err(|e| ConfigError::Invalid {
                var: "LOG_LEVEL",
                value: v.clone(),
                reason: e.to_string(),
            })?;
            config.log_level = v;
        }
        if let Some(v) = get("STORE_BACKEND") {
            config.store_backend = parse("STORE_BACKEND", &v)?;
        }
        if let Some(v) = get("DATA_DIR") {
            config.data_dir = PathBuf::from(v);
        }

        if let Some(v) = get("REDIS_URL") {
            config.redis.url = v;
        }
        if let Some(v) = get("SESSION_KEY_PREFIX") {
            config.redis.key_prefix = v;
        }
        if let Some(v) = get("SESSION_TTL_SECONDS") {
            config.redis.ttl = Duration::from_secs(positive("SESSION_TTL_SECONDS", &v)?);
        }

        if let Some(v) = get("SESSION_TIMEOUT_SECONDS") {
            config.session_timeout_seconds = positive("SESSION_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = get("SWEEP_PERIOD_SECONDS") {
            config.sweep_period_seconds = positive("SWEEP_PERIOD_SECONDS", &v)?;
        }
        if let Some(v) = get("SWEEP_INITIAL_DELAY_SECONDS") {
            config.sweep_initial_delay_seconds = positive("SWEEP_INITIAL_DELAY_SECONDS", &v)?;
        }
        if let Some(v) = get("STORE_TIMEOUT_MS") {
            config.store_timeout_ms = positive("STORE_TIMEOUT_MS", &v)?;
        }

        if let Some(v) = get("MEMBERSHIP_BACKEND") {
            config.cluster.backend = v
                .parse::<MembershipBackend>()
                .map_err(|e| ConfigError::Invalid {
                    var: "MEMBERSHIP_BACKEND",
                    value: v.clone(),
                    reason: e.to_string(),
                })?;
        }
        if let Some(v) = get("NACOS_URL") {
            config.cluster.nacos_url = v;
        }
        if let Some(v) = get("CLUSTER_SERVICE_NAME") {
            config.cluster.service_name = v;
        }
        if let Some(v) = get("CLUSTER_GROUP") {
            config.cluster.group = v;
        }
        if let Some(v) = get("CLUSTER_REGISTER") {
            config.cluster.register_self = parse_bool("CLUSTER_REGISTER", &v)?;
        }
        if let Some(v) = get("CLUSTER_HEARTBEAT_SECONDS") {
            config.cluster.heartbeat_interval =
                Duration::from_secs(positive("CLUSTER_HEARTBEAT_SECONDS", &v)?);
        }

        if let Some(v) = get("WARMUP_ENABLED") {
            config.warmup_enabled = parse_bool("WARMUP_ENABLED", &v)?;
        }
        if let Some(v) = get("WARMUP_WHITELIST") {
            config.warmup_whitelist = v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }
        config.warmup_catalog_path = get("WARMUP_CATALOG_PATH").map(PathBuf::from);
        if let Some(v) = get("WARMUP_CONNECT_TIMEOUT_MS") {
            config.warmup_connect_timeout_ms = positive("WARMUP_CONNECT_TIMEOUT_MS", &v)?;
        }

        if let Some(port) = config.listen_port() {
            config.cluster.peer_port = port;
        }

        Ok(config)
    }

    /// Port part of the listen address, if it parses.
    #[must_use]
    pub fn listen_port(&self) -> Option<u16> {
        self.listen_addr
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse().ok())
    }

    /// Settings for the session manager.
    #[must_use]
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            ..SessionConfig::default()
        }
    }

    /// Settings for the reaper.
    #[must_use]
    pub fn reaper(&self) -> ReaperConfig {
        ReaperConfig {
            period: Duration::from_secs(self.sweep_period_seconds),
            initial_delay: Duration::from_secs(self.sweep_initial_delay_seconds),
            timeout: Duration::from_secs(self.session_timeout_seconds),
        }
    }

    /// Settings for warmup.
    #[must_use]
    pub fn warmup(&self) -> WarmupConfig {
        WarmupConfig {
            enabled: self.warmup_enabled,
            whitelist: self.warmup_whitelist.clone(),
            catalog_path: self.warmup_catalog_path.clone(),
            connect_timeout: Duration::from_millis(self.warmup_connect_timeout_ms),
        }
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            advertise_host: None,
            log_level: Self::default_log_level(),
            store_backend: StoreBackend::default(),
            data_dir: Self::default_data_dir(),
            redis: RedisStoreConfig::default(),
            cluster: ClusterConfig::default(),
            session_timeout_seconds: Self::default_session_timeout(),
            sweep_period_seconds: Self::default_sweep_period(),
            sweep_initial_delay_seconds: Self::default_sweep_initial_delay(),
            store_timeout_ms: Self::default_store_timeout(),
            warmup_enabled: Self::default_warmup_enabled(),
            warmup_whitelist: Vec::new(),
            warmup_catalog_path: None,
            warmup_connect_timeout_ms: Self::default_warmup_connect_timeout(),
            cors_origins: Self::default_cors_origins(),
            max_body_bytes: Self::default_max_body(),
            request_timeout_seconds: Self::default_request_timeout(),
        }
    }
}

fn parse<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn positive(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    match parse::<u64>(var, value)? {
        0 => Err(ConfigError::Zero(var)),
        n => Ok(n),
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<GatewayConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        GatewayConfig::from_lookup(|var| map.get(var).cloned())
    }

    #[test]
    fn default_config() {
        let config = load(&[]).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:9091");
        assert_eq!(config.store_backend, StoreBackend::Rocksdb);
        assert_eq!(config.redis.ttl, Duration::from_secs(1800));
        assert_eq!(config.reaper().timeout, Duration::from_secs(600));
        assert_eq!(config.reaper().period, Duration::from_secs(60));
        assert_eq!(config.session().store_timeout, Duration::from_millis(2000));
        assert_eq!(config.cluster.backend, MembershipBackend::Static);
        assert_eq!(config.cluster.peer_port, 9091);
        assert!(config.cluster.register_self);
        assert!(config.warmup().enabled);
        assert!(config.warmup().whitelist.is_empty());
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            ("LISTEN_ADDR", "0.0.0.0:7000"),
            ("STORE_BACKEND", "Redis"),
            ("REDIS_URL", "redis://cache:6379"),
            ("SESSION_TIMEOUT_SECONDS", "120"),
            ("MEMBERSHIP_BACKEND", "k8s"),
            ("CLUSTER_REGISTER", "false"),
            ("CLUSTER_HEARTBEAT_SECONDS", "10"),
            ("WARMUP_ENABLED", "false"),
            ("WARMUP_WHITELIST", "com.acme.Order, org.example. ,"),
        ])
        .unwrap();

        assert_eq!(config.store_backend, StoreBackend::Redis);
        assert_eq!(config.redis.url, "redis://cache:6379");
        assert_eq!(config.reaper().timeout, Duration::from_secs(120));
        assert_eq!(config.cluster.backend, MembershipBackend::Kubernetes);
        assert_eq!(config.cluster.peer_port, 7000);
        assert!(!config.cluster.register_self);
        assert_eq!(config.cluster.heartbeat_interval, Duration::from_secs(10));
        assert!(!config.warmup_enabled);
        assert_eq!(config.warmup_whitelist, ["com.acme.Order", "org.example."]);
    }

    #[test]
    fn rejects_zero_durations() {
        for var in [
            "SESSION_TIMEOUT_SECONDS",
            "SWEEP_PERIOD_SECONDS",
            "SWEEP_INITIAL_DELAY_SECONDS",
            "CLUSTER_HEARTBEAT_SECONDS",
        ] {
            assert!(matches!(load(&[(var, "0")]), Err(ConfigError::Zero(v)) if v == var));
        }
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(matches!(
            load(&[("SWEEP_PERIOD_SECONDS", "1m")]),
            Err(ConfigError::Invalid { var: "SWEEP_PERIOD_SECONDS", .. })
        ));
        assert!(load(&[("STORE_BACKEND", "postgres")]).is_err());
        assert!(load(&[("MEMBERSHIP_BACKEND", "zookeeper")]).is_err());
        assert!(load(&[("WARMUP_ENABLED", "maybe")]).is_err());
        assert!(load(&[("LOG_LEVEL", "streamgate=verbose")]).is_err());
    }

    #[test]
    fn timeout_duration() {
        let config = GatewayConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }
}
