use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, WorkerConfigError};
use crate::worker::PeriodicWorkerConfig;

/// Top‑level server configuration. Every field has a default, so an empty
/// or missing file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// PID file to create at startup; none when unset.
    pub pid_file: Option<PathBuf>,
    /// Path of the statistics endpoint, relative to the server root.
    pub stats_path: String,
    /// Public base URL when the server sits behind a proxy.
    pub canonical_base_url: Option<String>,
    pub keepalive: KeepaliveConfig,
    pub statistics: StatisticsConfig,
    pub shutdown: ShutdownConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeepaliveConfig {
    pub period_secs: u64,
    pub poll_millis: u64,
    /// Peers silent for longer than this are dropped.
    pub peer_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StatisticsConfig {
    pub period_millis: u64,
    pub poll_millis: u64,
    /// Number of snapshots kept for the statistics endpoint.
    pub history: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShutdownConfig {
    /// How often the main thread re-checks for a shutdown request.
    pub wait_poll_millis: u64,
    /// Pause between stopping the server and joining its thread.
    pub grace_millis: u64,
    /// Upper bound on the server thread join.
    pub join_timeout_millis: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 8080,
            pid_file: None,
            stats_path: "admin/stats.json".into(),
            canonical_base_url: None,
            keepalive: KeepaliveConfig::default(),
            statistics: StatisticsConfig::default(),
            shutdown: ShutdownConfig::default(),
        }
    }
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            period_secs: 30,
            poll_millis: 1000,
            peer_timeout_secs: 60,
        }
    }
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            period_millis: 1000,
            poll_millis: 20,
            history: 3600,
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            wait_poll_millis: 500,
            grace_millis: 200,
            join_timeout_millis: 1000,
        }
    }
}

impl KeepaliveConfig {
    pub fn worker_config(&self) -> Result<PeriodicWorkerConfig, WorkerConfigError> {
        PeriodicWorkerConfig::new(
            "keepalive",
            Duration::from_secs(self.period_secs),
            Duration::from_millis(self.poll_millis),
        )
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_timeout_secs)
    }
}

impl StatisticsConfig {
    pub fn worker_config(&self) -> Result<PeriodicWorkerConfig, WorkerConfigError> {
        PeriodicWorkerConfig::new(
            "statistics",
            Duration::from_millis(self.period_millis),
            Duration::from_millis(self.poll_millis),
        )
    }
}

impl ShutdownConfig {
    pub fn wait_poll(&self) -> Duration {
        Duration::from_millis(self.wait_poll_millis)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_millis)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_millis)
    }
}

impl ServerConfig {
    /// Parse a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the explicit config file if given, otherwise the per-user one
    /// if it exists, otherwise defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            log::info!("Using config from: {}", path.display());
            return Self::load(path);
        }
        match Self::user_config_path() {
            Some(path) if path.is_file() => {
                log::info!("Using config from: {}", path.display());
                Self::load(&path)
            }
            _ => {
                log::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("conspire").join("conspire.toml"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stats_path.trim_start_matches('/').is_empty() {
            return Err(ConfigError::Invalid("stats_path must not be empty".into()));
        }
        if self.stats_path.contains(['{', '}', '*']) {
            return Err(ConfigError::Invalid(format!(
                "stats_path must be a literal path, got {:?}",
                self.stats_path
            )));
        }
        if self.statistics.history == 0 {
            return Err(ConfigError::Invalid(
                "statistics.history must keep at least one snapshot".into(),
            ));
        }
        if self.shutdown.wait_poll_millis == 0 {
            return Err(ConfigError::Invalid(
                "shutdown.wait_poll_millis must be non-zero".into(),
            ));
        }
        self.keepalive
            .worker_config()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.statistics
            .worker_config()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Configured public URL without trailing slash, or one built from the
    /// listen address.
    pub fn canonical_base_url(&self) -> String {
        match &self.canonical_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }

    /// Route the statistics endpoint is registered under.
    pub fn stats_route(&self) -> String {
        format!("/{}", self.stats_path.trim_start_matches('/'))
    }

    pub fn stats_url(&self) -> String {
        format!("{}{}", self.canonical_base_url(), self.stats_route())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = ServerConfig::default();
        cfg.validate().unwrap();

        let keepalive = cfg.keepalive.worker_config().unwrap();
        assert_eq!(keepalive.nominal_period(), Duration::from_secs(30));
        assert_eq!(keepalive.polls_per_period(), 30);
        let statistics = cfg.statistics.worker_config().unwrap();
        assert_eq!(statistics.poll_granularity(), Duration::from_millis(20));
        assert_eq!(statistics.polls_per_period(), 50);
    }

    #[test]
    fn stats_path_must_be_literal() {
        let mut cfg = ServerConfig::default();
        cfg.stats_path = "stats/{id}".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conspire.toml");
        std::fs::write(
            &path,
            "port = 9000\npid_file = \"/run/conspire.pid\"\n[shutdown]\ngrace_millis = 50\n",
        )
        .unwrap();

        let cfg = ServerConfig::load(&path).unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.pid_file, Some(PathBuf::from("/run/conspire.pid")));
        assert_eq!(cfg.shutdown.grace(), Duration::from_millis(50));
        assert_eq!(cfg.shutdown.join_timeout(), Duration::from_secs(1));
        assert_eq!(cfg.host, "localhost");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conspire.toml");
        std::fs::write(&path, "prot = 9000\n").unwrap();
        assert!(matches!(
            ServerConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = ServerConfig::discover(Some(Path::new("/nonexistent/conspire.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn uneven_worker_timing_fails_validation() {
        let mut cfg = ServerConfig::default();
        cfg.statistics.poll_millis = 300;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn urls() {
        let mut cfg = ServerConfig::default();
        assert_eq!(cfg.canonical_base_url(), "http://localhost:8080");
        assert_eq!(cfg.stats_url(), "http://localhost:8080/admin/stats.json");

        cfg.canonical_base_url = Some("https://chat.example.org/".into());
        cfg.stats_path = "/metrics.json".into();
        assert_eq!(cfg.stats_route(), "/metrics.json");
        assert_eq!(cfg.stats_url(), "https://chat.example.org/metrics.json");
    }
}
