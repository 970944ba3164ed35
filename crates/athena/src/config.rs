//! Configuration for discovery, indexing and scheduling
//!
//! Loaded from a TOML file; every field has a default so an empty file (or
//! no file at all) yields a working single-host setup against `127.0.0.1`.

use crate::discovery::range;
use crate::error::{AthenaError, Result};
use crate::scheduler::trigger::parse_cron;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AthenaConfig {
    /// Path to the SQLite database (`~/` is expanded)
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Concurrency limits for each kind of network work
    #[serde(default)]
    pub pools: PoolConfig,

    #[serde(default)]
    pub smb: SmbConfig,

    #[serde(default)]
    pub scheduling: ScheduleConfig,

    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// CIDR block, `a.b.c.d-e.f.g.h` range, single address or a
    /// comma-separated mix of those
    #[serde(default = "default_range")]
    pub range: String,

    /// Drop hosts that don't answer the probe or expose no shares
    #[serde(default = "default_minimize")]
    pub minimize: bool,

    /// TCP port probed for liveness
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    #[serde(default = "default_probe_attempts")]
    pub probe_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_probe_pool")]
    pub probe: usize,

    #[serde(default = "default_resolve_pool")]
    pub resolve: usize,

    #[serde(default = "default_enumerate_pool")]
    pub enumerate: usize,

    #[serde(default = "default_index_pool")]
    pub index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmbConfig {
    /// `smbclient` executable, looked up on `PATH` unless absolute
    #[serde(default = "default_client_binary")]
    pub client_binary: PathBuf,

    /// Bound on share enumeration and session setup
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Bound on a single directory listing
    #[serde(default = "default_list_timeout_secs")]
    pub list_timeout_secs: u64,

    /// Maximum entries per batch handed to the store; larger directories
    /// are split
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Cron expression (5 or 6 fields, local time) for the full
    /// discover, index and post-process sequence
    #[serde(default = "default_discover_cron")]
    pub discover_cron: String,

    /// Cron expression for the liveness sweep
    #[serde(default = "default_ping_cron")]
    pub ping_cron: String,

    /// Delay before the first full discovery after startup; 0 disables it
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Candidate rows fetched per query before ranking
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,

    /// Page size used when a caller doesn't pass one
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_database_path() -> PathBuf {
    athena_logging::athena_home().join("athena.sqlite3")
}

fn default_range() -> String {
    "127.0.0.1/32".to_string()
}

fn default_minimize() -> bool {
    true
}

fn default_port() -> u16 {
    445
}

fn default_probe_timeout_ms() -> u64 {
    1000
}

fn default_probe_attempts() -> u32 {
    2
}

fn default_probe_pool() -> usize {
    100
}

fn default_resolve_pool() -> usize {
    100
}

fn default_enumerate_pool() -> usize {
    50
}

fn default_index_pool() -> usize {
    50
}

fn default_client_binary() -> PathBuf {
    PathBuf::from("smbclient")
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_list_timeout_secs() -> u64 {
    30
}

fn default_batch_size() -> usize {
    500
}

fn default_discover_cron() -> String {
    "0 0 * * *".to_string()
}

fn default_ping_cron() -> String {
    "*/5 * * * *".to_string()
}

fn default_initial_delay_secs() -> u64 {
    60
}

fn default_candidate_limit() -> usize {
    100
}

fn default_page_size() -> usize {
    20
}

impl Default for AthenaConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            discovery: DiscoveryConfig::default(),
            pools: PoolConfig::default(),
            smb: SmbConfig::default(),
            scheduling: ScheduleConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            range: default_range(),
            minimize: default_minimize(),
            port: default_port(),
            probe_timeout_ms: default_probe_timeout_ms(),
            probe_attempts: default_probe_attempts(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            probe: default_probe_pool(),
            resolve: default_resolve_pool(),
            enumerate: default_enumerate_pool(),
            index: default_index_pool(),
        }
    }
}

impl Default for SmbConfig {
    fn default() -> Self {
        Self {
            client_binary: default_client_binary(),
            batch_size: default_batch_size(),
            connect_timeout_secs: default_connect_timeout_secs(),
            list_timeout_secs: default_list_timeout_secs(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            discover_cron: default_discover_cron(),
            ping_cron: default_ping_cron(),
            initial_delay_secs: default_initial_delay_secs(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            candidate_limit: default_candidate_limit(),
            page_size: default_page_size(),
        }
    }
}

impl DiscoveryConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl SmbConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn list_timeout(&self) -> Duration {
        Duration::from_secs(self.list_timeout_secs)
    }
}

impl ScheduleConfig {
    pub fn initial_delay(&self) -> Option<Duration> {
        (self.initial_delay_secs > 0).then(|| Duration::from_secs(self.initial_delay_secs))
    }
}

impl AthenaConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let mut config: AthenaConfig =
            toml::from_str(content).map_err(|e| AthenaError::config(e.to_string()))?;
        config.database_path = expand_home(&config.database_path);
        Ok(config)
    }

    /// Load `path` if given, otherwise `<athena home>/config.toml` when it
    /// exists, otherwise the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let fallback = athena_logging::athena_home().join("config.toml");
        if fallback.is_file() {
            return Self::load(&fallback);
        }
        Ok(Self::default())
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| AthenaError::config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings that would only fail once a phase runs.
    pub fn validate(&self) -> Result<()> {
        range::expand(&self.discovery.range)?;

        parse_cron(&self.scheduling.discover_cron)
            .map_err(|e| AthenaError::config(format!("scheduling.discover_cron: {e}")))?;
        parse_cron(&self.scheduling.ping_cron)
            .map_err(|e| AthenaError::config(format!("scheduling.ping_cron: {e}")))?;

        if self.discovery.probe_attempts == 0 {
            return Err(AthenaError::config("discovery.probe_attempts must be at least 1"));
        }
        if self.smb.batch_size == 0 {
            return Err(AthenaError::config("smb.batch_size must be at least 1"));
        }
        let pools = [
            ("probe", self.pools.probe),
            ("resolve", self.pools.resolve),
            ("enumerate", self.pools.enumerate),
            ("index", self.pools.index),
        ];
        for (name, size) in pools {
            if size == 0 {
                return Err(AthenaError::config(format!("pools.{name} must be at least 1")));
            }
        }
        if self.search.candidate_limit == 0 {
            return Err(AthenaError::config("search.candidate_limit must be at least 1"));
        }
        Ok(())
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AthenaConfig::default();
        assert_eq!(config.discovery.range, "127.0.0.1/32");
        assert!(config.discovery.minimize);
        assert_eq!(config.discovery.port, 445);
        assert_eq!(config.scheduling.discover_cron, "0 0 * * *");
        assert_eq!(config.scheduling.ping_cron, "*/5 * * * *");
        assert_eq!(config.scheduling.initial_delay(), Some(Duration::from_secs(60)));
        assert!(config.database_path.ends_with("athena.sqlite3"));
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = AthenaConfig::parse(
            r#"
            [discovery]
            range = "10.0.0.0/24"
            minimize = false

            [pools]
            index = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.discovery.range, "10.0.0.0/24");
        assert!(!config.discovery.minimize);
        assert_eq!(config.discovery.probe_attempts, 2);
        assert_eq!(config.pools.index, 4);
        assert_eq!(config.pools.probe, 100);
        assert_eq!(config.smb.batch_size, 500);
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut config = AthenaConfig::default();
        config.discovery.range = "10.0.0.0/33".to_string();
        assert!(config.validate().is_err());

        let mut config = AthenaConfig::default();
        config.scheduling.ping_cron = "every five minutes".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("scheduling.ping_cron"));

        let mut config = AthenaConfig::default();
        config.pools.enumerate = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("pools.enumerate"));
    }

    #[test]
    fn test_save_and_load() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");

        let mut config = AthenaConfig::default();
        config.database_path = tmp.path().join("db.sqlite3");
        config.discovery.range = "192.168.1.10-192.168.1.20".to_string();
        config.save(&path).unwrap();

        let loaded = AthenaConfig::load(&path).unwrap();
        assert_eq!(loaded.database_path, config.database_path);
        assert_eq!(loaded.discovery.range, config.discovery.range);
    }

    #[test]
    fn test_expand_home() {
        let expanded = expand_home(Path::new("~/data/athena.sqlite3"));
        assert!(!expanded.starts_with("~"));
        assert!(expanded.ends_with("data/athena.sqlite3"));
        assert_eq!(expand_home(Path::new("/var/athena.db")), PathBuf::from("/var/athena.db"));
    }
}
