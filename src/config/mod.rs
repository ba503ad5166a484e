//! Configuration Management
//!
//! Provides:
//! - BFT cluster sizing (`n`, `f`, `c`, clients, read-only replicas)
//! - Member endpoint layout
//! - Budgets and poll intervals for every convergence wait
//! - Loading/saving YAML configuration with defaults

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::cluster::{Member, MemberId};
use crate::error::{Result, WaitError};
use crate::quorum;

/// Unvalidated form of [`ClusterConfig`] as it appears on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSizing {
    pub n: usize,
    pub f: usize,
    pub c: usize,
    #[serde(default = "default_num_clients")]
    pub num_clients: usize,
    #[serde(default)]
    pub num_ro_replicas: usize,
}

/// Sizing of one replica group. Only constructible when `n = 3f + 2c + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ClusterSizing", into = "ClusterSizing")]
pub struct ClusterConfig {
    n: usize,
    f: usize,
    c: usize,
    num_clients: usize,
    num_ro_replicas: usize,
}

impl ClusterConfig {
    pub fn new(n: usize, f: usize, c: usize) -> Result<Self> {
        quorum::validate(n, f, c)?;
        Ok(Self {
            n,
            f,
            c,
            num_clients: default_num_clients(),
            num_ro_replicas: 0,
        })
    }

    pub fn with_clients(mut self, num_clients: usize) -> Self {
        self.num_clients = num_clients;
        self
    }

    pub fn with_ro_replicas(mut self, num_ro_replicas: usize) -> Self {
        self.num_ro_replicas = num_ro_replicas;
        self
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn f(&self) -> usize {
        self.f
    }

    pub fn c(&self) -> usize {
        self.c
    }

    pub fn num_clients(&self) -> usize {
        self.num_clients
    }

    pub fn num_ro_replicas(&self) -> usize {
        self.num_ro_replicas
    }

    pub fn quorum_size(&self) -> usize {
        quorum::quorum_size(self.f, self.c)
    }

    pub fn max_faulty(&self) -> usize {
        self.f
    }

    /// Voting replicas plus read-only replicas.
    pub fn total_members(&self) -> usize {
        self.n.saturating_add(self.num_ro_replicas)
    }
}

impl TryFrom<ClusterSizing> for ClusterConfig {
    type Error = WaitError;

    fn try_from(sizing: ClusterSizing) -> Result<Self> {
        Ok(ClusterConfig::new(sizing.n, sizing.f, sizing.c)?
            .with_clients(sizing.num_clients)
            .with_ro_replicas(sizing.num_ro_replicas))
    }
}

impl From<ClusterConfig> for ClusterSizing {
    fn from(config: ClusterConfig) -> Self {
        Self {
            n: config.n,
            f: config.f,
            c: config.c,
            num_clients: config.num_clients,
            num_ro_replicas: config.num_ro_replicas,
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            n: 4,
            f: 1,
            c: 0,
            num_clients: default_num_clients(),
            num_ro_replicas: 0,
        }
    }
}

/// The standard configurations every scenario is run against, filtered by
/// `selected(n, f, c)`.
pub fn interesting_configs<F>(selected: F) -> Result<Vec<ClusterConfig>>
where
    F: Fn(usize, usize, usize) -> bool,
{
    let candidates = [(4, 1, 0), (6, 1, 1), (7, 2, 0)];
    let mut configs = Vec::with_capacity(candidates.len());
    for (n, f, c) in candidates {
        if selected(n, f, c) {
            configs.push(ClusterConfig::new(n, f, c)?);
        }
    }
    if configs.is_empty() {
        return Err(WaitError::config("No eligible BFT configs"));
    }
    Ok(configs)
}

/// Port numbering for cluster members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkLayout {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_base_port")]
    pub base_port: u16,
    #[serde(default = "default_metrics_base_port")]
    pub metrics_base_port: u16,
    #[serde(default = "default_port_stride")]
    pub port_stride: u16,
}

impl NetworkLayout {
    /// Fails when either port of member `id` does not fit in a `u16`.
    pub fn member(&self, id: MemberId) -> Result<Member> {
        Ok(Member {
            id,
            endpoint: SocketAddr::new(self.host, self.port(self.base_port, id)?),
            metrics_endpoint: SocketAddr::new(self.host, self.port(self.metrics_base_port, id)?),
        })
    }

    pub fn members(&self, count: usize) -> Result<Vec<Member>> {
        (0..count).map(|id| self.member(id)).collect()
    }

    /// Ports grow with the member id, so checking the last member covers all.
    pub fn validate(&self, count: usize) -> Result<()> {
        match count.checked_sub(1) {
            Some(last) => self.member(last).map(|_| ()),
            None => Ok(()),
        }
    }

    fn port(&self, base: u16, id: MemberId) -> Result<u16> {
        (self.port_stride as usize)
            .checked_mul(id)
            .and_then(|offset| offset.checked_add(base as usize))
            .and_then(|port| u16::try_from(port).ok())
            .ok_or_else(|| {
                WaitError::config(format!(
                    "Port of member {} out of range (base {}, stride {})",
                    id, base, self.port_stride
                ))
            })
    }
}

impl Default for NetworkLayout {
    fn default() -> Self {
        Self {
            host: default_host(),
            base_port: default_base_port(),
            metrics_base_port: default_metrics_base_port(),
            port_stride: default_port_stride(),
        }
    }
}

/// Budgets (overall deadlines) and intervals (per-attempt caps) in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitSettings {
    /// Whole view wait: agreement and activation together
    #[serde(default = "default_view_timeout_ms")]
    pub view_timeout_ms: u64,
    #[serde(default = "default_view_poll_interval_ms")]
    pub view_poll_interval_ms: u64,
    /// Budget of one activation counting round
    #[serde(default = "default_activation_round_ms")]
    pub activation_round_ms: u64,
    #[serde(default = "default_long_timeout_ms")]
    pub checkpoint_timeout_ms: u64,
    #[serde(default = "default_short_interval_ms")]
    pub checkpoint_poll_interval_ms: u64,
    #[serde(default = "default_long_timeout_ms")]
    pub state_transfer_timeout_ms: u64,
    #[serde(default = "default_short_interval_ms")]
    pub state_transfer_poll_interval_ms: u64,
    #[serde(default = "default_fetching_state_timeout_ms")]
    pub fetching_state_timeout_ms: u64,
    #[serde(default = "default_long_timeout_ms")]
    pub seq_num_timeout_ms: u64,
    #[serde(default = "default_metrics_timeout_ms")]
    pub commit_path_timeout_ms: u64,
    #[serde(default = "default_short_interval_ms")]
    pub commit_path_poll_interval_ms: u64,
    /// Point-in-time checks across several members
    #[serde(default = "default_metrics_timeout_ms")]
    pub metrics_timeout_ms: u64,
}

impl WaitSettings {
    pub fn view_timeout(&self) -> Duration {
        Duration::from_millis(self.view_timeout_ms)
    }

    pub fn view_poll_interval(&self) -> Duration {
        Duration::from_millis(self.view_poll_interval_ms)
    }

    pub fn activation_round(&self) -> Duration {
        Duration::from_millis(self.activation_round_ms)
    }

    pub fn checkpoint_timeout(&self) -> Duration {
        Duration::from_millis(self.checkpoint_timeout_ms)
    }

    pub fn checkpoint_poll_interval(&self) -> Duration {
        Duration::from_millis(self.checkpoint_poll_interval_ms)
    }

    pub fn state_transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.state_transfer_timeout_ms)
    }

    pub fn state_transfer_poll_interval(&self) -> Duration {
        Duration::from_millis(self.state_transfer_poll_interval_ms)
    }

    pub fn fetching_state_timeout(&self) -> Duration {
        Duration::from_millis(self.fetching_state_timeout_ms)
    }

    pub fn seq_num_timeout(&self) -> Duration {
        Duration::from_millis(self.seq_num_timeout_ms)
    }

    pub fn commit_path_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_path_timeout_ms)
    }

    pub fn commit_path_poll_interval(&self) -> Duration {
        Duration::from_millis(self.commit_path_poll_interval_ms)
    }

    pub fn metrics_timeout(&self) -> Duration {
        Duration::from_millis(self.metrics_timeout_ms)
    }
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            view_timeout_ms: default_view_timeout_ms(),
            view_poll_interval_ms: default_view_poll_interval_ms(),
            activation_round_ms: default_activation_round_ms(),
            checkpoint_timeout_ms: default_long_timeout_ms(),
            checkpoint_poll_interval_ms: default_short_interval_ms(),
            state_transfer_timeout_ms: default_long_timeout_ms(),
            state_transfer_poll_interval_ms: default_short_interval_ms(),
            fetching_state_timeout_ms: default_fetching_state_timeout_ms(),
            seq_num_timeout_ms: default_long_timeout_ms(),
            commit_path_timeout_ms: default_metrics_timeout_ms(),
            commit_path_poll_interval_ms: default_short_interval_ms(),
            metrics_timeout_ms: default_metrics_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error), overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for JSON log files; console only when unset
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Number of log files to keep
    #[serde(default = "default_log_files")]
    pub files_to_keep: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
            files_to_keep: default_log_files(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub layout: NetworkLayout,
    #[serde(default)]
    pub waits: WaitSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// Default value functions
fn default_num_clients() -> usize { 30 }
fn default_host() -> IpAddr { IpAddr::V4(Ipv4Addr::LOCALHOST) }
fn default_base_port() -> u16 { 3710 }
fn default_metrics_base_port() -> u16 { 4710 }
fn default_port_stride() -> u16 { 2 }
fn default_view_timeout_ms() -> u64 { 30_000 }
fn default_view_poll_interval_ms() -> u64 { 1_000 }
fn default_activation_round_ms() -> u64 { 5_000 }
fn default_long_timeout_ms() -> u64 { 30_000 }
fn default_short_interval_ms() -> u64 { 500 }
fn default_fetching_state_timeout_ms() -> u64 { 10_000 }
fn default_metrics_timeout_ms() -> u64 { 5_000 }
fn default_log_level() -> String { "info".to_string() }
fn default_log_files() -> usize { 7 }

impl Config {
    /// Load configuration from file, writing the defaults if it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Configuration file not found at {:?}, creating default", path);
            let config = Config::default();
            config.save(path)?;
            return Ok(config);
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| WaitError::config(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)
            .map_err(|e| WaitError::config(format!("Failed to parse config file: {}", e)))?;
        config.layout.validate(config.cluster.total_members())?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| WaitError::config(format!("Failed to create config directory: {}", e)))?;
        }
        let contents = serde_yaml::to_string(&self)?;
        fs::write(path, contents)
            .map_err(|e| WaitError::config(format!("Failed to write config file: {}", e)))?;
        Ok(())
    }

    /// Default configuration file path
    pub fn get_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("quorum-wait")
            .join("config.yml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_config_rejects_bad_sizing() {
        assert!(ClusterConfig::new(4, 1, 1).is_err());
        let config = ClusterConfig::new(6, 1, 1).unwrap();
        assert_eq!(config.quorum_size(), 5);
        assert_eq!(config.max_faulty(), 1);
    }

    #[test]
    fn test_yaml_with_invalid_sizing_fails() {
        let yaml = "cluster:\n  n: 5\n  f: 1\n  c: 0\n";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_yaml_with_overflowing_sizing_fails() {
        let yaml = format!("cluster:\n  n: 1\n  f: {}\n  c: 0\n", usize::MAX / 2);
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("Invalid BFT configuration"));
    }

    #[test]
    fn test_member_ports_never_wrap() {
        let layout = NetworkLayout {
            base_port: 65534,
            ..NetworkLayout::default()
        };
        assert_eq!(layout.member(0).unwrap().endpoint.port(), 65534);
        assert!(matches!(layout.member(1), Err(WaitError::Config(_))));
        assert!(layout.members(4).is_err());
        assert!(layout.validate(1).is_ok());
        assert!(layout.validate(2).is_err());
        assert!(NetworkLayout::default().validate(4).is_ok());
        assert!(NetworkLayout::default().validate(0).is_ok());
    }

    #[test]
    fn test_yaml_with_out_of_range_layout_fails() {
        let yaml = "cluster:\n  n: 4\n  f: 1\n  c: 0\nlayout:\n  base_port: 65530\n";
        assert!(matches!(Config::from_yaml(yaml), Err(WaitError::Config(_))));
    }

    #[test]
    fn test_yaml_defaults_fill_in() {
        let yaml = "cluster:\n  n: 7\n  f: 2\n  c: 0\nwaits:\n  view_timeout_ms: 1000\n";
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.cluster.n(), 7);
        assert_eq!(config.cluster.num_clients(), 30);
        assert_eq!(config.waits.view_timeout(), Duration::from_secs(1));
        assert_eq!(config.waits.activation_round(), Duration::from_secs(5));
        assert_eq!(config.layout.base_port, 3710);
    }

    #[test]
    fn test_layout_port_scheme() {
        let layout = NetworkLayout::default();
        let member = layout.member(3).unwrap();
        assert_eq!(member.endpoint.port(), 3716);
        assert_eq!(member.metrics_endpoint.port(), 4716);
    }

    #[test]
    fn test_interesting_configs_filter() {
        let all = interesting_configs(|_, _, _| true).unwrap();
        assert_eq!(all.len(), 3);
        let with_crash = interesting_configs(|_, _, c| c > 0).unwrap();
        assert_eq!(with_crash.len(), 1);
        assert_eq!(with_crash[0].n(), 6);
        assert!(interesting_configs(|n, _, _| n > 100).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yml");
        let loaded = Config::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(loaded.cluster, ClusterConfig::default());

        let mut config = Config::default();
        config.cluster = ClusterConfig::new(7, 2, 0).unwrap().with_ro_replicas(1);
        config.save(&path).unwrap();
        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.cluster.total_members(), 8);
    }
}
