//! Configuration management for ethpool-proxy.
//!
//! Configuration is a single JSON document. Every section has defaults, so a
//! minimal file only needs to name the upstream node(s). Loaded configs are
//! checked with [`Config::validate`] before anything starts.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::Difficulty;

/// Main configuration structure for the proxy.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Stratum proxy configuration
    pub proxy: ProxyConfig,

    /// Nodes to fetch work from, in order of preference
    pub upstream: Vec<UpstreamConfig>,

    /// Anti-abuse policy
    pub policy: PolicyConfig,

    /// Stats API server configuration
    pub api: ApiConfig,
}

/// Proxy behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Starting share difficulty for every session
    pub difficulty: u64,

    /// How often to poll the node for new work, in milliseconds
    pub block_refresh_interval_ms: u64,

    pub stratum: StratumConfig,

    pub dynamic_difficulty: DynamicDifficultyConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            difficulty: 2_000_000_000,
            block_refresh_interval_ms: 120,
            stratum: StratumConfig::default(),
            dynamic_difficulty: DynamicDifficultyConfig::default(),
        }
    }
}

impl ProxyConfig {
    pub fn starting_difficulty(&self) -> Difficulty {
        Difficulty::new(self.difficulty)
    }

    pub fn block_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.block_refresh_interval_ms)
    }
}

/// Stratum listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StratumConfig {
    pub enabled: bool,

    /// Listen address
    pub listen: String,

    /// Idle time after which a silent connection is dropped
    pub timeout_secs: u64,

    /// Maximum simultaneous connections
    pub max_connections: usize,
}

impl Default for StratumConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: "0.0.0.0:8008".to_string(),
            timeout_secs: 120,
            max_connections: 8192,
        }
    }
}

impl StratumConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Submit-rate band for per-session retargeting, in shares per minute.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DynamicDifficultyConfig {
    pub enabled: bool,
    pub min_submit_rate: u64,
    pub max_submit_rate: u64,
}

impl Default for DynamicDifficultyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_submit_rate: 10,
            max_submit_rate: 30,
        }
    }
}

/// A node serving `eth_getWork`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    pub name: String,

    /// JSON-RPC endpoint URL
    pub url: String,

    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
}

fn default_upstream_timeout() -> u64 {
    10
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Anti-abuse policy configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub banning: BanningConfig,
    pub limits: LimitsConfig,

    /// Logins that may never connect
    pub blacklist: Vec<String>,

    /// IPs exempt from banning and connection limits
    pub whitelist: Vec<String>,
}

/// Banning thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BanningConfig {
    pub enabled: bool,

    /// How long a ban lasts; also the stats reset interval
    pub timeout_secs: u64,

    /// Ban when at least this percentage of checked shares is invalid
    pub invalid_percent: f64,

    /// Number of shares to see before checking the invalid percentage
    pub check_threshold: u32,

    /// Ban after this many malformed requests
    pub malformed_limit: u32,
}

impl Default for BanningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 1800,
            invalid_percent: 30.0,
            check_threshold: 30,
            malformed_limit: 5,
        }
    }
}

impl BanningConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Per-IP connection limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub enabled: bool,

    /// Connection tokens each IP starts with
    pub limit: i32,

    /// Period after startup during which limits are not enforced
    pub grace_secs: u64,

    /// Tokens refunded per valid share
    pub limit_jump: i32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            limit: 30,
            grace_secs: 300,
            limit_jump: 10,
        }
    }
}

impl LimitsConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

/// API server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,

    /// Listen address
    pub listen: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a specific file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&contents)
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json(contents: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the proxy cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.proxy.difficulty == 0 {
            return Err(Error::Config("proxy.difficulty must be positive".into()));
        }
        if self.proxy.block_refresh_interval_ms == 0 {
            return Err(Error::Config(
                "proxy.block_refresh_interval_ms must be positive".into(),
            ));
        }
        if self.proxy.stratum.timeout_secs == 0 {
            return Err(Error::Config("proxy.stratum.timeout_secs must be positive".into()));
        }
        let vardiff = &self.proxy.dynamic_difficulty;
        if vardiff.min_submit_rate > vardiff.max_submit_rate {
            return Err(Error::Config(format!(
                "dynamic_difficulty.min_submit_rate ({}) exceeds max_submit_rate ({})",
                vardiff.min_submit_rate, vardiff.max_submit_rate
            )));
        }
        if self.upstream.is_empty() {
            return Err(Error::Config("at least one upstream is required".into()));
        }
        if let Some(upstream) = self.upstream.iter().find(|u| u.timeout_secs == 0) {
            return Err(Error::Config(format!(
                "upstream {} has a zero timeout",
                upstream.name
            )));
        }
        Ok(())
    }
}
