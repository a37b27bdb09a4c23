// src/config.rs

//! Node configuration: loading from TOML, defaults, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;

/// Identity and addressing of this node.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NodeConfig {
    /// Stable cluster-unique name; the Raft node id derives from it.
    pub name: String,
    /// UUID identifying this node's SSH identity row.
    #[serde(default)]
    pub uuid: String,
    /// Bind address for the internal RPC listener (Raft + proposal forward).
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_listen_addr() -> String {
    "127.0.0.1:7979".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RaftPeer {
    /// The peer's node name (ids derive from names on every member).
    pub name: String,
    /// The peer's RPC address.
    pub addr: String,
}

/// Consensus settings. With `enabled = false` the node runs single-writer
/// and proposals apply locally.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RaftConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Every cluster member including this node.
    #[serde(default)]
    pub peers: Vec<RaftPeer>,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_election_timeout_min_ms")]
    pub election_timeout_min_ms: u64,
    #[serde(default = "default_election_timeout_max_ms")]
    pub election_timeout_max_ms: u64,
    /// Upper bound on one proposal's apply round-trip.
    #[serde(default = "default_propose_timeout_ms")]
    pub propose_timeout_ms: u64,
}

fn default_heartbeat_interval_ms() -> u64 {
    500
}
fn default_election_timeout_min_ms() -> u64 {
    1500
}
fn default_election_timeout_max_ms() -> u64 {
    3000
}
fn default_propose_timeout_ms() -> u64 {
    5000
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "sylved_data/sylve.db".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SchedulerConfig {
    /// Tick period in seconds; jobs fire on the first tick at or after their
    /// cron instant, so this bounds dispatch latency.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// TTL of the policy lease taken around each policy-bound run.
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            lease_ttl_secs: default_lease_ttl_secs(),
        }
    }
}

fn default_tick_interval_secs() -> u64 {
    15
}
fn default_lease_ttl_secs() -> u64 {
    120
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SshConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u32,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_connect_timeout_secs() -> u32 {
    15
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub node: NodeConfig,
    #[serde(default)]
    pub raft: RaftConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path}"))?;
        let config: Config =
            toml::from_str(&raw).with_context(|| format!("failed to parse {path}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.node.name.is_empty() {
            return Err(anyhow!("node.name must not be empty"));
        }
        if self.scheduler.tick_interval_secs == 0 || self.scheduler.tick_interval_secs > 30 {
            return Err(anyhow!(
                "scheduler.tick_interval_secs must be within 1..=30, got {}",
                self.scheduler.tick_interval_secs
            ));
        }
        if self.raft.enabled {
            if self.raft.peers.is_empty() {
                return Err(anyhow!("raft.enabled requires at least one peer entry"));
            }
            if !self.raft.peers.iter().any(|p| p.name == self.node.name) {
                return Err(anyhow!(
                    "raft.peers must include this node ('{}')",
                    self.node.name
                ));
            }
            if self.raft.election_timeout_min_ms >= self.raft.election_timeout_max_ms {
                return Err(anyhow!(
                    "raft.election_timeout_min_ms must be below election_timeout_max_ms"
                ));
            }
        }
        Ok(())
    }

    /// A standalone single-node configuration, used by tests and first-boot.
    pub fn standalone(name: &str, db_path: &str) -> Self {
        Self {
            node: NodeConfig {
                name: name.to_string(),
                uuid: String::new(),
                listen_addr: default_listen_addr(),
            },
            raft: RaftConfig::default(),
            database: DatabaseConfig {
                path: db_path.to_string(),
            },
            scheduler: SchedulerConfig::default(),
            ssh: SshConfig::default(),
            log_level: default_log_level(),
        }
    }
}
