// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from an optional JSON file (`CONFIG_FILE`) and then
//! overridden by environment variables. The result is an immutable
//! [`AgentConfig`] snapshot; [`ConfigWatcher`] republishes a fresh snapshot on
//! a `watch` channel whenever the file changes.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `CONFIG_FILE` | JSON config file, watched for changes | none |
//! | `DATA_DIR` | Directory for the sealed identity artifact | `./data` |
//! | `NETWORK` | `fuji` or `mainnet` | `fuji` |
//! | `WS_RPC_URL` | WebSocket RPC endpoint | network default |
//! | `LICENSE_CONTRACT` | Node manager contract address | Fuji deployment |
//! | `LICENSE_EVENTS` | Comma-separated event names to dispatch | `GiftCardPayed` |
//! | `LICENSE_ABI_PATH` | JSON ABI of the contract | bundled ABI |
//! | `NODE_VAULT_KEY` | 64 hex chars; vault key | random per run |
//! | `HOST` | Status server bind address | `0.0.0.0` |
//! | `PORT` | Status server bind port | `8080` |
//! | `RECONNECT_INITIAL_MS` | First reconnect delay | `1000` |
//! | `RECONNECT_MAX_MS` | Reconnect delay cap | `30000` |
//! | `RECONNECT_MAX_RETRIES` | Consecutive failures before giving up | `8` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use alloy::primitives::Address;
use serde::Deserialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::blockchain::{NetworkConfig, AVAX_FUJI, AVAX_MAINNET, GIFT_CARD_PAYED, NODE_MANAGER_FUJI};
use crate::listener::ReconnectPolicy;
use crate::storage::paths::DATA_ROOT;

/// Optional JSON config file, watched for changes.
pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE";

/// Directory holding the sealed identity artifact.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Network selector (`fuji` or `mainnet`).
pub const NETWORK_ENV: &str = "NETWORK";

/// WebSocket RPC endpoint override.
pub const WS_RPC_URL_ENV: &str = "WS_RPC_URL";

/// Node manager contract address.
pub const LICENSE_CONTRACT_ENV: &str = "LICENSE_CONTRACT";

/// Comma-separated list of event names to dispatch.
pub const LICENSE_EVENTS_ENV: &str = "LICENSE_EVENTS";

/// Path to a JSON ABI overriding the bundled one.
pub const LICENSE_ABI_PATH_ENV: &str = "LICENSE_ABI_PATH";

/// Hex-encoded 32-byte vault key.
///
/// When unset, a random key is generated for the run and the sealed identity
/// cannot be reopened by later runs.
pub const NODE_VAULT_KEY_ENV: &str = "NODE_VAULT_KEY";

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const RECONNECT_INITIAL_MS_ENV: &str = "RECONNECT_INITIAL_MS";
pub const RECONNECT_MAX_MS_ENV: &str = "RECONNECT_MAX_MS";
pub const RECONNECT_MAX_RETRIES_ENV: &str = "RECONNECT_MAX_RETRIES";

/// Logging format (`json` or `pretty`).
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Default interval between config file checks.
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(10);

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Keys accepted in the JSON config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub data_dir: Option<PathBuf>,
    pub network: Option<String>,
    pub ws_url: Option<String>,
    pub contract_address: Option<String>,
    pub events: Option<Vec<String>>,
    pub abi_path: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub reconnect: Option<ReconnectPolicy>,
}

/// Immutable configuration snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub data_dir: PathBuf,
    pub network: NetworkConfig,
    pub ws_url: String,
    pub contract_address: Address,
    pub events: Vec<String>,
    pub abi_path: Option<PathBuf>,
    pub host: String,
    pub port: u16,
    pub reconnect: ReconnectPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DATA_ROOT),
            network: AVAX_FUJI,
            ws_url: AVAX_FUJI.ws_url.to_string(),
            contract_address: NODE_MANAGER_FUJI.parse().unwrap_or(Address::ZERO),
            events: vec![GIFT_CARD_PAYED.to_string()],
            abi_path: None,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl AgentConfig {
    /// Merge file values and environment overrides onto the defaults.
    pub fn resolve(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let network_name = env(NETWORK_ENV)
            .or(file.network)
            .unwrap_or_else(|| "fuji".to_string());
        let network = parse_network(&network_name)?;

        let ws_url = env(WS_RPC_URL_ENV)
            .or(file.ws_url)
            .unwrap_or_else(|| network.ws_url.to_string());
        let parsed = url::Url::parse(&ws_url)
            .map_err(|e| ConfigError::invalid("ws_url", e.to_string()))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(ConfigError::invalid(
                "ws_url",
                format!("expected ws:// or wss://, got {}://", parsed.scheme()),
            ));
        }

        let contract_address = match env(LICENSE_CONTRACT_ENV).or(file.contract_address) {
            Some(raw) => raw
                .trim()
                .parse::<Address>()
                .map_err(|e| ConfigError::invalid("contract_address", e.to_string()))?,
            None => defaults.contract_address,
        };

        let events = match env(LICENSE_EVENTS_ENV) {
            Some(raw) => split_list(&raw),
            None => file.events.unwrap_or(defaults.events),
        };
        if events.is_empty() {
            return Err(ConfigError::invalid("events", "at least one event name is required"));
        }

        let port = match env(PORT_ENV) {
            Some(raw) => raw
                .parse()
                .map_err(|e: std::num::ParseIntError| ConfigError::invalid("port", e.to_string()))?,
            None => file.port.unwrap_or(defaults.port),
        };

        let mut reconnect = file.reconnect.unwrap_or(defaults.reconnect);
        if let Some(ms) = parse_env_u64(&env, RECONNECT_INITIAL_MS_ENV, "reconnect.initial_delay")? {
            reconnect.initial_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_env_u64(&env, RECONNECT_MAX_MS_ENV, "reconnect.max_delay")? {
            reconnect.max_delay = Duration::from_millis(ms);
        }
        if let Some(n) = parse_env_u64(&env, RECONNECT_MAX_RETRIES_ENV, "reconnect.max_retries")? {
            reconnect.max_retries = u32::try_from(n)
                .map_err(|e| ConfigError::invalid("reconnect.max_retries", e.to_string()))?;
        }
        if reconnect.initial_delay.is_zero() {
            return Err(ConfigError::invalid(
                "reconnect.initial_delay",
                "must be greater than zero",
            ));
        }
        if reconnect.max_delay < reconnect.initial_delay {
            return Err(ConfigError::invalid(
                "reconnect.max_delay",
                "must not be smaller than initial_delay",
            ));
        }

        Ok(Self {
            data_dir: env(DATA_DIR_ENV)
                .map(PathBuf::from)
                .or(file.data_dir)
                .unwrap_or(defaults.data_dir),
            network,
            ws_url,
            contract_address,
            events,
            abi_path: env(LICENSE_ABI_PATH_ENV)
                .map(PathBuf::from)
                .or(file.abi_path),
            host: env(HOST_ENV).or(file.host).unwrap_or(defaults.host),
            port,
            reconnect,
        })
    }

    /// Status server bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_network(raw: &str) -> Result<NetworkConfig, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "fuji" => Ok(AVAX_FUJI),
        "mainnet" => Ok(AVAX_MAINNET),
        other => Err(ConfigError::invalid(
            "network",
            format!("unsupported network `{other}` (expected fuji or mainnet)"),
        )),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_env_u64(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
    field: &'static str,
) -> Result<Option<u64>, ConfigError> {
    env(key)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::invalid(field, e.to_string()))
        })
        .transpose()
}

// =============================================================================
// Config Source
// =============================================================================

/// Where configuration comes from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSource {
    file: Option<PathBuf>,
}

impl ConfigSource {
    /// File named by `CONFIG_FILE`, if any.
    pub fn from_env() -> Self {
        Self {
            file: std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from),
        }
    }

    /// Read from `path` (plus environment overrides).
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            file: Some(path.as_ref().to_path_buf()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Load a snapshot using the process environment.
    pub fn load(&self) -> Result<AgentConfig, ConfigError> {
        self.load_with(|key| std::env::var(key).ok())
    }

    /// Load a snapshot using the given environment lookup.
    pub fn load_with(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<AgentConfig, ConfigError> {
        let file = match &self.file {
            Some(path) => read_file(path)?,
            None => FileConfig::default(),
        };
        AgentConfig::resolve(file, env)
    }

    /// Last modification time of the config file.
    fn modified(&self) -> Option<SystemTime> {
        self.file
            .as_ref()
            .and_then(|p| fs::metadata(p).ok())
            .and_then(|m| m.modified().ok())
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Fields that differ between two snapshots but are only read at startup.
///
/// `ws_url` and `reconnect` are read on every subscribe and apply live.
pub fn restart_only_changes(current: &AgentConfig, next: &AgentConfig) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if current.data_dir != next.data_dir {
        fields.push("data_dir");
    }
    if current.network != next.network {
        fields.push("network");
    }
    if current.contract_address != next.contract_address {
        fields.push("contract_address");
    }
    if current.events != next.events {
        fields.push("events");
    }
    if current.abi_path != next.abi_path {
        fields.push("abi_path");
    }
    if current.host != next.host || current.port != next.port {
        fields.push("bind_addr");
    }
    fields
}

// =============================================================================
// Config Watcher
// =============================================================================

/// Republishes configuration snapshots when the config file changes.
pub struct ConfigWatcher {
    source: ConfigSource,
    publisher: watch::Sender<Arc<AgentConfig>>,
    interval: Duration,
}

impl ConfigWatcher {
    pub fn new(source: ConfigSource, publisher: watch::Sender<Arc<AgentConfig>>) -> Self {
        Self {
            source,
            publisher,
            interval: DEFAULT_WATCH_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Poll the config file until the cancellation token is triggered.
    ///
    /// Invalid reloads are logged and the previous snapshot stays current.
    pub async fn run(self, shutdown: CancellationToken) {
        let Some(path) = self.source.path().map(Path::to_path_buf) else {
            tracing::debug!("No config file configured, watcher idle");
            return;
        };

        tracing::info!(
            path = %path.display(),
            interval_secs = self.interval.as_secs(),
            "Config watcher starting"
        );

        let mut last_modified = self.source.modified();

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    tracing::info!("Config watcher shutting down");
                    return;
                }
            }

            let modified = self.source.modified();
            if modified == last_modified {
                continue;
            }
            last_modified = modified;

            self.reload();
        }
    }

    fn reload(&self) {
        match self.source.load() {
            Ok(config) => {
                let pending = restart_only_changes(&self.publisher.borrow(), &config);
                if !pending.is_empty() {
                    tracing::warn!(
                        fields = ?pending,
                        "Config changes take effect only after restart"
                    );
                }

                let changed = self.publisher.send_if_modified(|current| {
                    if **current == config {
                        false
                    } else {
                        *current = Arc::new(config);
                        true
                    }
                });
                if changed {
                    tracing::info!("Configuration reloaded");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Config reload failed, keeping previous snapshot");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_target_fuji_node_manager() {
        let config = AgentConfig::resolve(FileConfig::default(), env_of(&[])).unwrap();
        assert_eq!(config.network.chain_id, AVAX_FUJI.chain_id);
        assert_eq!(config.ws_url, AVAX_FUJI.ws_url);
        assert_eq!(
            config.contract_address,
            NODE_MANAGER_FUJI.parse::<Address>().unwrap()
        );
        assert_eq!(config.events, vec![GIFT_CARD_PAYED.to_string()]);
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.reconnect, ReconnectPolicy::default());
    }

    #[test]
    fn env_overrides_file() {
        let file = FileConfig {
            port: Some(9000),
            host: Some("127.0.0.1".into()),
            events: Some(vec!["NodeCreated".into()]),
            ..FileConfig::default()
        };
        let env = env_of(&[
            (PORT_ENV, "9100"),
            (LICENSE_EVENTS_ENV, "GiftCardPayed, NodeCreated ,"),
            (NETWORK_ENV, "mainnet"),
            (RECONNECT_MAX_RETRIES_ENV, "2"),
        ]);

        let config = AgentConfig::resolve(file, env).unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.events, vec!["GiftCardPayed", "NodeCreated"]);
        assert_eq!(config.network.chain_id, AVAX_MAINNET.chain_id);
        assert_eq!(config.ws_url, AVAX_MAINNET.ws_url);
        assert_eq!(config.reconnect.max_retries, 2);
    }

    #[test]
    fn rejects_invalid_values() {
        let cases: &[(&str, &str, &str)] = &[
            (NETWORK_ENV, "goerli", "network"),
            (WS_RPC_URL_ENV, "https://example.com", "ws_url"),
            (LICENSE_CONTRACT_ENV, "0x1234", "contract_address"),
            (LICENSE_EVENTS_ENV, " , ", "events"),
            (PORT_ENV, "http", "port"),
            (RECONNECT_INITIAL_MS_ENV, "0", "reconnect.initial_delay"),
            (RECONNECT_MAX_MS_ENV, "1", "reconnect.max_delay"),
        ];

        for (key, value, expected_field) in cases {
            let err = AgentConfig::resolve(FileConfig::default(), env_of(&[(*key, *value)]))
                .unwrap_err();
            match err {
                ConfigError::Invalid { field, .. } => assert_eq!(field, *expected_field),
                other => panic!("unexpected error for {key}: {other}"),
            }
        }
    }

    #[test]
    fn loads_json_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent.json");
        fs::write(
            &path,
            r#"{
                "data_dir": "/srv/agent",
                "ws_url": "ws://localhost:8546",
                "reconnect": { "initial_delay": 50, "max_delay": 500, "max_retries": 4, "stable_after": 1000 }
            }"#,
        )
        .unwrap();

        let config = ConfigSource::file(&path).load_with(env_of(&[])).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/agent"));
        assert_eq!(config.ws_url, "ws://localhost:8546");
        assert_eq!(config.reconnect.initial_delay, Duration::from_millis(50));
        assert_eq!(config.reconnect.max_retries, 4);
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent.json");
        fs::write(&path, r#"{ "etcd": true }"#).unwrap();

        let err = ConfigSource::file(&path).load_with(env_of(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = ConfigSource::file("/nonexistent/agent.json")
            .load_with(env_of(&[]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn restart_only_fields_are_detected() {
        let current = AgentConfig::default();

        let mut live = current.clone();
        live.ws_url = "wss://other.example/ws".to_string();
        live.reconnect.max_retries = 2;
        assert!(restart_only_changes(&current, &live).is_empty());

        let mut moved = current.clone();
        moved.contract_address = Address::repeat_byte(0x22);
        moved.events.push("NodeCreated".to_string());
        moved.port = 9090;
        assert_eq!(
            restart_only_changes(&current, &moved),
            vec!["contract_address", "events", "bind_addr"]
        );
    }

    #[tokio::test]
    async fn watcher_publishes_changed_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent.json");
        fs::write(&path, r#"{ "port": 9000 }"#).unwrap();

        let source = ConfigSource::file(&path);
        let initial = source.load().unwrap();
        let (tx, mut rx) = watch::channel(Arc::new(initial));

        let shutdown = CancellationToken::new();
        let watcher = ConfigWatcher::new(source, tx).with_interval(Duration::from_millis(20));
        let handle = tokio::spawn(watcher.run(shutdown.clone()));

        // Ensure a distinct mtime on coarse-grained filesystems.
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        fs::write(&path, r#"{ "port": 9001 }"#).unwrap();

        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .expect("snapshot published")
            .unwrap();
        assert_eq!(rx.borrow().port, 9001);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn watcher_keeps_snapshot_on_invalid_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent.json");
        fs::write(&path, r#"{ "port": 9000 }"#).unwrap();

        let source = ConfigSource::file(&path);
        let (tx, rx) = watch::channel(Arc::new(source.load().unwrap()));
        let watcher = ConfigWatcher::new(source, tx);

        fs::write(&path, "{ not json").unwrap();
        watcher.reload();

        assert!(!rx.has_changed().unwrap());
        assert_eq!(rx.borrow().port, 9000);
    }

    #[tokio::test]
    async fn watcher_without_file_exits_immediately() {
        let (tx, _rx) = watch::channel(Arc::new(AgentConfig::default()));
        let watcher = ConfigWatcher::new(ConfigSource::default(), tx);
        tokio::time::timeout(Duration::from_secs(1), watcher.run(CancellationToken::new()))
            .await
            .expect("idle watcher returns");
    }
}
