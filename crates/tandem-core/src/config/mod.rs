//! Configuration: per-node `liquid.conf` files and the harness's own settings.
//!
//! # Node Configuration
//!
//! - [`NodeConfig`]: lenient `key=value` loader for a node's data directory config
//! - [`discover_default_config`]: credentials from the daemon's platform default config
//!
//! # Harness Settings
//!
//! [`AppConfig`] is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: `Default` implementations
//! 2. **Config file**: TOML file named by `TANDEM_CONFIG` (default `config/tandem.toml`)
//! 3. **Environment variables**: `TANDEM__SECTION__FIELD` overrides
//!
//! # Example
//!
//! ```toml
//! [daemon]
//! binary = "liquidd"
//! startup_grace_ms = 1000
//!
//! [convergence]
//! criterion = "best_block_hash"
//! timeout_seconds = 120
//!
//! [[nodes]]
//! name = "proposer"
//! datadir = "/tmp/liquiddir1"
//! template_conf = "conf/liquid1.conf"
//! ```

pub mod discovery;
pub mod errors;
pub mod node_conf;

pub use discovery::{
    discover_default_config, discover_from_path, DefaultConfigLocation, DiscoveredConfig,
    DEFAULT_RPC_PORT,
};
pub use errors::ConfigError;
pub use node_conf::{NodeConfig, FILENAME_KEY};

use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, path::Path, path::PathBuf, time::Duration};

use crate::{
    cluster::{Convergence, ConvergenceOptions, NodeSpec},
    rpc::RpcClientConfig,
};

/// How node daemons are launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Daemon executable, resolved through `PATH` when not absolute. Defaults to `liquidd`.
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Config file name inside each data directory. Defaults to `liquid.conf`.
    #[serde(default = "default_conf_file_name")]
    pub conf_file_name: String,

    /// Fixed wait after spawning before the node is handed back. Defaults to `1000`.
    #[serde(default = "default_startup_grace_ms")]
    pub startup_grace_ms: u64,

    /// How long `shutdown` waits for the process to exit after RPC `stop`. Defaults to `30`.
    #[serde(default = "default_shutdown_timeout_seconds")]
    pub shutdown_timeout_seconds: u64,
}

fn default_binary() -> String {
    "liquidd".to_string()
}

fn default_conf_file_name() -> String {
    discovery::DEFAULT_CONF_FILE.to_string()
}

fn default_startup_grace_ms() -> u64 {
    1000
}

fn default_shutdown_timeout_seconds() -> u64 {
    30
}

impl DaemonConfig {
    #[must_use]
    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }

    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            conf_file_name: default_conf_file_name(),
            startup_grace_ms: default_startup_grace_ms(),
            shutdown_timeout_seconds: default_shutdown_timeout_seconds(),
        }
    }
}

/// RPC connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Host every node's RPC endpoint listens on. Defaults to `localhost`.
    #[serde(default = "default_host")]
    pub host: String,

    /// Per-request timeout in seconds. Defaults to `30`.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// TCP connect timeout in seconds. Defaults to `5`.
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,

    /// Stale-connection retries after the first attempt. Defaults to `2`.
    #[serde(default = "default_max_stale_retries")]
    pub max_stale_retries: u32,
}

fn default_host() -> String {
    crate::types::LOCALHOST.to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_connect_timeout_seconds() -> u64 {
    5
}

fn default_max_stale_retries() -> u32 {
    crate::rpc::DEFAULT_MAX_STALE_RETRIES
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            timeout_seconds: default_timeout_seconds(),
            connect_timeout_seconds: default_connect_timeout_seconds(),
            max_stale_retries: default_max_stale_retries(),
        }
    }
}

/// Convergence polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceConfig {
    /// What nodes must agree on. Defaults to `best_block_hash`.
    #[serde(default)]
    pub criterion: Convergence,

    /// Initial delay between polling rounds in milliseconds. Defaults to `100`.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound for the backed-off delay in milliseconds. Defaults to `1000`.
    #[serde(default = "default_max_poll_interval_ms")]
    pub max_poll_interval_ms: u64,

    /// Give up after this many seconds; `0` waits forever. Defaults to `300`.
    #[serde(default = "default_convergence_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_max_poll_interval_ms() -> u64 {
    1000
}

fn default_convergence_timeout_seconds() -> u64 {
    300
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            criterion: Convergence::default(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_interval_ms: default_max_poll_interval_ms(),
            timeout_seconds: default_convergence_timeout_seconds(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level for tandem crates when `RUST_LOG` is unset. Defaults to `info`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `pretty` or `json`. Defaults to `pretty`.
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Also append plain-text logs to this file.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format(), file: None }
    }
}

/// One node managed by the harness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEntry {
    /// Label used in logs and on the command line.
    pub name: String,

    /// Data directory passed to the daemon as `-datadir`.
    pub datadir: PathBuf,

    /// Config copied into the data directory by `prepare`.
    #[serde(default)]
    pub template_conf: Option<PathBuf>,
}

impl From<&NodeEntry> for NodeSpec {
    fn from(entry: &NodeEntry) -> Self {
        NodeSpec::new(&entry.datadir).with_name(&entry.name)
    }
}

/// Harness settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub rpc: RpcConfig,

    #[serde(default)]
    pub convergence: ConvergenceConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub nodes: Vec<NodeEntry>,
}

impl AppConfig {
    /// Loads settings from a TOML file with environment variable overrides.
    ///
    /// A missing file is not an error. Variables with the `TANDEM__` prefix override any
    /// value, using `__` between nested fields (e.g. `TANDEM__DAEMON__BINARY=elementsd`).
    ///
    /// # Errors
    ///
    /// Returns [`::config::ConfigError`] if the file cannot be parsed or deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ::config::ConfigError> {
        let config_builder = Config::builder()
            .set_default("daemon.binary", default_binary())?
            .set_default("daemon.conf_file_name", default_conf_file_name())?
            .set_default("daemon.startup_grace_ms", default_startup_grace_ms())?
            .set_default("daemon.shutdown_timeout_seconds", default_shutdown_timeout_seconds())?
            .set_default("rpc.host", default_host())?
            .set_default("rpc.timeout_seconds", default_timeout_seconds())?
            .set_default("rpc.connect_timeout_seconds", default_connect_timeout_seconds())?
            .set_default("rpc.max_stale_retries", i64::from(default_max_stale_retries()))?
            .set_default("convergence.criterion", "best_block_hash")?
            .set_default("convergence.poll_interval_ms", default_poll_interval_ms())?
            .set_default("convergence.max_poll_interval_ms", default_max_poll_interval_ms())?
            .set_default("convergence.timeout_seconds", default_convergence_timeout_seconds())?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(Environment::with_prefix("TANDEM").separator("__"))
            .build()?;

        config_builder.try_deserialize()
    }

    /// Loads settings from `config/tandem.toml`, or the path in `TANDEM_CONFIG`.
    ///
    /// # Errors
    ///
    /// Returns [`::config::ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ::config::ConfigError> {
        let config_path =
            std::env::var("TANDEM_CONFIG").unwrap_or_else(|_| "config/tandem.toml".to_string());
        Self::from_file(&config_path)
    }

    /// Validates the settings for correctness and consistency.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.daemon.binary.trim().is_empty() {
            return Err("Daemon binary must not be empty".to_string());
        }

        if self.daemon.conf_file_name.trim().is_empty() {
            return Err("Daemon config file name must not be empty".to_string());
        }

        if self.rpc.timeout_seconds == 0 {
            return Err("RPC timeout must be greater than 0".to_string());
        }

        if self.convergence.poll_interval_ms == 0 {
            return Err("Convergence poll interval must be greater than 0".to_string());
        }

        if self.convergence.max_poll_interval_ms < self.convergence.poll_interval_ms {
            return Err(
                "Convergence max poll interval must not be below the poll interval".to_string()
            );
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }

        let mut names = HashSet::new();
        for node in &self.nodes {
            if node.name.trim().is_empty() {
                return Err(format!("Node with datadir {} has no name", node.datadir.display()));
            }
            if node.datadir.as_os_str().is_empty() {
                return Err(format!("Empty datadir for node: {}", node.name));
            }
            if !names.insert(node.name.as_str()) {
                return Err(format!("Duplicate node name: {}", node.name));
            }
        }

        Ok(())
    }

    /// Settings for every RPC client the harness creates.
    #[must_use]
    pub fn rpc_client_config(&self) -> RpcClientConfig {
        RpcClientConfig {
            host: self.rpc.host.clone(),
            timeout: Duration::from_secs(self.rpc.timeout_seconds),
            connect_timeout: Duration::from_secs(self.rpc.connect_timeout_seconds),
            max_stale_retries: self.rpc.max_stale_retries,
        }
    }

    #[must_use]
    pub fn daemon_config(&self) -> DaemonConfig {
        self.daemon.clone()
    }

    #[must_use]
    pub fn criterion(&self) -> Convergence {
        self.convergence.criterion
    }

    /// Polling schedule for convergence and reachability waits.
    #[must_use]
    pub fn convergence_options(&self) -> ConvergenceOptions {
        let timeout = match self.convergence.timeout_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        ConvergenceOptions {
            poll_interval: Duration::from_millis(self.convergence.poll_interval_ms),
            max_poll_interval: Duration::from_millis(self.convergence.max_poll_interval_ms),
            timeout,
        }
    }

    /// Start order for the configured nodes.
    #[must_use]
    pub fn node_specs(&self) -> Vec<NodeSpec> {
        self.nodes.iter().map(NodeSpec::from).collect()
    }

    /// Looks up a configured node by name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&NodeEntry> {
        self.nodes.iter().find(|n| n.name == name)
    }
}
