use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use super::{node_conf::parse_port, ConfigError};
use crate::types::{ConnectionIdentity, LOCALHOST};

/// Port assumed when the discovered config has no `rpcport`.
pub const DEFAULT_RPC_PORT: u16 = 7040;

/// File name of the daemon's config inside its platform directory.
pub const DEFAULT_CONF_FILE: &str = "liquid.conf";

/// Credentials discovered from the daemon's default config file.
#[derive(Clone, PartialEq, Eq)]
pub struct DiscoveredConfig {
    pub user: String,
    pub password: String,
    pub port: u16,
    /// `rpcconnect`; reported but not used for connecting.
    pub host: String,
    pub path: PathBuf,
}

impl DiscoveredConfig {
    #[must_use]
    pub fn identity(&self) -> ConnectionIdentity {
        ConnectionIdentity::new(&self.user, &self.password, self.port)
    }
}

impl std::fmt::Debug for DiscoveredConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveredConfig")
            .field("user", &self.user)
            .field("password", &"***")
            .field("port", &self.port)
            .field("host", &self.host)
            .field("path", &self.path)
            .finish()
    }
}

/// Resolves where the daemon keeps its default config on a given OS family.
///
/// Pure: callers pass the OS name and the relevant environment values, so every
/// platform branch can be exercised on any host.
#[derive(Debug, Clone, Copy)]
pub struct DefaultConfigLocation;

impl DefaultConfigLocation {
    /// Returns the default config path for `os` (as in [`std::env::consts::OS`]).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] on the unexpanded path (`~/.liquid/liquid.conf`,
    /// `%APPDATA%/Liquid/liquid.conf`) if the environment value the platform needs is unset.
    pub fn resolve(
        os: &str,
        home: Option<&Path>,
        appdata: Option<&Path>,
    ) -> Result<PathBuf, ConfigError> {
        let (base, placeholder) = match os {
            "windows" => (appdata, "%APPDATA%"),
            _ => (home, "~"),
        };
        let dir = base.unwrap_or_else(|| Path::new(placeholder));
        let dir = match os {
            "macos" => dir.join("Library").join("Application Support").join("Liquid"),
            "windows" => dir.join("Liquid"),
            _ => dir.join(".liquid"),
        };
        let path = dir.join(DEFAULT_CONF_FILE);

        if base.is_none() {
            return Err(ConfigError::NotFound(path));
        }
        Ok(path)
    }

    /// Resolves the default config path for the running process.
    ///
    /// # Errors
    ///
    /// See [`resolve`](Self::resolve).
    pub fn current() -> Result<PathBuf, ConfigError> {
        let home = std::env::var_os("HOME").map(PathBuf::from);
        let appdata = std::env::var_os("APPDATA").map(PathBuf::from);
        Self::resolve(std::env::consts::OS, home.as_deref(), appdata.as_deref())
    }
}

/// Discovers credentials from the platform default config file.
///
/// # Errors
///
/// - [`ConfigError::NotFound`] if the file is absent, or `HOME`/`APPDATA` is unset so its
///   location cannot be resolved
/// - [`ConfigError::MissingCredential`] if it has no `rpcpassword`
/// - [`ConfigError::InvalidConfig`] if `rpcport` is not numeric
pub fn discover_default_config() -> Result<DiscoveredConfig, ConfigError> {
    discover_from_path(DefaultConfigLocation::current()?)
}

/// Discovers credentials from an explicit config file.
///
/// Unlike [`NodeConfig`](super::NodeConfig), inline `#` comments are stripped and values
/// may contain `=`. `rpcport` defaults to [`DEFAULT_RPC_PORT`], `rpcuser` to the empty
/// string and `rpcconnect` to `localhost`.
///
/// # Errors
///
/// See [`discover_default_config`].
pub fn discover_from_path(path: impl AsRef<Path>) -> Result<DiscoveredConfig, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::from_io(path, e))?;
    let conf = parse_lines(&contents);

    let port = match conf.get("rpcport") {
        Some(raw) => parse_port(raw, path)?,
        None => DEFAULT_RPC_PORT,
    };
    let password = conf.get("rpcpassword").cloned().ok_or_else(|| {
        ConfigError::MissingCredential { key: "rpcpassword", path: path.to_path_buf() }
    })?;

    let discovered = DiscoveredConfig {
        user: conf.get("rpcuser").cloned().unwrap_or_default(),
        password,
        port,
        host: conf.get("rpcconnect").cloned().unwrap_or_else(|| LOCALHOST.to_string()),
        path: path.to_path_buf(),
    };
    tracing::debug!(
        path = %path.display(),
        user = %discovered.user,
        port = discovered.port,
        "discovered default rpc credentials"
    );
    Ok(discovered)
}

fn parse_lines(contents: &str) -> HashMap<String, String> {
    contents
        .lines()
        .filter_map(|line| {
            let line = line.split_once('#').map_or(line, |(before, _)| before);
            let (key, value) = line.split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}
