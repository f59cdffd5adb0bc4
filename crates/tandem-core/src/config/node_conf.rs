use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use super::ConfigError;
use crate::types::ConnectionIdentity;

/// Key injected into every loaded [`NodeConfig`] holding the source path.
pub const FILENAME_KEY: &str = "filename";

/// Key/value settings read from a node's `liquid.conf`.
///
/// Values are kept as strings; typed accessors such as [`credentials`](Self::credentials)
/// coerce at the point of use. A loaded config is never mutated; reload to pick up changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    path: PathBuf,
    entries: HashMap<String, String>,
}

impl NodeConfig {
    /// Reads and parses the config file at `path`.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::NotFound`] if the file does not exist
    /// - [`ConfigError::Io`] if it exists but cannot be read
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::from_io(path, e))?;
        let config = Self::parse(path, &contents);
        tracing::debug!(path = %path.display(), keys = config.entries.len(), "loaded node config");
        Ok(config)
    }

    /// Parses `contents` as if read from `path`.
    ///
    /// Blank lines, `#` comments and lines that do not contain exactly one `=` are skipped.
    /// A comment may be indented; leading whitespace before `#` still marks the line as one.
    /// Keys and values are trimmed. A later duplicate key replaces an earlier one.
    #[must_use]
    pub fn parse(path: impl Into<PathBuf>, contents: &str) -> Self {
        let path = path.into();
        let mut entries = HashMap::new();

        for line in contents.lines() {
            let line = line.trim_end();
            if line.is_empty() || line.trim_start().starts_with('#') {
                continue;
            }
            let mut parts = line.split('=');
            let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
                continue;
            };
            entries.insert(key.trim().to_string(), value.trim().to_string());
        }

        entries.insert(FILENAME_KEY.to_string(), path.to_string_lossy().into_owned());
        Self { path, entries }
    }

    /// Returns the raw string value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Returns `true` if `key` was present in the file (or is `filename`).
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterates over all entries, including the injected `filename`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Path the config was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Extracts `rpcuser`, `rpcpassword` and `rpcport` as a [`ConnectionIdentity`].
    ///
    /// Per-node configs get no defaults: every key must be present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidConfig`] if a key is missing or `rpcport` is not a port
    /// number.
    pub fn credentials(&self) -> Result<ConnectionIdentity, ConfigError> {
        let user = self.require("rpcuser")?;
        let password = self.require("rpcpassword")?;
        let port = parse_port(self.require("rpcport")?, &self.path)?;
        Ok(ConnectionIdentity::new(user, password, port))
    }

    fn require(&self, key: &str) -> Result<&str, ConfigError> {
        self.get(key).ok_or_else(|| {
            ConfigError::InvalidConfig(format!("`{key}` missing from {}", self.path.display()))
        })
    }
}

pub(crate) fn parse_port(raw: &str, path: &Path) -> Result<u16, ConfigError> {
    raw.parse::<u16>().map_err(|_| {
        ConfigError::InvalidConfig(format!(
            "`rpcport` in {} is not a valid port: {raw:?}",
            path.display()
        ))
    })
}
