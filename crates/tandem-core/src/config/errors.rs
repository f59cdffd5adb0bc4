use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while locating or interpreting node configuration files.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// The configuration file does not exist at the given path.
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// A required credential key is absent from the configuration.
    #[error("Missing credential `{key}` in {}", .path.display())]
    MissingCredential { key: &'static str, path: PathBuf },

    /// A value is present but cannot be interpreted (e.g. a non-numeric port).
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// The file exists but could not be read.
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Maps an I/O error for `path`, turning `NotFound` into [`ConfigError::NotFound`].
    pub(crate) fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path)
        } else {
            Self::Io { path, source }
        }
    }

    /// Returns `true` if the error means the file is absent rather than malformed.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
