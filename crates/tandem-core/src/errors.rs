use std::time::Duration;
use thiserror::Error;

use crate::{config::ConfigError, rpc::RpcError};

/// Errors surfaced by the supervisor, the coordinator and harness setup.
///
/// Configuration and RPC errors are carried unchanged so callers can still match on the
/// original cause.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HarnessError {
    /// Node configuration could not be found or interpreted.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An RPC call failed after any transport-level recovery.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// The daemon binary could not be launched.
    #[error("Failed to spawn `{binary}`: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// Nodes did not satisfy the convergence predicate before the deadline.
    #[error(
        "Nodes did not converge within {waited:?} ({polls} polls, last error: {})",
        .last_error.as_deref().unwrap_or("none")
    )]
    ConvergenceTimeout { waited: Duration, polls: u64, last_error: Option<String> },

    /// Harness settings (`tandem.toml` plus environment) failed to load.
    #[error("Settings error: {0}")]
    Settings(#[from] ::config::ConfigError),

    /// Settings loaded but are inconsistent.
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// Filesystem error while preparing or inspecting a data directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// Returns `true` if the error came from a convergence or reachability deadline.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConvergenceTimeout { .. })
    }
}
