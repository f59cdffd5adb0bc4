use parking_lot::Mutex;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use super::{RpcClient, RpcClientConfig};
use crate::{
    config::{discover_default_config, discover_from_path},
    errors::HarnessError,
    types::ConnectionIdentity,
};

#[derive(Default)]
struct RegistryState {
    clients: HashMap<ConnectionIdentity, Arc<RpcClient>>,
    default_identity: Option<ConnectionIdentity>,
}

/// Hands out one shared [`RpcClient`] per [`ConnectionIdentity`].
///
/// The most recent explicitly requested identity becomes the default, which is what
/// [`get_connection(None)`](Self::get_connection) resolves to. When no default exists yet,
/// credentials are discovered from the daemon's default config file.
///
/// Cached clients are not revalidated; after restarting a daemon with new credentials,
/// [`evict`](Self::evict) the old identity.
pub struct ConnectionRegistry {
    config: RpcClientConfig,
    discovery_path: Option<PathBuf>,
    state: Mutex<RegistryState>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new(config: RpcClientConfig) -> Self {
        Self { config, discovery_path: None, state: Mutex::new(RegistryState::default()) }
    }

    /// Uses `path` instead of the platform default when discovering credentials.
    #[must_use]
    pub fn with_discovery_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.discovery_path = Some(path.into());
        self
    }

    /// Returns the client for `identity`, creating it on first use.
    ///
    /// - `Some(identity)`: reuse or create, and make `identity` the default.
    /// - `None`: use the default identity, discovering one if none is known.
    ///
    /// # Errors
    ///
    /// - [`HarnessError::Config`] if discovery is needed and fails
    /// - [`HarnessError::Rpc`] if the HTTP client cannot be built
    pub fn get_connection(
        &self,
        identity: Option<ConnectionIdentity>,
    ) -> Result<Arc<RpcClient>, HarnessError> {
        let mut state = self.state.lock();

        let identity = match identity {
            Some(identity) => {
                if state.default_identity.as_ref() != Some(&identity) {
                    tracing::debug!(
                        user = %identity.user,
                        port = identity.port,
                        "switching default rpc identity"
                    );
                }
                state.default_identity = Some(identity.clone());
                identity
            }
            None => match state.default_identity.clone() {
                Some(identity) => identity,
                None => {
                    let identity = self.discover()?.identity();
                    state.default_identity = Some(identity.clone());
                    identity
                }
            },
        };

        if let Some(client) = state.clients.get(&identity) {
            return Ok(Arc::clone(client));
        }

        let client = Arc::new(RpcClient::connect(identity.clone(), &self.config)?);
        state.clients.insert(identity, Arc::clone(&client));
        Ok(client)
    }

    fn discover(&self) -> Result<crate::config::DiscoveredConfig, HarnessError> {
        let discovered = match &self.discovery_path {
            Some(path) => discover_from_path(path)?,
            None => discover_default_config()?,
        };
        tracing::info!(
            path = %discovered.path.display(),
            port = discovered.port,
            "using discovered default rpc credentials"
        );
        Ok(discovered)
    }

    /// Drops the cached client for `identity`. Returns `true` if one was cached.
    ///
    /// The default identity is kept; the next lookup builds a fresh client.
    pub fn evict(&self, identity: &ConnectionIdentity) -> bool {
        self.state.lock().clients.remove(identity).is_some()
    }

    /// Drops every cached client and forgets the default identity.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.clients.clear();
        state.default_identity = None;
    }

    /// Identity that [`get_connection(None)`](Self::get_connection) currently resolves to.
    #[must_use]
    pub fn default_identity(&self) -> Option<ConnectionIdentity> {
        self.state.lock().default_identity.clone()
    }

    /// Number of cached clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn config(&self) -> &RpcClientConfig {
        &self.config
    }

    #[must_use]
    pub fn discovery_path(&self) -> Option<&Path> {
        self.discovery_path.as_deref()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(RpcClientConfig::default())
    }
}
