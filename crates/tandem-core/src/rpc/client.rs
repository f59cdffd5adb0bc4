use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use super::{HttpTransport, RetryingTransport, RpcClientConfig, RpcError, Transport};
use crate::types::{ChainSnapshot, ConnectionIdentity, JsonRpcRequest};

/// One logical connection to a node's JSON-RPC endpoint.
///
/// Recovery from stale connections is a property of the transport, so every method,
/// including arbitrary ones issued through [`call`](Self::call), gets the same retry
/// behaviour.
pub struct RpcClient {
    transport: Arc<dyn Transport>,
    identity: Option<ConnectionIdentity>,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Builds a client for `identity` over HTTP with stale-connection retries.
    ///
    /// No network traffic happens until the first call.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::ClientBuild`] if the HTTP client fails to build.
    pub fn connect(
        identity: ConnectionIdentity,
        config: &RpcClientConfig,
    ) -> Result<Self, RpcError> {
        let http = HttpTransport::new(identity.clone(), config.clone())?;
        let transport = RetryingTransport::with_max_retries(http, config.max_stale_retries);
        tracing::debug!(
            endpoint = %transport.endpoint(),
            max_stale_retries = config.max_stale_retries,
            "created rpc client"
        );
        Ok(Self {
            transport: Arc::new(transport),
            identity: Some(identity),
            next_id: AtomicU64::new(1),
        })
    }

    /// Wraps an arbitrary transport.
    #[must_use]
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self { transport, identity: None, next_id: AtomicU64::new(1) }
    }

    /// Identity this client was built for, if built through [`connect`](Self::connect).
    #[must_use]
    pub fn identity(&self) -> Option<&ConnectionIdentity> {
        self.identity.as_ref()
    }

    /// Endpoint description safe to log.
    #[must_use]
    pub fn endpoint(&self) -> String {
        self.transport.endpoint()
    }

    /// Issues `method` with positional `params` and returns the raw `result`.
    ///
    /// A `null` result (e.g. from `setmocktime`) is returned as [`Value::Null`].
    ///
    /// # Errors
    ///
    /// - [`RpcError::RpcCallFailed`] if the node answered with an error object
    /// - any transport error left after stale-connection recovery
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(method, params, id);

        let response = self.transport.send(&request).await?;
        if let Some(error) = response.error {
            tracing::debug!(
                method = %method,
                code = error.code,
                message = %error.message,
                "rpc call returned error"
            );
            return Err(RpcError::RpcCallFailed { code: error.code, message: error.message });
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Same as [`call`](Self::call), deserializing the result into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::InvalidResponse`] if the result does not match `T`.
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, RpcError> {
        let value = self.call(method, params).await?;
        serde_json::from_value(value)
            .map_err(|e| RpcError::InvalidResponse(format!("{method}: {e}")))
    }

    /// `getblockchaininfo`, returned untouched.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn get_blockchain_info(&self) -> Result<Value, RpcError> {
        self.call("getblockchaininfo", vec![]).await
    }

    /// `getblockcount`.
    ///
    /// # Errors
    ///
    /// See [`call_as`](Self::call_as).
    pub async fn get_block_count(&self) -> Result<u64, RpcError> {
        self.call_as("getblockcount", vec![]).await
    }

    /// `getbestblockhash`.
    ///
    /// # Errors
    ///
    /// See [`call_as`](Self::call_as).
    pub async fn get_best_block_hash(&self) -> Result<String, RpcError> {
        self.call_as("getbestblockhash", vec![]).await
    }

    /// Height and tip from a single `getblockchaininfo` call.
    ///
    /// # Errors
    ///
    /// See [`call_as`](Self::call_as).
    pub async fn chain_snapshot(&self) -> Result<ChainSnapshot, RpcError> {
        self.call_as("getblockchaininfo", vec![]).await
    }

    /// Asks the daemon to shut down.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn stop(&self) -> Result<(), RpcError> {
        self.call("stop", vec![]).await.map(|_| ())
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient").field("endpoint", &self.endpoint()).finish_non_exhaustive()
    }
}
