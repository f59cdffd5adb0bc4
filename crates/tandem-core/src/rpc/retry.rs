use async_trait::async_trait;

use super::{RpcError, Transport};
use crate::types::{JsonRpcRequest, JsonRpcResponse};

/// Default number of stale-connection retries after the first attempt.
pub const DEFAULT_MAX_STALE_RETRIES: u32 = 2;

/// Transport decorator that rebuilds the inner connection when it goes stale.
///
/// On [`RpcError::TransportStale`] the inner transport is reconnected and the same request
/// resent, up to `max_retries` times. Once retries are exhausted the last stale error is
/// returned as-is without another rebuild. Every other error is returned immediately.
pub struct RetryingTransport<T> {
    inner: T,
    max_retries: u32,
}

impl<T: Transport> RetryingTransport<T> {
    #[must_use]
    pub fn new(inner: T) -> Self {
        Self::with_max_retries(inner, DEFAULT_MAX_STALE_RETRIES)
    }

    #[must_use]
    pub fn with_max_retries(inner: T, max_retries: u32) -> Self {
        Self { inner, max_retries }
    }

    #[must_use]
    pub fn inner(&self) -> &T {
        &self.inner
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

#[async_trait]
impl<T: Transport> Transport for RetryingTransport<T> {
    async fn send(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, RpcError> {
        let mut retries = 0;

        loop {
            match self.inner.send(request).await {
                Err(e) if e.is_stale() && retries < self.max_retries => {
                    retries += 1;
                    tracing::debug!(
                        endpoint = %self.inner.endpoint(),
                        method = %request.method,
                        attempt = retries,
                        error = %e,
                        "stale rpc connection, reconnecting"
                    );
                    self.inner.reconnect()?;
                }
                Err(e) if e.is_stale() => {
                    tracing::warn!(
                        endpoint = %self.inner.endpoint(),
                        method = %request.method,
                        retries,
                        "rpc connection still stale after retries"
                    );
                    return Err(e);
                }
                result => return result,
            }
        }
    }

    fn reconnect(&self) -> Result<(), RpcError> {
        self.inner.reconnect()
    }

    fn endpoint(&self) -> String {
        self.inner.endpoint()
    }
}
