use arc_swap::ArcSwap;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, ClientBuilder, StatusCode};
use std::{
    error::Error as StdError,
    io,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use super::RpcError;
use crate::types::{ConnectionIdentity, JsonRpcRequest, JsonRpcResponse, LOCALHOST};

/// Settings shared by every transport the client layer builds.
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    /// Host the RPC endpoint listens on.
    pub host: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Stale-connection retries after the first attempt.
    pub max_stale_retries: u32,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            host: LOCALHOST.to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            max_stale_retries: 2,
        }
    }
}

/// A channel that carries one JSON-RPC request and returns the decoded response.
///
/// A response carrying a JSON-RPC `error` object is a successful transport round trip;
/// turning it into [`RpcError::RpcCallFailed`] is the client's job.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` and decodes the response envelope.
    async fn send(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, RpcError>;

    /// Discards the current connection state and builds a fresh one in place.
    fn reconnect(&self) -> Result<(), RpcError>;

    /// Endpoint description safe to log (no password).
    fn endpoint(&self) -> String;
}

/// HTTP transport with basic authentication, backed by a swappable reqwest client.
///
/// [`reconnect`](Transport::reconnect) replaces the client, dropping its idle connection
/// pool, so the next request opens a new socket to the same host and port.
pub struct HttpTransport {
    identity: ConnectionIdentity,
    url: String,
    config: RpcClientConfig,
    client: ArcSwap<Client>,
    reconnects: AtomicU64,
}

impl HttpTransport {
    /// Creates a transport for `identity` on `config.host`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::ClientBuild`] if the underlying reqwest client fails to build.
    pub fn new(identity: ConnectionIdentity, config: RpcClientConfig) -> Result<Self, RpcError> {
        let client = Self::build_client(&config)?;
        let url = format!("http://{}:{}/", config.host, identity.port);
        Ok(Self {
            identity,
            url,
            config,
            client: ArcSwap::from_pointee(client),
            reconnects: AtomicU64::new(0),
        })
    }

    fn build_client(config: &RpcClientConfig) -> Result<Client, RpcError> {
        ClientBuilder::new()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .pool_max_idle_per_host(1)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("tandem/", env!("CARGO_PKG_VERSION")))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "failed to build http client");
                RpcError::ClientBuild(e.to_string())
            })
    }

    /// Number of times the connection has been rebuilt.
    #[must_use]
    pub fn reconnect_count(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    /// Identity this transport authenticates with.
    #[must_use]
    pub fn identity(&self) -> &ConnectionIdentity {
        &self.identity
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, RpcError> {
        let body = serde_json::to_vec(request)
            .map(Bytes::from)
            .map_err(|e| RpcError::InvalidRequest(e.to_string()))?;

        let client = self.client.load_full();
        let response = client
            .post(&self.url)
            .basic_auth(&self.identity.user, Some(&self.identity.password))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| classify_send_error(&e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RpcError::Unauthorized(status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(|e| classify_send_error(&e))?;
        tracing::trace!(
            method = %request.method,
            status = status.as_u16(),
            len = bytes.len(),
            "rpc response received"
        );

        // bitcoind reports RPC errors with 404/500 and a JSON body.
        match serde_json::from_slice::<JsonRpcResponse>(&bytes) {
            Ok(parsed) if status.is_success() || parsed.error.is_some() => Ok(parsed),
            Ok(_) => Err(RpcError::HttpError(status.as_u16(), truncate_body(&bytes))),
            Err(_) if !status.is_success() => {
                Err(RpcError::HttpError(status.as_u16(), truncate_body(&bytes)))
            }
            Err(e) => Err(RpcError::InvalidResponse(e.to_string())),
        }
    }

    fn reconnect(&self) -> Result<(), RpcError> {
        let client = Self::build_client(&self.config)?;
        self.client.store(Arc::new(client));
        let count = self.reconnects.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(
            endpoint = %self.endpoint(),
            reconnects = count,
            "rebuilt rpc connection"
        );
        Ok(())
    }

    fn endpoint(&self) -> String {
        format!("http://{}:***@{}:{}/", self.identity.user, self.config.host, self.identity.port)
    }
}

fn truncate_body(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() > 256 {
        let cut = (0..=256).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0);
        format!("{}... (truncated)", &text[..cut])
    } else {
        text.into_owned()
    }
}

/// Maps a reqwest failure onto the error classes the retry layer understands.
fn classify_send_error(error: &reqwest::Error) -> RpcError {
    if error.is_timeout() {
        RpcError::Timeout
    } else if error.is_connect() {
        RpcError::ConnectionFailed("connection refused or unreachable".to_string())
    } else if is_stale_connection(error) {
        RpcError::TransportStale(error.to_string())
    } else if error.is_decode() || error.is_body() {
        RpcError::InvalidResponse(error.to_string())
    } else {
        RpcError::ConnectionFailed(error.to_string())
    }
}

/// Walks the source chain looking for a peer that hung up on an established connection.
pub(crate) fn is_stale_connection(error: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::BrokenPipe |
                    io::ErrorKind::ConnectionReset |
                    io::ErrorKind::ConnectionAborted |
                    io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        if let Some(hyper_err) = err.downcast_ref::<hyper::Error>() {
            if hyper_err.is_incomplete_message() || hyper_err.is_canceled() {
                return true;
            }
        }
        current = err.source();
    }
    false
}
