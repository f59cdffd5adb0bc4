use thiserror::Error;

/// bitcoind `RPC_IN_WARMUP`: the daemon is up but still loading its block index.
pub const RPC_IN_WARMUP: i32 = -28;

/// bitcoind `RPC_METHOD_NOT_FOUND`.
pub const RPC_METHOD_NOT_FOUND: i32 = -32601;

/// Errors that can occur when talking to a node's JSON-RPC endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RpcError {
    /// The transport was closed by the peer or can no longer accept writes.
    ///
    /// This is the only class the retrying transport recovers from.
    #[error("Stale connection: {0}")]
    TransportStale(String),

    /// No connection could be established (refused, unreachable, DNS).
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Request exceeded the configured timeout.
    #[error("Request timeout")]
    Timeout,

    /// Credentials were rejected.
    #[error("Unauthorized (HTTP {0}): check rpcuser/rpcpassword")]
    Unauthorized(u16),

    /// The node answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    RpcCallFailed { code: i32, message: String },

    /// Non-success HTTP status without a JSON-RPC error body.
    ///
    /// First field is the HTTP status code, second is the (truncated) body.
    #[error("HTTP error {0}: {1}")]
    HttpError(u16, String),

    /// The response body could not be parsed.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The request could not be serialized.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The underlying HTTP client could not be built.
    #[error("HTTP client build failed: {0}")]
    ClientBuild(String),
}

impl RpcError {
    /// Returns `true` if the connection should be rebuilt and the request resent.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::TransportStale(_))
    }

    /// Returns `true` if a later attempt against the same node could succeed.
    ///
    /// Bad credentials and requests or clients that cannot be built never recover by waiting.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Unauthorized(_) | Self::InvalidRequest(_) | Self::ClientBuild(_))
    }

    /// Returns the JSON-RPC error code if the node answered with an error object.
    #[must_use]
    pub fn rpc_code(&self) -> Option<i32> {
        match self {
            Self::RpcCallFailed { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns `true` if the node is reachable but still starting up.
    ///
    /// Covers both the warmup RPC error and a refused connection before the RPC server binds.
    #[must_use]
    pub fn is_node_starting(&self) -> bool {
        matches!(self, Self::ConnectionFailed(_)) || self.rpc_code() == Some(RPC_IN_WARMUP)
    }
}
