//! JSON-RPC client layer.
//!
//! - [`Transport`]: one request/response round trip; [`HttpTransport`] speaks HTTP with basic
//!   auth and can rebuild its connection in place
//! - [`RetryingTransport`]: wraps any transport and transparently recovers from stale
//!   connections
//! - [`RpcClient`]: method dispatch and typed helpers on top of a transport
//! - [`ConnectionRegistry`]: one shared client per identity, with a default identity

pub mod client;
pub mod errors;
pub mod registry;
pub mod retry;
pub mod transport;

pub use client::RpcClient;
pub use errors::{RpcError, RPC_IN_WARMUP, RPC_METHOD_NOT_FOUND};
pub use registry::ConnectionRegistry;
pub use retry::{RetryingTransport, DEFAULT_MAX_STALE_RETRIES};
pub use transport::{HttpTransport, RpcClientConfig, Transport};
