//! # Tandem Core
//!
//! Launches `liquidd` nodes for integration tests, talks to them over JSON-RPC, and waits
//! until they agree on chain state.
//!
//! - **[`config`]**: lenient `liquid.conf` loading, default-config discovery, and the harness's
//!   own layered settings.
//!
//! - **[`rpc`]**: JSON-RPC over HTTP with basic auth. Stale connections are rebuilt and the
//!   request resent transparently; clients are shared per identity through a registry.
//!
//! - **[`node`]**: data directory preparation, daemon spawning, and node handles.
//!
//! - **[`cluster`]**: starting a set of nodes and polling them until a convergence predicate
//!   holds.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │               ClusterCoordinator              │
//! │  start_all ─► wait_until_reachable ─► converge│
//! └───────────────────────┬───────────────────────┘
//!                         │
//!                ┌────────▼────────┐
//!                │  NodeSupervisor │──► liquidd -datadir=<dir>
//!                └────────┬────────┘
//!                         │ identity from liquid.conf
//!               ┌─────────▼──────────┐
//!               │ ConnectionRegistry │──► discover_default_config
//!               └─────────┬──────────┘
//!                         │ Arc<RpcClient>
//!        ┌────────────────▼─────────────────┐
//!        │ RetryingTransport<HttpTransport> │
//!        └──────────────────────────────────┘
//! ```

pub mod cluster;
pub mod config;
pub mod errors;
pub mod node;
pub mod rpc;
pub mod types;

pub use errors::HarnessError;
