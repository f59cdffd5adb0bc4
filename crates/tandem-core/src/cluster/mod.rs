//! Multi-node coordination: start a cluster and wait for it to agree on chain state.

pub mod convergence;
pub mod coordinator;

pub use convergence::{
    wait_for_convergence, wait_until_reachable, ChainSource, Convergence, ConvergenceOptions,
    ConvergencePredicate,
};
pub use coordinator::{ClusterCoordinator, NodeSpec};

pub use crate::types::ChainSnapshot;
