use std::path::{Path, PathBuf};

use super::{
    convergence::{self, ChainSource, ConvergenceOptions, ConvergencePredicate},
    ChainSnapshot,
};
use crate::{
    errors::HarnessError,
    node::{NodeHandle, NodeSupervisor},
};

/// A node to start: its data directory and an optional label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    pub datadir: PathBuf,
    pub name: Option<String>,
}

impl NodeSpec {
    #[must_use]
    pub fn new(datadir: impl Into<PathBuf>) -> Self {
        Self { datadir: datadir.into(), name: None }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn datadir(&self) -> &Path {
        &self.datadir
    }
}

/// Starts a set of nodes and waits for them to agree on chain state.
pub struct ClusterCoordinator {
    supervisor: NodeSupervisor,
    options: ConvergenceOptions,
}

impl ClusterCoordinator {
    #[must_use]
    pub fn new(supervisor: NodeSupervisor, options: ConvergenceOptions) -> Self {
        Self { supervisor, options }
    }

    #[must_use]
    pub fn supervisor(&self) -> &NodeSupervisor {
        &self.supervisor
    }

    #[must_use]
    pub fn options(&self) -> &ConvergenceOptions {
        &self.options
    }

    /// Starts every node in order.
    ///
    /// If a node fails to start, nodes already started are killed before the error is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns the first [`NodeSupervisor::start`] error.
    pub async fn start_all(&self, specs: &[NodeSpec]) -> Result<Vec<NodeHandle>, HarnessError> {
        let mut handles = Vec::with_capacity(specs.len());

        for spec in specs {
            match self.supervisor.start(&spec.datadir, spec.name.as_deref()).await {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    tracing::error!(
                        datadir = %spec.datadir.display(),
                        error = %e,
                        started = handles.len(),
                        "node failed to start, killing started nodes"
                    );
                    for handle in &mut handles {
                        if let Err(kill_err) = handle.kill().await {
                            tracing::warn!(
                                node = %handle.label(),
                                error = %kill_err,
                                "kill failed"
                            );
                        }
                    }
                    return Err(e);
                }
            }
        }

        tracing::info!(nodes = handles.len(), "all nodes started");
        Ok(handles)
    }

    /// Waits until every source answers RPC, bounded by the configured timeout.
    ///
    /// # Errors
    ///
    /// See [`convergence::wait_until_reachable`].
    pub async fn wait_until_reachable<S: ChainSource>(
        &self,
        sources: &[S],
    ) -> Result<(), HarnessError> {
        convergence::wait_until_reachable(sources, &self.options).await
    }

    /// Blocks until `predicate` holds across all sources.
    ///
    /// # Errors
    ///
    /// See [`convergence::wait_for_convergence`].
    pub async fn wait_for_convergence<S, P>(
        &self,
        sources: &[S],
        predicate: &P,
    ) -> Result<Vec<ChainSnapshot>, HarnessError>
    where
        S: ChainSource,
        P: ConvergencePredicate + ?Sized,
    {
        convergence::wait_for_convergence(sources, predicate, &self.options).await
    }

    /// Starts all nodes, waits for RPC, then waits for convergence.
    ///
    /// # Errors
    ///
    /// Any error from [`start_all`](Self::start_all),
    /// [`wait_until_reachable`](Self::wait_until_reachable) or
    /// [`wait_for_convergence`](Self::wait_for_convergence). Started nodes are left running.
    pub async fn start_and_converge<P>(
        &self,
        specs: &[NodeSpec],
        predicate: &P,
    ) -> Result<(Vec<NodeHandle>, Vec<ChainSnapshot>), HarnessError>
    where
        P: ConvergencePredicate + ?Sized,
    {
        let handles = self.start_all(specs).await?;
        self.wait_until_reachable(&handles).await?;
        let snapshots = self.wait_for_convergence(&handles, predicate).await?;
        Ok((handles, snapshots))
    }
}
