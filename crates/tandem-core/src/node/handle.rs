use async_trait::async_trait;
use std::{
    path::{Path, PathBuf},
    process::ExitStatus,
    sync::Arc,
    time::Duration,
};
use tokio::process::Child;

use crate::{
    cluster::ChainSource,
    config::NodeConfig,
    errors::HarnessError,
    rpc::{RpcClient, RpcError},
    types::ChainSnapshot,
};

fn label_for(name: Option<&str>, datadir: &Path) -> String {
    name.map_or_else(|| datadir.display().to_string(), str::to_string)
}

/// A daemon started by [`NodeSupervisor::start`](super::NodeSupervisor::start).
///
/// The process is not killed when the handle is dropped; use [`shutdown`](Self::shutdown) or
/// [`kill`](Self::kill) to stop it.
pub struct NodeHandle {
    name: Option<String>,
    datadir: PathBuf,
    config: NodeConfig,
    client: Arc<RpcClient>,
    child: Child,
    shutdown_timeout: Duration,
}

impl NodeHandle {
    pub(crate) fn new(
        name: Option<String>,
        datadir: PathBuf,
        config: NodeConfig,
        client: Arc<RpcClient>,
        child: Child,
        shutdown_timeout: Duration,
    ) -> Self {
        Self { name, datadir, config, client, child, shutdown_timeout }
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name if one was given, otherwise the data directory.
    #[must_use]
    pub fn label(&self) -> String {
        label_for(self.name(), &self.datadir)
    }

    #[must_use]
    pub fn datadir(&self) -> &Path {
        &self.datadir
    }

    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    #[must_use]
    pub fn client(&self) -> &Arc<RpcClient> {
        &self.client
    }

    /// OS process id, or `None` once the process has been reaped.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Exit status if the process has already exited.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Io`] if the status cannot be queried.
    pub fn try_exit_status(&mut self) -> Result<Option<ExitStatus>, HarnessError> {
        Ok(self.child.try_wait()?)
    }

    /// Waits for the process to exit.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Io`] if waiting fails.
    pub async fn wait(&mut self) -> Result<ExitStatus, HarnessError> {
        Ok(self.child.wait().await?)
    }

    /// Kills the process and reaps it. A process that already exited is left alone.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Io`] if the signal cannot be delivered.
    pub async fn kill(&mut self) -> Result<(), HarnessError> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        tracing::info!(node = %self.label(), pid = ?self.pid(), "killing node");
        self.child.kill().await?;
        Ok(())
    }

    /// Asks the daemon to stop over RPC and waits for it to exit, killing it if it
    /// outlives the shutdown timeout.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Io`] if the process cannot be waited on or killed.
    pub async fn shutdown(&mut self) -> Result<ExitStatus, HarnessError> {
        if let Some(status) = self.child.try_wait()? {
            return Ok(status);
        }

        if let Err(e) = self.client.stop().await {
            tracing::warn!(node = %self.label(), error = %e, "rpc stop failed");
        }

        match tokio::time::timeout(self.shutdown_timeout, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                tracing::info!(node = %self.label(), %status, "node stopped");
                Ok(status)
            }
            Err(_) => {
                tracing::warn!(
                    node = %self.label(),
                    timeout_secs = self.shutdown_timeout.as_secs(),
                    "node did not stop in time, killing"
                );
                self.child.kill().await?;
                Ok(self.child.wait().await?)
            }
        }
    }
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("name", &self.name)
            .field("datadir", &self.datadir)
            .field("pid", &self.pid())
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChainSource for NodeHandle {
    fn label(&self) -> String {
        NodeHandle::label(self)
    }

    async fn chain_snapshot(&self) -> Result<ChainSnapshot, RpcError> {
        self.client.chain_snapshot().await
    }
}

/// A node that is already running and was not spawned by this process.
#[derive(Debug, Clone)]
pub struct AttachedNode {
    name: Option<String>,
    datadir: PathBuf,
    config: NodeConfig,
    client: Arc<RpcClient>,
}

impl AttachedNode {
    pub(crate) fn new(
        name: Option<String>,
        datadir: PathBuf,
        config: NodeConfig,
        client: Arc<RpcClient>,
    ) -> Self {
        Self { name, datadir, config, client }
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn label(&self) -> String {
        label_for(self.name(), &self.datadir)
    }

    #[must_use]
    pub fn datadir(&self) -> &Path {
        &self.datadir
    }

    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    #[must_use]
    pub fn client(&self) -> &Arc<RpcClient> {
        &self.client
    }
}

#[async_trait]
impl ChainSource for AttachedNode {
    fn label(&self) -> String {
        AttachedNode::label(self)
    }

    async fn chain_snapshot(&self) -> Result<ChainSnapshot, RpcError> {
        self.client.chain_snapshot().await
    }
}
