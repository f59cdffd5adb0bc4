use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::{ChildStdout, Command},
};

use super::{AttachedNode, NodeHandle};
use crate::{
    config::{DaemonConfig, NodeConfig},
    errors::HarnessError,
    rpc::ConnectionRegistry,
    types::ConnectionIdentity,
};

/// Launches node daemons and connects to them.
pub struct NodeSupervisor {
    daemon: DaemonConfig,
    registry: Arc<ConnectionRegistry>,
}

impl NodeSupervisor {
    #[must_use]
    pub fn new(daemon: DaemonConfig, registry: Arc<ConnectionRegistry>) -> Self {
        Self { daemon, registry }
    }

    #[must_use]
    pub fn daemon(&self) -> &DaemonConfig {
        &self.daemon
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Path of the node config inside `datadir`.
    #[must_use]
    pub fn conf_path(&self, datadir: &Path) -> PathBuf {
        datadir.join(&self.daemon.conf_file_name)
    }

    fn load(&self, datadir: &Path) -> Result<(NodeConfig, ConnectionIdentity), HarnessError> {
        let config = NodeConfig::load(self.conf_path(datadir))?;
        let identity = config.credentials()?;
        Ok((config, identity))
    }

    /// Starts the daemon for `datadir` and returns once its client is ready.
    ///
    /// The node config is loaded and its credentials validated before anything is spawned.
    /// There is no readiness handshake: after spawning, the call sleeps for the configured
    /// startup grace period. Use
    /// [`wait_until_reachable`](crate::cluster::wait_until_reachable) to wait for RPC.
    ///
    /// # Errors
    ///
    /// - [`HarnessError::Config`] if the config is missing or lacks credentials
    /// - [`HarnessError::Spawn`] if the daemon binary cannot be launched
    /// - [`HarnessError::Rpc`] if the RPC client cannot be built
    pub async fn start(
        &self,
        datadir: impl AsRef<Path>,
        name: Option<&str>,
    ) -> Result<NodeHandle, HarnessError> {
        let datadir = datadir.as_ref();
        let (config, identity) = self.load(datadir)?;
        let label = name.map_or_else(|| datadir.display().to_string(), str::to_string);

        let mut child = Command::new(&self.daemon.binary)
            .arg(format!("-datadir={}", datadir.display()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(false)
            .spawn()
            .map_err(|source| HarnessError::Spawn { binary: self.daemon.binary.clone(), source })?;

        tracing::info!(
            node = %label,
            pid = ?child.id(),
            datadir = %datadir.display(),
            port = identity.port,
            "started node"
        );

        if let Some(stdout) = child.stdout.take() {
            drain_stdout(label.clone(), stdout);
        }

        let client = match self.registry.get_connection(Some(identity)) {
            Ok(client) => client,
            Err(e) => {
                if let Err(kill_err) = child.start_kill() {
                    tracing::warn!(node = %label, error = %kill_err, "failed to kill node");
                }
                return Err(e);
            }
        };

        let grace = self.daemon.startup_grace();
        if !grace.is_zero() {
            tracing::debug!(node = %label, grace_ms = grace.as_millis(), "waiting for startup");
            tokio::time::sleep(grace).await;
        }

        Ok(NodeHandle::new(
            name.map(str::to_string),
            datadir.to_path_buf(),
            config,
            client,
            child,
            self.daemon.shutdown_timeout(),
        ))
    }

    /// Connects to a node that is already running from `datadir`, without spawning.
    ///
    /// # Errors
    ///
    /// - [`HarnessError::Config`] if the config is missing or lacks credentials
    /// - [`HarnessError::Rpc`] if the RPC client cannot be built
    pub fn attach(
        &self,
        datadir: impl AsRef<Path>,
        name: Option<&str>,
    ) -> Result<AttachedNode, HarnessError> {
        let datadir = datadir.as_ref();
        let (config, identity) = self.load(datadir)?;
        let client = self.registry.get_connection(Some(identity))?;
        Ok(AttachedNode::new(name.map(str::to_string), datadir.to_path_buf(), config, client))
    }
}

/// Forwards daemon stdout to trace events until the pipe closes.
fn drain_stdout(label: String, stdout: ChildStdout) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => tracing::trace!(node = %label, %line, "daemon stdout"),
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(node = %label, error = %e, "daemon stdout closed");
                    break;
                }
            }
        }
    });
}
