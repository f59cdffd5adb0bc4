//! Two-node regtest network fixture.

use std::{net::TcpListener, path::Path, sync::Arc, time::Duration};

use tandem_core::{
    cluster::{ClusterCoordinator, ConvergenceOptions, NodeSpec},
    config::DaemonConfig,
    node::{NodeHandle, NodeSupervisor},
    rpc::{ConnectionRegistry, RpcClientConfig},
    HarnessError,
};
use tempfile::TempDir;

/// Picks a free local port.
///
/// # Panics
///
/// Panics if no ephemeral port can be bound.
#[must_use]
pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|addr| addr.port())
        .expect("free port")
}

/// Writes a regtest `liquid.conf` that peers with `peer_port`.
///
/// # Panics
///
/// Panics if the file cannot be written.
pub fn write_regtest_conf(datadir: &Path, rpc_port: u16, p2p_port: u16, peer_port: u16) {
    std::fs::create_dir_all(datadir).expect("create datadir");
    let conf = format!(
        "chain=liquidregtest\n\
         [liquidregtest]\n\
         rpcuser=alice\n\
         rpcpassword=secret\n\
         rpcport={rpc_port}\n\
         port={p2p_port}\n\
         connect=127.0.0.1:{peer_port}\n\
         listen=1\n\
         server=1\n\
         daemon=0\n\
         validatepegin=0\n\
         initialfreecoins=2100000000000000\n"
    );
    std::fs::write(datadir.join("liquid.conf"), conf).expect("write liquid.conf");
}

/// Two connected regtest nodes; dropping the fixture removes their datadirs.
pub struct TwoNodeNetwork {
    _root: TempDir,
    pub coordinator: ClusterCoordinator,
    pub nodes: Vec<NodeHandle>,
}

impl TwoNodeNetwork {
    /// Starts both nodes and waits until they answer RPC.
    ///
    /// # Errors
    ///
    /// Any start-up or reachability error from the coordinator.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    pub async fn start() -> Result<Self, HarnessError> {
        let root = tempfile::tempdir().expect("tempdir");
        let (p2p1, p2p2) = (free_port(), free_port());
        let (d1, d2) = (root.path().join("liquiddir1"), root.path().join("liquiddir2"));
        write_regtest_conf(&d1, free_port(), p2p1, p2p2);
        write_regtest_conf(&d2, free_port(), p2p2, p2p1);

        let daemon = DaemonConfig {
            binary: std::env::var("LIQUIDD").unwrap_or_else(|_| "liquidd".to_string()),
            shutdown_timeout_seconds: 30,
            ..DaemonConfig::default()
        };
        let rpc = RpcClientConfig { host: "127.0.0.1".to_string(), ..RpcClientConfig::default() };
        let coordinator = ClusterCoordinator::new(
            NodeSupervisor::new(daemon, Arc::new(ConnectionRegistry::new(rpc))),
            ConvergenceOptions::default().with_timeout(Duration::from_secs(120)),
        );

        let nodes = coordinator
            .start_all(&[NodeSpec::new(&d1).with_name("n1"), NodeSpec::new(&d2).with_name("n2")])
            .await?;
        coordinator.wait_until_reachable(&nodes).await?;

        Ok(Self { _root: root, coordinator, nodes })
    }

    /// Stops every node over RPC, killing any that linger.
    pub async fn shutdown(mut self) {
        for node in &mut self.nodes {
            if let Err(e) = node.shutdown().await {
                tracing::warn!(node = %node.label(), error = %e, "shutdown failed");
            }
        }
    }
}
