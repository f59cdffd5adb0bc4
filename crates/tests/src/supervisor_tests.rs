//! Process supervision with a stand-in daemon script, and cluster start-up against mock RPC.

use std::{
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use serde_json::json;
use serial_test::serial;
use tandem_core::{
    cluster::{ClusterCoordinator, Convergence, ConvergenceOptions, NodeSpec},
    config::DaemonConfig,
    node::{prepare_datadir, NodeSupervisor},
    rpc::ConnectionRegistry,
    HarnessError,
};

use crate::mock_infrastructure::{
    block_hash, write_node_conf, DisconnectingServer, RpcMockBuilder,
};

/// Writes a fake daemon that records its arguments to `args.txt` next to itself and then
/// sleeps.
fn fake_daemon(dir: &Path) -> PathBuf {
    let path = dir.join("fake-liquidd");
    let args = dir.join("args.txt");
    std::fs::write(
        &path,
        format!("#!/bin/sh\necho \"$@\" >> \"{}\"\nexec sleep 30\n", args.display()),
    )
    .unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn supervisor(binary: &Path) -> NodeSupervisor {
    NodeSupervisor::new(
        DaemonConfig {
            binary: binary.display().to_string(),
            startup_grace_ms: 50,
            shutdown_timeout_seconds: 1,
            ..DaemonConfig::default()
        },
        Arc::new(ConnectionRegistry::new(RpcMockBuilder::client_config())),
    )
}

async fn recorded_args(dir: &Path) -> String {
    for _ in 0..50 {
        if let Ok(args) = std::fs::read_to_string(dir.join("args.txt")) {
            return args;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("fake daemon never recorded its arguments");
}

#[tokio::test]
#[serial]
async fn test_start_passes_datadir_and_registers_client() {
    let bin = tempfile::tempdir().unwrap();
    let datadir = tempfile::tempdir().unwrap();
    write_node_conf(datadir.path(), "alice", "secret", 18443);
    let supervisor = supervisor(&fake_daemon(bin.path()));

    let mut handle = supervisor.start(datadir.path(), Some("proposer")).await.unwrap();

    assert!(handle.pid().is_some());
    assert_eq!(handle.label(), "proposer");
    assert_eq!(handle.config().get("rpcport"), Some("18443"));
    assert_eq!(
        recorded_args(bin.path()).await.trim(),
        format!("-datadir={}", datadir.path().display())
    );
    assert_eq!(supervisor.registry().len(), 1);
    assert!(handle.try_exit_status().unwrap().is_none());

    handle.kill().await.unwrap();
    assert!(handle.try_exit_status().unwrap().is_some());
}

#[tokio::test]
#[serial]
async fn test_started_node_client_recovers_from_dropped_connection() {
    let server = DisconnectingServer::start(1, json!(101)).await;
    let bin = tempfile::tempdir().unwrap();
    let datadir = tempfile::tempdir().unwrap();
    write_node_conf(datadir.path(), "alice", "secret", server.port());

    let mut handle =
        supervisor(&fake_daemon(bin.path())).start(datadir.path(), Some("n1")).await.unwrap();

    assert_eq!(handle.client().get_block_count().await.unwrap(), 101);
    // first connection hung up, the rebuilt one answered
    assert_eq!(server.connections(), 2);

    handle.kill().await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_shutdown_kills_daemon_that_ignores_stop() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_result("stop", &json!("Liquid server stopping"));
    let bin = tempfile::tempdir().unwrap();
    let datadir = tempfile::tempdir().unwrap();
    write_node_conf(datadir.path(), "alice", "secret", mock.port());

    let mut handle =
        supervisor(&fake_daemon(bin.path())).start(datadir.path(), None).await.unwrap();
    let status = handle.shutdown().await.unwrap();

    assert!(!status.success());
    mock.assert_all().await;
}

#[tokio::test]
#[serial]
async fn test_cluster_starts_and_converges() {
    let mut m1 = RpcMockBuilder::new().await;
    let mut m2 = RpcMockBuilder::new().await;
    m1.mock_chain(1, &block_hash(1));
    m2.mock_chain(1, &block_hash(1));

    let bin = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    let (d1, d2) = (root.path().join("liquiddir1"), root.path().join("liquiddir2"));
    write_node_conf(&d1, "alice", "secret", m1.port());
    write_node_conf(&d2, "bob", "hunter2", m2.port());

    let coordinator = ClusterCoordinator::new(
        supervisor(&fake_daemon(bin.path())),
        ConvergenceOptions::fixed(Duration::from_millis(20)).with_timeout(Duration::from_secs(5)),
    );
    let specs = [NodeSpec::new(&d1).with_name("n1"), NodeSpec::new(&d2).with_name("n2")];

    let (mut handles, snapshots) =
        coordinator.start_and_converge(&specs, &Convergence::SameTip).await.unwrap();

    assert_eq!(handles.len(), 2);
    assert_eq!(snapshots[0], snapshots[1]);
    assert_eq!(coordinator.supervisor().registry().len(), 2);
    for handle in &mut handles {
        handle.kill().await.unwrap();
    }
}

#[tokio::test]
#[serial]
async fn test_failed_start_stops_at_first_bad_node() {
    let bin = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    let good = root.path().join("liquiddir1");
    write_node_conf(&good, "alice", "secret", 18443);
    let missing = root.path().join("liquiddir2");

    let coordinator = ClusterCoordinator::new(
        supervisor(&fake_daemon(bin.path())),
        ConvergenceOptions::default(),
    );

    let err = coordinator
        .start_all(&[NodeSpec::new(&good), NodeSpec::new(&missing)])
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::Config(_)));
    // only the first node got far enough to register a client
    assert_eq!(coordinator.supervisor().registry().len(), 1);
}

#[test]
fn test_prepare_then_attach() {
    let root = tempfile::tempdir().unwrap();
    let template_dir = root.path().join("conf");
    let template = write_node_conf(&template_dir, "alice", "secret", 18443);
    let datadir = root.path().join("liquiddir1");

    prepare_datadir(&datadir, &template, "liquid.conf").unwrap();
    let node = supervisor(Path::new("liquidd")).attach(&datadir, Some("n1")).unwrap();

    assert_eq!(node.datadir(), datadir.as_path());
    assert_eq!(node.config().get("rpcuser"), Some("alice"));
    assert_eq!(node.client().identity().map(|id| id.port), Some(18443));
}
