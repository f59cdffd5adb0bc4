use std::{sync::Arc, time::Duration};

use tandem_core::{
    cluster::{ChainSnapshot, ClusterCoordinator, Convergence},
    config::{AppConfig, NodeEntry},
    node::{prepare_datadir, AttachedNode, NodeHandle, NodeSupervisor},
    rpc::ConnectionRegistry,
};

use super::utils::{print_error, print_info, print_success, CliError, CliResult};

/// Options for `tandem up`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpOptions {
    pub prepare: bool,
    pub no_wait: bool,
    pub foreground: bool,
}

fn supervisor(config: &AppConfig) -> NodeSupervisor {
    NodeSupervisor::new(
        config.daemon_config(),
        Arc::new(ConnectionRegistry::new(config.rpc_client_config())),
    )
}

fn require_nodes(config: &AppConfig) -> CliResult<()> {
    if config.nodes.is_empty() {
        return Err(CliError::Settings("no [[nodes]] configured".to_string()));
    }
    Ok(())
}

fn print_snapshots(labels: impl IntoIterator<Item = String>, snapshots: &[ChainSnapshot]) {
    for (label, snapshot) in labels.into_iter().zip(snapshots) {
        println!("  {label}: {} blocks, tip {}", snapshot.blocks, snapshot.best_block_hash);
    }
}

pub fn prepare(config: &AppConfig) -> CliResult<()> {
    require_nodes(config)?;
    for node in &config.nodes {
        prepare_node(config, node)?;
    }
    print_success(&format!("Prepared {} datadir(s)", config.nodes.len()));
    Ok(())
}

fn prepare_node(config: &AppConfig, node: &NodeEntry) -> CliResult<()> {
    let Some(template) = &node.template_conf else {
        return Err(CliError::Settings(format!("node `{}` has no template_conf", node.name)));
    };
    let conf = prepare_datadir(&node.datadir, template, &config.daemon.conf_file_name)?;
    print_info(&format!("{}: {}", node.name, conf.display()));
    Ok(())
}

/// Starts every configured node, then waits for them unless `no_wait` is set.
///
/// Daemons are left running when the command exits unless `foreground` is set, in which
/// case they are shut down on Ctrl-C.
pub async fn up(config: &AppConfig, options: UpOptions) -> CliResult<()> {
    require_nodes(config)?;
    if options.prepare {
        prepare(config)?;
    }

    let coordinator = ClusterCoordinator::new(supervisor(config), config.convergence_options());
    let mut handles = coordinator.start_all(&config.node_specs()).await?;
    print_success(&format!("Started {} node(s)", handles.len()));
    for handle in &handles {
        print_info(&format!("{} (pid {:?})", handle.label(), handle.pid()));
    }

    if !options.no_wait {
        coordinator.wait_until_reachable(&handles).await?;
        let criterion = config.criterion();
        let snapshots = coordinator.wait_for_convergence(&handles, &criterion).await?;
        print_success(&format!("Nodes converged on {criterion}"));
        print_snapshots(handles.iter().map(NodeHandle::label), &snapshots);
    }

    if options.foreground {
        print_info("Press Ctrl-C to stop the nodes");
        tokio::signal::ctrl_c().await?;
        shutdown_all(&mut handles).await;
    }

    Ok(())
}

async fn shutdown_all(handles: &mut [NodeHandle]) {
    for handle in handles {
        match handle.shutdown().await {
            Ok(status) => print_info(&format!("{} exited: {status}", handle.label())),
            Err(e) => print_error(&format!("{}: {e}", handle.label())),
        }
    }
}

fn attach_all(supervisor: &NodeSupervisor, config: &AppConfig) -> CliResult<Vec<AttachedNode>> {
    config
        .nodes
        .iter()
        .map(|node| supervisor.attach(&node.datadir, Some(&node.name)).map_err(CliError::from))
        .collect()
}

/// Waits for already running nodes, optionally overriding the configured criterion and
/// timeout. A timeout of `0` waits forever.
pub async fn wait(
    config: &AppConfig,
    criterion: Option<Convergence>,
    timeout_secs: Option<u64>,
) -> CliResult<()> {
    require_nodes(config)?;
    let supervisor = supervisor(config);
    let nodes = attach_all(&supervisor, config)?;

    let mut options = config.convergence_options();
    if let Some(secs) = timeout_secs {
        options.timeout = (secs > 0).then_some(Duration::from_secs(secs));
    }
    let criterion = criterion.unwrap_or_else(|| config.criterion());

    let coordinator = ClusterCoordinator::new(supervisor, options);
    coordinator.wait_until_reachable(&nodes).await?;
    let snapshots = coordinator.wait_for_convergence(&nodes, &criterion).await?;

    print_success(&format!("Nodes converged on {criterion}"));
    print_snapshots(nodes.iter().map(AttachedNode::label), &snapshots);
    Ok(())
}

/// Prints each node's chain state, or the error reaching it.
pub async fn status(config: &AppConfig) -> CliResult<()> {
    require_nodes(config)?;
    let nodes = attach_all(&supervisor(config), config)?;

    for node in &nodes {
        match node.client().chain_snapshot().await {
            Ok(snapshot) => println!(
                "  {}: {} blocks, tip {}",
                node.label(),
                snapshot.blocks,
                snapshot.best_block_hash
            ),
            Err(e) => println!("  {}: unreachable ({e})", node.label()),
        }
    }
    Ok(())
}

/// Sends RPC `stop` to every configured node. Failures are reported, not returned.
pub async fn down(config: &AppConfig) -> CliResult<()> {
    require_nodes(config)?;
    let supervisor = supervisor(config);
    let mut stopped = 0usize;

    for entry in &config.nodes {
        let result = match supervisor.attach(&entry.datadir, Some(&entry.name)) {
            Ok(node) => node.client().stop().await.map_err(CliError::from),
            Err(e) => Err(CliError::from(e)),
        };
        match result {
            Ok(()) => {
                stopped += 1;
                print_info(&format!("{}: stop requested", entry.name));
            }
            Err(e) => {
                tracing::warn!(node = %entry.name, error = %e, "stop failed");
                print_error(&format!("{}: {e}", entry.name));
            }
        }
    }

    print_success(&format!("Stopped {stopped}/{} node(s)", config.nodes.len()));
    Ok(())
}
