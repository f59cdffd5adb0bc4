use std::{path::Path, sync::Arc};

use tandem_core::{
    config::{discover_default_config, discover_from_path, AppConfig, DefaultConfigLocation},
    node::NodeSupervisor,
    rpc::ConnectionRegistry,
};

use super::utils::{parse_param, print_info, CliError, CliResult};

/// Issues one RPC call against a configured node and prints the result as pretty JSON.
pub async fn call(
    config: &AppConfig,
    node: &str,
    method: &str,
    params: &[String],
) -> CliResult<()> {
    let entry = config
        .node(node)
        .ok_or_else(|| CliError::UnknownNode(node.to_string()))?;

    let supervisor = NodeSupervisor::new(
        config.daemon_config(),
        Arc::new(ConnectionRegistry::new(config.rpc_client_config())),
    );
    let attached = supervisor.attach(&entry.datadir, Some(&entry.name))?;

    let params = params.iter().map(|p| parse_param(p)).collect();
    tracing::debug!(node = %entry.name, %method, "issuing rpc call");
    let result = attached.client().call(method, params).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Prints the endpoint discovered from the default (or given) daemon config.
pub fn discover(path: Option<&Path>) -> CliResult<()> {
    let discovered = match path {
        Some(path) => discover_from_path(path),
        None => {
            print_info(&format!(
                "Looking in {}",
                DefaultConfigLocation::current()
                    .map_or_else(|e| e.to_string(), |p| p.display().to_string())
            ));
            discover_default_config()
        }
    }
    .map_err(|e| CliError::Settings(e.to_string()))?;

    println!("Discovered from {}:", discovered.path.display());
    println!("  User: {}", discovered.user);
    println!("  Port: {}", discovered.port);
    println!("  rpcconnect: {}", discovered.host);
    println!("  URL: {}", discovered.identity().redacted_url());
    Ok(())
}
