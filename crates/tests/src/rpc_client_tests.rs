//! RPC client behaviour against mock nodes: envelopes, error mapping and stale-connection
//! recovery over real sockets.

use std::sync::Arc;

use serde_json::{json, Value};
use tandem_core::{
    rpc::{
        HttpTransport, RetryingTransport, RpcClient, RpcClientConfig, RpcError, RPC_IN_WARMUP,
        RPC_METHOD_NOT_FOUND,
    },
    types::ConnectionIdentity,
};

use crate::mock_infrastructure::{
    block_hash, DisconnectingServer, RpcMockBuilder, ALICE_BASIC_AUTH,
};

fn client_for(mock: &RpcMockBuilder) -> RpcClient {
    RpcClient::connect(mock.identity("alice", "secret"), &RpcMockBuilder::client_config()).unwrap()
}

/// A port nothing listens on.
async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

fn stale_client(
    port: u16,
    max_retries: u32,
) -> (RpcClient, Arc<RetryingTransport<HttpTransport>>) {
    let http = HttpTransport::new(
        ConnectionIdentity::new("alice", "secret", port),
        RpcMockBuilder::client_config(),
    )
    .unwrap();
    let transport = Arc::new(RetryingTransport::with_max_retries(http, max_retries));
    (RpcClient::with_transport(transport.clone()), transport)
}

#[tokio::test]
async fn test_call_sends_basic_auth_and_returns_result() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_authenticated("getblockcount", &json!(101), ALICE_BASIC_AUTH, 1);

    let client = client_for(&mock);
    assert_eq!(client.get_block_count().await.unwrap(), 101);

    mock.assert_all().await;
}

#[tokio::test]
async fn test_wrong_credentials_do_not_match() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_authenticated("getblockcount", &json!(101), ALICE_BASIC_AUTH, 0);

    let client = RpcClient::connect(
        mock.identity("alice", "wrong"),
        &RpcMockBuilder::client_config(),
    )
    .unwrap();

    // mockito answers unmatched requests with 501
    let err = client.get_block_count().await.unwrap_err();
    assert!(matches!(err, RpcError::HttpError(501, _)), "got {err:?}");
    mock.assert_all().await;
}

#[tokio::test]
async fn test_chain_snapshot_reads_blockchain_info() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_chain(101, &block_hash(101));

    let snapshot = client_for(&mock).chain_snapshot().await.unwrap();

    assert_eq!(snapshot.blocks, 101);
    assert_eq!(snapshot.best_block_hash, block_hash(101));
}

#[tokio::test]
async fn test_null_result_is_success() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_result("setmocktime", &Value::Null);

    let result = client_for(&mock).call("setmocktime", vec![json!(1_600_000_000)]).await;
    assert_eq!(result.unwrap(), Value::Null);
}

#[tokio::test]
async fn test_rpc_error_with_http_500_is_call_failure() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_rpc_error("getblockhash", 500, -8, "Block height out of range");

    let err = client_for(&mock).call("getblockhash", vec![json!(9999)]).await.unwrap_err();

    assert_eq!(
        err,
        RpcError::RpcCallFailed { code: -8, message: "Block height out of range".into() }
    );
    assert!(!err.is_node_starting());
}

#[tokio::test]
async fn test_method_not_found_with_http_404() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_rpc_error("nosuchmethod", 404, RPC_METHOD_NOT_FOUND, "Method not found");

    let err = client_for(&mock).call("nosuchmethod", vec![]).await.unwrap_err();
    assert_eq!(err.rpc_code(), Some(RPC_METHOD_NOT_FOUND));
}

#[tokio::test]
async fn test_warmup_error_counts_as_starting() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_rpc_error("getblockchaininfo", 500, RPC_IN_WARMUP, "Loading block index...");

    let err = client_for(&mock).chain_snapshot().await.unwrap_err();
    assert!(err.is_node_starting());
}

#[tokio::test]
async fn test_unauthorized_status() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_status(401, "");

    let err = client_for(&mock).get_block_count().await.unwrap_err();
    assert_eq!(err, RpcError::Unauthorized(401));
}

#[tokio::test]
async fn test_non_json_error_status_is_http_error() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_status(503, "Service Unavailable");

    let err = client_for(&mock).get_block_count().await.unwrap_err();
    assert_eq!(err, RpcError::HttpError(503, "Service Unavailable".into()));
}

#[tokio::test]
async fn test_malformed_success_body_is_invalid_response() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_status(200, "{ not json");

    let err = client_for(&mock).get_block_count().await.unwrap_err();
    assert!(matches!(err, RpcError::InvalidResponse(_)), "got {err:?}");
}

#[tokio::test]
async fn test_result_type_mismatch_is_invalid_response() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_result("getblockcount", &json!("not a number"));

    let err = client_for(&mock).get_block_count().await.unwrap_err();
    assert!(matches!(err, RpcError::InvalidResponse(ref m) if m.starts_with("getblockcount")));
}

#[tokio::test]
async fn test_refused_connection_is_not_stale() {
    let port = closed_port().await;
    let (client, transport) = stale_client(port, 2);

    let err = client.get_block_count().await.unwrap_err();

    assert!(matches!(err, RpcError::ConnectionFailed(_)), "got {err:?}");
    assert!(err.is_node_starting());
    assert_eq!(transport.inner().reconnect_count(), 0);
}

#[tokio::test]
async fn test_stale_connection_is_rebuilt_and_request_resent() {
    let server = DisconnectingServer::start(1, json!(42)).await;
    let (client, transport) = stale_client(server.port(), 2);

    assert_eq!(client.get_block_count().await.unwrap(), 42);

    assert_eq!(transport.inner().reconnect_count(), 1);
    assert_eq!(server.connections(), 2);
}

#[tokio::test]
async fn test_recovers_from_two_consecutive_hangups() {
    let server = DisconnectingServer::start(2, json!(7)).await;
    let (client, transport) = stale_client(server.port(), 2);

    assert_eq!(client.get_block_count().await.unwrap(), 7);
    assert_eq!(transport.inner().reconnect_count(), 2);
}

#[tokio::test]
async fn test_stale_error_surfaces_after_retry_budget() {
    let server = DisconnectingServer::start(10, json!(7)).await;
    let (client, transport) = stale_client(server.port(), 2);

    let err = client.get_block_count().await.unwrap_err();

    assert!(err.is_stale(), "got {err:?}");
    assert_eq!(transport.inner().reconnect_count(), 2);
    assert_eq!(server.connections(), 3);
}

#[tokio::test]
async fn test_zero_retries_surfaces_first_hangup() {
    let server = DisconnectingServer::start(1, json!(7)).await;
    let (client, transport) = stale_client(server.port(), 0);

    assert!(client.get_block_count().await.unwrap_err().is_stale());
    assert_eq!(transport.inner().reconnect_count(), 0);
}

#[tokio::test]
async fn test_connect_uses_configured_retry_budget() {
    let server = DisconnectingServer::start(1, json!(3)).await;
    let config = RpcClientConfig { max_stale_retries: 1, ..RpcMockBuilder::client_config() };

    let client =
        RpcClient::connect(ConnectionIdentity::new("alice", "secret", server.port()), &config)
            .unwrap();

    assert_eq!(client.get_block_count().await.unwrap(), 3);
    assert_eq!(server.connections(), 2);
}

#[tokio::test]
async fn test_endpoint_masks_password() {
    let mock = RpcMockBuilder::new().await;
    let endpoint = client_for(&mock).endpoint();

    assert!(endpoint.contains("alice:***@127.0.0.1"));
    assert!(!endpoint.contains("secret"));
}
