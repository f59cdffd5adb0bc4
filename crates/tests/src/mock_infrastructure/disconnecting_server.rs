//! A plain TCP server that hangs up on its first connections.
//!
//! Simulates a node whose keep-alive connection was closed underneath the client: the first
//! `drop_first` connections read the request and close without answering, every later
//! connection gets a well-formed JSON-RPC reply.

use std::{
    io,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use serde_json::{json, Value};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

pub struct DisconnectingServer {
    port: u16,
    connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl DisconnectingServer {
    /// Binds to an ephemeral port on 127.0.0.1 and starts serving.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn start(drop_first: usize, result: Value) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
        let port = listener.local_addr().expect("listener address").port();
        let connections = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&connections);
        let body = json!({ "result": result, "error": null, "id": 1 }).to_string();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let seen = counter.fetch_add(1, Ordering::SeqCst);
                let body = body.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle(stream, seen < drop_first, &body).await {
                        tracing::debug!(error = %e, "test connection ended");
                    }
                });
            }
        });

        Self { port, connections, task }
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Connections accepted so far.
    #[must_use]
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for DisconnectingServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle(mut stream: TcpStream, hang_up: bool, body: &str) -> io::Result<()> {
    read_request(&mut stream).await?;
    if hang_up {
        return stream.shutdown().await;
    }

    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\
         connection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

/// Reads one HTTP request: headers plus `content-length` bytes of body.
async fn read_request(stream: &mut TcpStream) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(buf);
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
            let content_length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                return Ok(buf);
            }
        }
    }
}
