//! Health & metrics endpoints
//!
//! - GET /health - Simple health check
//! - GET /metrics - Prometheus metrics

use eyre::Result;
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use crate::metrics;

/// Start the health/metrics server.
pub async fn start_api_server(addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server started");

    metrics::UP.set(1.0);

    loop {
        let (mut socket, _) = listener.accept().await?;

        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            if socket.readable().await.is_ok() {
                let _ = socket.try_read(&mut buf);
            }

            let request = String::from_utf8_lossy(&buf);

            if request.contains("GET /metrics") {
                let encoder = TextEncoder::new();
                let metric_families = prometheus::gather();
                let mut buffer = Vec::new();
                let _ = encoder.encode(&metric_families, &mut buffer);

                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\n\r\n",
                    buffer.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.write_all(&buffer).await;
            } else if request.contains("GET /health") {
                let response =
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\nOK";
                let _ = socket.write_all(response.as_bytes()).await;
            } else {
                let response = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n";
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
    }
}
