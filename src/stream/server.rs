//! MJPEG viewer server
//!
//! Accepts viewer connections, checks the request line and hands matching
//! requests to a [`StreamingConnectionHandler`]. One task per viewer.

use crate::config::StreamConfig;
use crate::stream::connection::{CloseReason, StreamingConnectionHandler};
use crate::stream::hub::FrameBroadcastHub;
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Longest accepted request head
const MAX_REQUEST_HEAD: usize = 8 * 1024;

/// Time a client gets to send its request head
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Accept viewers until `shutdown` turns true
pub async fn serve(
    listener: TcpListener,
    hub: Arc<FrameBroadcastHub>,
    config: Arc<StreamConfig>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    info!("Streaming server listening on {}", listener.local_addr()?);

    loop {
        let (socket, addr) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = shutdown.wait_for(|stop| *stop) => break,
        };

        let hub = hub.clone();
        let config = config.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            handle_viewer(socket, addr, hub, config, shutdown).await;
        });
    }

    info!("Streaming server stopped");
    Ok(())
}

async fn handle_viewer(
    socket: TcpStream,
    addr: SocketAddr,
    hub: Arc<FrameBroadcastHub>,
    config: Arc<StreamConfig>,
    shutdown: watch::Receiver<bool>,
) {
    let _ = socket.set_nodelay(true);
    let (reader, mut writer) = tokio::io::split(socket);

    let request = match timeout(REQUEST_TIMEOUT, read_request_line(reader)).await {
        Ok(Ok(Some(request))) => request,
        Ok(Ok(None)) => return,
        Ok(Err(e)) => {
            debug!("Bad request from {}: {}", addr, e);
            let _ = reject(&mut writer, "400 Bad Request").await;
            return;
        }
        Err(_) => {
            debug!("Request head from {} timed out", addr);
            return;
        }
    };

    if request.method != "GET" {
        let _ = reject(&mut writer, "405 Method Not Allowed").await;
        return;
    }
    if request.path() != config.path {
        let _ = reject(&mut writer, "404 Not Found").await;
        return;
    }

    info!("Streaming client connected: {} ({} viewers)", addr, hub.subscriber_count() + 1);
    let handler = StreamingConnectionHandler::new(
        writer,
        hub.subscribe(),
        config.boundary.clone(),
        config.write_timeout(),
        addr.to_string(),
    );

    match handler.run(shutdown).await {
        CloseReason::WriteFailed(e) => debug!("Streaming client {} write error kind {:?}", addr, e.kind()),
        CloseReason::WriteTimedOut => {}
        CloseReason::HubClosed => info!("Streaming client {} closed: capture stopped", addr),
        CloseReason::Shutdown => debug!("Streaming client {} closed for shutdown", addr),
    }
}

/// Method and target of an HTTP request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    pub target: String,
}

impl RequestLine {
    /// Target without its query string
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or_default()
    }
}

/// Read the request line and skip the remaining headers.
///
/// Returns `Ok(None)` if the client hung up before sending anything.
pub async fn read_request_line<R: AsyncRead + Unpin>(
    reader: R,
) -> std::io::Result<Option<RequestLine>> {
    let mut reader = BufReader::new(reader).take(MAX_REQUEST_HEAD as u64);
    let mut line = String::new();

    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }

    let mut parts = line.split_whitespace();
    let (method, target) = match (parts.next(), parts.next()) {
        (Some(method), Some(target)) => (method.to_string(), target.to_string()),
        _ => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("malformed request line {:?}", line.trim_end()),
            ))
        }
    };

    loop {
        let mut header = String::new();
        let n = reader.read_line(&mut header).await?;
        if n == 0 {
            if reader.limit() == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "request head too large",
                ));
            }
            break;
        }
        if header == "\r\n" || header == "\n" {
            break;
        }
    }

    Ok(Some(RequestLine { method, target }))
}

async fn reject<W: AsyncWrite + Unpin>(writer: &mut W, status: &str) -> std::io::Result<()> {
    warn!("Rejecting stream request: {}", status);
    let response = format!(
        "HTTP/1.0 {status}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{status}",
        status.len()
    );
    writer.write_all(response.as_bytes()).await?;
    writer.shutdown().await
}
