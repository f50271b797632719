//! Per-viewer MJPEG streaming
//!
//! Each viewer cycles `AwaitFrame -> SendChunk -> AwaitFrame ...` until a
//! write fails, a write stalls past the timeout, the hub closes or the
//! server shuts down. Whatever ends the loop only affects this viewer.

use crate::stream::hub::Subscriber;
use bytes::Bytes;
use robot_shared::mjpeg::{self, PART_TRAILER};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Why a viewer connection ended
#[derive(Debug)]
pub enum CloseReason {
    /// The peer went away or the socket errored
    WriteFailed(io::Error),
    /// A single part could not be written within the write timeout
    WriteTimedOut,
    /// The capture side stopped
    HubClosed,
    /// The server is shutting down
    Shutdown,
}

/// Streams frames from the hub to one viewer
pub struct StreamingConnectionHandler<W> {
    writer: W,
    subscriber: Subscriber,
    boundary: String,
    write_timeout: Duration,
    peer: String,
    frames_sent: u64,
}

impl<W: AsyncWrite + Unpin> StreamingConnectionHandler<W> {
    pub fn new(
        writer: W,
        subscriber: Subscriber,
        boundary: impl Into<String>,
        write_timeout: Duration,
        peer: impl Into<String>,
    ) -> Self {
        Self {
            writer,
            subscriber,
            boundary: boundary.into(),
            write_timeout,
            peer: peer.into(),
            frames_sent: 0,
        }
    }

    /// Run until the connection closes. Consumes the handler so the
    /// subscriber slot is released on return.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> CloseReason {
        let head = Bytes::from(response_head(&self.boundary));
        if let Err(reason) = self.send(&[head]).await {
            return reason;
        }

        loop {
            let frame = tokio::select! {
                frame = self.subscriber.next_frame() => match frame {
                    Ok(frame) => frame,
                    Err(_) => return CloseReason::HubClosed,
                },
                _ = shutdown.wait_for(|stop| *stop) => return CloseReason::Shutdown,
            };

            let header = mjpeg::part_header(&self.boundary, frame.payload.len());
            let part = [header, frame.payload, Bytes::from_static(PART_TRAILER)];
            if let Err(reason) = self.send(&part).await {
                debug!(
                    "Viewer {} closed after {} frames (last generation {})",
                    self.peer,
                    self.frames_sent,
                    self.subscriber.last_seen()
                );
                return reason;
            }
            self.frames_sent += 1;
        }
    }

    /// Write buffers in order and flush, bounded by the write timeout
    async fn send(&mut self, bufs: &[Bytes]) -> Result<(), CloseReason> {
        let writer = &mut self.writer;
        let write = async {
            for buf in bufs {
                writer.write_all(buf).await?;
            }
            writer.flush().await
        };

        match timeout(self.write_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                warn!("Removed streaming client {}: {}", self.peer, e);
                Err(CloseReason::WriteFailed(e))
            }
            Err(_) => {
                warn!(
                    "Removed streaming client {}: write stalled for {:?}",
                    self.peer, self.write_timeout
                );
                Err(CloseReason::WriteTimedOut)
            }
        }
    }
}

/// Status line and headers opening the multipart stream
pub fn response_head(boundary: &str) -> String {
    format!(
        "HTTP/1.0 200 OK\r\n\
         Age: 0\r\n\
         Cache-Control: no-cache, private\r\n\
         Pragma: no-cache\r\n\
         Content-Type: {}\r\n\
         \r\n",
        mjpeg::stream_content_type(boundary)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::hub::FrameBroadcastHub;
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;

    const WAIT: Duration = Duration::from_millis(500);

    async fn read_exactly(reader: &mut (impl tokio::io::AsyncRead + Unpin), n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        timeout(WAIT, reader.read_exact(&mut buf))
            .await
            .expect("read timed out")
            .expect("read failed");
        buf
    }

    #[tokio::test]
    async fn test_sends_head_then_parts() {
        let hub = Arc::new(FrameBroadcastHub::new());
        let (client, mut viewer) = tokio::io::duplex(64 * 1024);
        let (_stop_tx, stop_rx) = watch::channel(false);

        let handler = StreamingConnectionHandler::new(
            client,
            hub.subscribe(),
            "FRAME",
            Duration::from_secs(1),
            "test",
        );
        let task = tokio::spawn(handler.run(stop_rx));

        let head = response_head("FRAME");
        let received = read_exactly(&mut viewer, head.len()).await;
        assert_eq!(received, head.as_bytes());
        assert!(head.contains("multipart/x-mixed-replace; boundary=FRAME"));

        hub.publish(Bytes::from_static(b"\xFF\xD8jpeg"));
        let expected = mjpeg::encode_part("FRAME", b"\xFF\xD8jpeg");
        let received = read_exactly(&mut viewer, expected.len()).await;
        assert_eq!(&received[..], &expected[..]);

        hub.close();
        let reason = timeout(WAIT, task).await.unwrap().unwrap();
        assert!(matches!(reason, CloseReason::HubClosed));
    }

    #[tokio::test]
    async fn test_write_failure_drops_only_that_viewer() {
        let hub = Arc::new(FrameBroadcastHub::new());
        let (_stop_tx, stop_rx) = watch::channel(false);

        let (broken, gone) = tokio::io::duplex(1024);
        drop(gone);
        let (healthy, mut viewer) = tokio::io::duplex(64 * 1024);

        let failing = tokio::spawn(
            StreamingConnectionHandler::new(
                broken,
                hub.subscribe(),
                "FRAME",
                Duration::from_secs(1),
                "broken",
            )
            .run(stop_rx.clone()),
        );
        let working = tokio::spawn(
            StreamingConnectionHandler::new(
                healthy,
                hub.subscribe(),
                "FRAME",
                Duration::from_secs(1),
                "healthy",
            )
            .run(stop_rx),
        );

        let reason = timeout(WAIT, failing).await.unwrap().unwrap();
        assert!(matches!(reason, CloseReason::WriteFailed(_)));
        assert_eq!(hub.subscriber_count(), 1);

        let head_len = response_head("FRAME").len();
        read_exactly(&mut viewer, head_len).await;
        hub.publish(Bytes::from_static(b"still streaming"));
        let expected = mjpeg::encode_part("FRAME", b"still streaming");
        assert_eq!(read_exactly(&mut viewer, expected.len()).await, &expected[..]);

        hub.close();
        timeout(WAIT, working).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stalled_viewer_times_out() {
        let hub = Arc::new(FrameBroadcastHub::new());
        let (_stop_tx, stop_rx) = watch::channel(false);
        // Tiny pipe that nobody drains
        let (client, _viewer) = tokio::io::duplex(16);

        hub.publish(Bytes::from(vec![0xAB; 4096]));
        let handler = StreamingConnectionHandler::new(
            client,
            hub.subscribe(),
            "FRAME",
            Duration::from_millis(50),
            "stalled",
        );

        let reason = timeout(WAIT, handler.run(stop_rx)).await.unwrap();
        assert!(matches!(reason, CloseReason::WriteTimedOut));
    }

    #[tokio::test]
    async fn test_shutdown_signal_ends_stream() {
        let hub = Arc::new(FrameBroadcastHub::new());
        let (stop_tx, stop_rx) = watch::channel(false);
        let (client, mut viewer) = tokio::io::duplex(64 * 1024);

        let task = tokio::spawn(
            StreamingConnectionHandler::new(
                client,
                hub.subscribe(),
                "FRAME",
                Duration::from_secs(1),
                "test",
            )
            .run(stop_rx),
        );
        read_exactly(&mut viewer, response_head("FRAME").len()).await;

        stop_tx.send_replace(true);
        let reason = timeout(WAIT, task).await.unwrap().unwrap();
        assert!(matches!(reason, CloseReason::Shutdown));
        assert_eq!(hub.subscriber_count(), 0);
    }
}
