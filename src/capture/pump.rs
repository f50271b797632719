//! Capture pump - splits camera output into frames and publishes them

use crate::capture::source::FrameSource;
use crate::config::CaptureConfig;
use crate::stream::FrameBroadcastHub;
use anyhow::{anyhow, Result};
use robot_shared::{AssemblerError, FrameAssembler};
use tracing::{debug, error, warn};

/// Feed frames from `source` into `hub` until the source fails or ends.
///
/// Only returns with an error: a camera that stops producing is fatal to
/// streaming. The hub is closed on the way out so viewers disconnect.
pub async fn run_capture<S: FrameSource>(
    mut source: S,
    hub: &FrameBroadcastHub,
    config: &CaptureConfig,
) -> Result<()> {
    let result = pump(&mut source, hub, config).await;
    hub.close();

    if let Err(e) = &result {
        error!("[CAPTURE] {} source failed: {:#}", source.name(), e);
    }
    result
}

async fn pump<S: FrameSource>(
    source: &mut S,
    hub: &FrameBroadcastHub,
    config: &CaptureConfig,
) -> Result<()> {
    let mut assembler = FrameAssembler::new(config.max_frame_bytes);
    let mut read_buf = vec![0u8; config.read_chunk_bytes];

    loop {
        let n = source.read_chunk(&mut read_buf).await?;
        if n == 0 {
            return Err(anyhow!("Capture stream ended"));
        }
        assembler.extend(&read_buf[..n]);

        loop {
            match assembler.next_frame() {
                Ok(Some(frame)) => {
                    let size = frame.len();
                    match hub.publish(frame) {
                        Some(generation) => {
                            debug!("[CAPTURE] frame {} ({} bytes)", generation, size)
                        }
                        None => return Err(anyhow!("Frame hub closed")),
                    }
                }
                Ok(None) => break,
                Err(AssemblerError::FrameTooLarge { size, max }) => {
                    warn!("[CAPTURE] Dropped oversized frame: {} bytes (max {})", size, max);
                }
            }
        }
    }
}
