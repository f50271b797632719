//! Frame source abstraction for pluggable camera backends

use crate::config::CaptureConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::info;

/// Producer of a raw MJPEG byte stream
#[async_trait]
pub trait FrameSource: Send {
    /// Read the next chunk of camera output into `buf`; `Ok(0)` means the
    /// stream has ended
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Human-readable name for this source
    fn name(&self) -> &'static str;
}

/// Camera program writing MJPEG to its stdout
pub struct ProcessSource {
    // Held so the program is killed when the source is dropped
    _child: Child,
    stdout: ChildStdout,
}

impl ProcessSource {
    /// Start the configured camera program
    pub fn spawn(config: &CaptureConfig) -> Result<Self> {
        let mut child = Command::new(&config.command)
            .args(&config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start camera program {:?}", config.command))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("Camera program has no stdout"))?;

        info!(
            "[CAPTURE] Started {} (pid {})",
            config.command,
            child.id().unwrap_or_default()
        );
        Ok(Self {
            _child: child,
            stdout,
        })
    }
}

#[async_trait]
impl FrameSource for ProcessSource {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.stdout.read(buf).await?)
    }

    fn name(&self) -> &'static str {
        "process"
    }
}
