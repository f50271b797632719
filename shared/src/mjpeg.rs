//! MJPEG framing
//!
//! Camera output arrives as an unframed byte stream of back-to-back JPEG
//! images. A frame is everything from one start-of-image marker up to the
//! next one:
//! ```text
//! [ FF D8 ... frame N ... ][ FF D8 ... frame N+1 ... ][ FF D8 ...
//! ```
//! Viewers receive each frame as one part of a `multipart/x-mixed-replace`
//! response:
//! ```text
//! --<boundary>\r\n
//! Content-Type: image/jpeg\r\n
//! Content-Length: <n>\r\n
//! \r\n
//! <n bytes of JPEG>\r\n
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::limits::JPEG_SOI;

/// Default maximum frame size (4 MB) to bound memory on a corrupt stream
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Default multipart boundary token
pub const DEFAULT_BOUNDARY: &str = "FRAME";

/// Bytes written after every part's payload
pub const PART_TRAILER: &[u8] = b"\r\n";

/// Errors that can occur while splitting the capture stream
#[derive(Error, Debug, PartialEq)]
pub enum AssemblerError {
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },
}

/// Splits a raw MJPEG byte stream into whole frames
#[derive(Debug)]
pub struct FrameAssembler {
    /// Bytes of the frame being accumulated, starting at its SOI marker
    buffer: BytesMut,
    /// Offset where the next marker search resumes
    scan_from: usize,
    max_frame_size: usize,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl FrameAssembler {
    /// Create an assembler that rejects frames larger than `max_frame_size`
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            scan_from: 0,
            max_frame_size,
        }
    }

    /// Add captured bytes
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to cut the next complete frame from the buffer
    ///
    /// Returns:
    /// - `Ok(Some(frame))` when a following SOI marker closed a frame
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` if the pending frame outgrew the size limit; the pending
    ///   bytes are discarded so the stream can resynchronise
    ///
    /// Call this repeatedly until it returns `Ok(None)` to drain all frames.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, AssemblerError> {
        if !self.buffer.starts_with(&JPEG_SOI) {
            self.skip_to_first_marker();
            if !self.buffer.starts_with(&JPEG_SOI) {
                return Ok(None);
            }
        }

        // The frame's own marker occupies bytes 0..2
        let start = self.scan_from.max(2);
        if let Some(offset) = find_marker(&self.buffer[start..]) {
            let size = start + offset;
            let frame = self.buffer.split_to(size).freeze();
            self.scan_from = 0;
            if size > self.max_frame_size {
                return Err(AssemblerError::FrameTooLarge {
                    size,
                    max: self.max_frame_size,
                });
            }
            return Ok(Some(frame));
        }

        if self.buffer.len() > self.max_frame_size {
            let size = self.buffer.len();
            self.buffer.clear();
            self.scan_from = 0;
            return Err(AssemblerError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }

        // A marker may straddle the next chunk; rescan the last byte
        self.scan_from = self.buffer.len().saturating_sub(1).max(2);
        Ok(None)
    }

    /// Get the number of buffered bytes (for debugging)
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop anything preceding the first SOI marker
    fn skip_to_first_marker(&mut self) {
        match find_marker(&self.buffer) {
            Some(0) => {}
            Some(offset) => {
                let _ = self.buffer.split_to(offset);
            }
            None => {
                // Keep a trailing 0xFF, it may be the first half of a marker
                let keep = usize::from(self.buffer.last() == Some(&JPEG_SOI[0]));
                let drop = self.buffer.len() - keep;
                let _ = self.buffer.split_to(drop);
            }
        }
        self.scan_from = 0;
    }
}

fn find_marker(haystack: &[u8]) -> Option<usize> {
    haystack.windows(JPEG_SOI.len()).position(|w| w == JPEG_SOI)
}

/// Headers that open each multipart part
pub fn part_header(boundary: &str, content_length: usize) -> Bytes {
    let header = format!(
        "--{boundary}\r\nContent-Type: image/jpeg\r\nContent-Length: {content_length}\r\n\r\n"
    );
    Bytes::from(header)
}

/// A complete multipart part: header, payload and trailer
pub fn encode_part(boundary: &str, payload: &[u8]) -> Bytes {
    let header = part_header(boundary, payload.len());
    let mut buf = BytesMut::with_capacity(header.len() + payload.len() + PART_TRAILER.len());
    buf.put_slice(&header);
    buf.put_slice(payload);
    buf.put_slice(PART_TRAILER);
    buf.freeze()
}

/// `Content-Type` value announcing the multipart stream
pub fn stream_content_type(boundary: &str) -> String {
    format!("multipart/x-mixed-replace; boundary={boundary}")
}
