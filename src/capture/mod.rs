//! Camera capture
//!
//! A [`FrameSource`] yields raw MJPEG bytes; the pump splits them on
//! start-of-image markers and publishes each frame to the hub.

mod pump;
mod source;

pub use pump::run_capture;
pub use source::ProcessSource;
