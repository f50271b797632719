//! Video streaming
//!
//! This module handles:
//! - Holding the latest captured frame (`FrameBroadcastHub`)
//! - Streaming frames to each viewer (`StreamingConnectionHandler`)
//! - Accepting viewer connections on the MJPEG endpoint

mod connection;
mod hub;
mod server;

pub use hub::FrameBroadcastHub;
pub use server::serve;
