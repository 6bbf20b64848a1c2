//! Packet capture: frame reconstruction, channel hopping and the capture loop

mod hopper;
mod reconstruct;
mod session;

pub use hopper::ChannelHopper;
pub use reconstruct::FrameReconstructor;
pub use session::{CaptureSession, SessionEnd};
