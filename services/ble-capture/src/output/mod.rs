//! Capture sinks for validated packets

pub mod pcap;

pub use pcap::PcapWriter;

use std::io;

/// Destination for validated link-layer frames
pub trait CaptureSink: Send {
    /// Append one frame seen on `channel`
    fn write(&mut self, channel: u8, access_address: u32, frame: &[u8]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    /// Flush and release the sink. Calling it twice is harmless.
    fn close(&mut self) -> io::Result<()>;
}
