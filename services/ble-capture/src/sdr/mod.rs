//! Byte sources feeding the capture loop
//!
//! Demodulated bytes come either from the live SDR pipeline (an external
//! demodulator process tuned to one BLE channel) or from a file recorded
//! earlier.

mod file;
pub mod pipeline;

pub use file::FileReplay;
pub use pipeline::{ChunkEvent, DemodulationPipeline, ProcessPipeline};

use anyhow::Result;
use std::time::Duration;
use tracing::debug;

/// Where demodulated bytes come from
pub enum Source {
    LiveRadio(Box<dyn DemodulationPipeline>),
    FileReplay(FileReplay),
}

impl Source {
    /// Live sources hop channels; replay is pinned
    pub fn is_live(&self) -> bool {
        matches!(self, Source::LiveRadio(_))
    }

    pub fn start(&mut self, channel: u8) -> Result<()> {
        match self {
            Source::LiveRadio(pipeline) => {
                pipeline.set_channel(channel)?;
                pipeline.start()
            }
            Source::FileReplay(_) => Ok(()),
        }
    }

    /// Retune the radio; a no-op for replay
    pub fn retune(&mut self, channel: u8) -> Result<()> {
        match self {
            Source::LiveRadio(pipeline) => pipeline.set_channel(channel),
            Source::FileReplay(_) => Ok(()),
        }
    }

    /// Poll for the next chunk.
    ///
    /// Live sources wait at most `timeout`; replay reads at most `max_bytes`
    /// and reports `Closed` at end of file.
    pub fn next_chunk(&mut self, timeout: Duration, max_bytes: usize) -> Result<ChunkEvent> {
        match self {
            Source::LiveRadio(pipeline) => Ok(pipeline.next_chunk(timeout)),
            Source::FileReplay(replay) => {
                let chunk = replay.read_chunk(max_bytes)?;
                if chunk.is_empty() {
                    debug!("Replay finished after {} bytes", replay.bytes_read());
                    Ok(ChunkEvent::Closed)
                } else {
                    Ok(ChunkEvent::Data(chunk))
                }
            }
        }
    }

    /// Stop the pipeline and wait for it to wind down
    pub fn stop(&mut self) {
        if let Source::LiveRadio(pipeline) = self {
            pipeline.stop();
            pipeline.wait();
        }
    }
}
