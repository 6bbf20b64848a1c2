//! Capture loop: source -> working buffer -> reconstructor -> sink

use anyhow::{Context, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{ChannelHopper, FrameReconstructor};
use crate::ble::channel_frequency_hz;
use crate::config::Config;
use crate::output::CaptureSink;
use crate::sdr::{ChunkEvent, Source};

const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Why a capture session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Replay file fully consumed
    EndOfInput,
    /// Cancelled by the user
    Interrupted,
    /// The demodulation pipeline stopped producing data
    SourceClosed,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::EndOfInput => write!(f, "end of input"),
            SessionEnd::Interrupted => write!(f, "interrupted"),
            SessionEnd::SourceClosed => write!(f, "source closed"),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    pub bytes_received: u64,
    pub chunks: u64,
    pub packets_written: u64,
    pub retunes: u64,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bytes: {} | Chunks: {} | Written: {} | Retunes: {}",
            self.bytes_received, self.chunks, self.packets_written, self.retunes
        )
    }
}

/// One capture run. Owns the source, the sink and every buffer.
///
/// Teardown happens exactly once, either at the end of `run` or on drop.
pub struct CaptureSession<S: CaptureSink> {
    source: Source,
    sink: S,
    hopper: ChannelHopper,
    reconstructor: FrameReconstructor,
    working: Vec<u8>,
    min_buffer_size: usize,
    poll_interval: Duration,
    read_chunk: usize,
    cancel: Arc<AtomicBool>,
    stats: SessionStats,
    shut_down: bool,
}

impl<S: CaptureSink> CaptureSession<S> {
    pub fn new(config: &Config, source: Source, sink: S, cancel: Arc<AtomicBool>) -> Result<Self> {
        let hopper = if source.is_live() {
            ChannelHopper::new(config.scan_channels.clone(), config.scan_window, Instant::now())?
        } else {
            // Replay is decoded on the channel it was recorded on
            ChannelHopper::pinned(config.initial_channel())
        };

        Ok(Self {
            source,
            sink,
            hopper,
            reconstructor: FrameReconstructor::new(!config.disable_dewhitening, !config.disable_crc),
            working: Vec::with_capacity(config.min_buffer_size * 2),
            min_buffer_size: config.min_buffer_size,
            poll_interval: config.poll_interval,
            read_chunk: config.read_chunk,
            cancel,
            stats: SessionStats::default(),
            shut_down: false,
        })
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn hopper(&self) -> &ChannelHopper {
        &self.hopper
    }

    /// Drive the loop until the input ends, the source closes or the user cancels
    pub fn run(&mut self) -> Result<SessionEnd> {
        let channel = self.hopper.current();
        self.source
            .start(channel)
            .context("Failed to start demodulation pipeline")?;
        log_channel("Capturing on", channel);
        if !self.hopper.is_hopping() {
            info!("Channel hopping disabled, staying on channel {}", channel);
        }

        let mut last_report = Instant::now();

        let end = loop {
            if self.cancel.load(Ordering::SeqCst) {
                info!("Interrupt received, stopping capture");
                break SessionEnd::Interrupted;
            }

            let previous = self.hopper.current();
            if let Some(channel) = self.hopper.poll(Instant::now()) {
                self.retune(previous, channel)?;
            }

            match self.source.next_chunk(self.poll_interval, self.read_chunk)? {
                ChunkEvent::Data(chunk) => {
                    self.stats.chunks += 1;
                    self.stats.bytes_received += chunk.len() as u64;
                    self.working.extend_from_slice(&chunk);

                    if self.working.len() > self.min_buffer_size {
                        self.process_working(self.hopper.current())?;
                    }
                }
                ChunkEvent::Idle => {}
                ChunkEvent::Closed => {
                    self.process_working(self.hopper.current())?;
                    if self.source.is_live() {
                        warn!("Demodulation pipeline closed");
                        break SessionEnd::SourceClosed;
                    }
                    info!("End of input reached");
                    break SessionEnd::EndOfInput;
                }
            }

            if last_report.elapsed() >= STATS_INTERVAL {
                info!("[Capture] {} | {}", self.stats, self.reconstructor.stats);
                last_report = Instant::now();
            }
        };

        self.shutdown()?;
        Ok(end)
    }

    /// Scan the pending bytes received on `previous` before tuning to `channel`
    fn retune(&mut self, previous: u8, channel: u8) -> Result<()> {
        self.process_working(previous)?;
        if let Some(carried) = self.reconstructor.discard_carry() {
            debug!("Dropping {} carried bytes from channel {}", carried.len(), previous);
        }

        debug!("Dwell period {} ended on channel {}", self.hopper.hops(), previous);
        log_channel("Switching to", channel);
        self.source
            .retune(channel)
            .with_context(|| format!("Failed to retune to BLE channel {}", channel))?;
        self.stats.retunes += 1;
        Ok(())
    }

    /// Hand the working buffer to the reconstructor and write what validates
    fn process_working(&mut self, channel: u8) -> Result<()> {
        if self.working.is_empty() {
            return Ok(());
        }

        let buffer = std::mem::take(&mut self.working);
        for outcome in self.reconstructor.scan(buffer, channel) {
            if let Some(packet) = outcome.into_packet() {
                self.sink
                    .write(packet.channel, packet.access_address, &packet.frame)
                    .context("Failed to write packet to capture sink")?;
                self.stats.packets_written += 1;
            }
        }
        Ok(())
    }

    /// Stop the source, then flush and close the sink. Runs once.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;

        self.source.stop();
        // Close even when the flush fails; report the first error
        let flushed = self.sink.flush().context("Failed to flush capture sink");
        let closed = self.sink.close().context("Failed to close capture sink");

        info!("Capture stopped. {} | {}", self.stats, self.reconstructor.stats);
        flushed.and(closed)
    }
}

impl<S: CaptureSink> Drop for CaptureSession<S> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Capture shutdown failed: {:#}", e);
        }
    }
}

fn log_channel(action: &str, channel: u8) {
    let mhz = channel_frequency_hz(channel).unwrap_or(0) / 1_000_000;
    info!("{} BLE channel [ {} ] @ {} MHz", action, channel, mhz);
}
