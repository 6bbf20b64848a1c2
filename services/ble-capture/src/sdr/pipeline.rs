//! Demodulation pipeline driven through an external process
//!
//! The demodulator (filtering, squelch and GMSK demodulation) runs as a child
//! process tuned to one BLE channel and writes demodulated bytes to stdout.
//! A reader thread forwards stdout chunks over a bounded channel so the
//! capture loop can poll with a timeout. Retuning restarts the process.

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::io::{BufRead, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::ble::channel_frequency_hz;
use crate::config::{Config, RadioSettings};

/// Bytes requested from the demodulator's stdout per read
const READ_SIZE: usize = 4096;

/// Chunks buffered between the reader thread and the capture loop
const CHANNEL_DEPTH: usize = 256;

/// What a poll of a byte source produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkEvent {
    Data(Vec<u8>),
    /// Nothing arrived within the timeout
    Idle,
    /// The source has no more data
    Closed,
}

/// Contract of the SDR demodulation pipeline
pub trait DemodulationPipeline: Send {
    fn start(&mut self) -> Result<()>;

    fn stop(&mut self);

    /// Block until the pipeline has fully stopped
    fn wait(&mut self);

    fn set_channel(&mut self, channel: u8) -> Result<()>;

    /// Tuned frequency in Hz
    fn current_frequency(&self) -> u64;

    /// Next chunk of demodulated bytes, waiting at most `timeout`
    fn next_chunk(&mut self, timeout: Duration) -> ChunkEvent;
}

/// Pipeline backed by an external demodulator process
pub struct ProcessPipeline {
    demod_cmd: PathBuf,
    radio: RadioSettings,
    channel: u8,
    frequency: u64,
    running: Arc<AtomicBool>,
    bytes_received: Arc<AtomicU64>,
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
    chunk_rx: Option<Receiver<Vec<u8>>>,
}

impl ProcessPipeline {
    pub fn new(config: &Config) -> Self {
        let channel = config.initial_channel();
        Self {
            demod_cmd: config.demod_cmd.clone(),
            radio: config.radio.clone(),
            channel,
            frequency: channel_frequency_hz(channel).unwrap_or(0),
            running: Arc::new(AtomicBool::new(false)),
            bytes_received: Arc::new(AtomicU64::new(0)),
            child: None,
            reader: None,
            chunk_rx: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Demodulator command line for the current frequency
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.demod_cmd);
        cmd.arg("--freq").arg(self.frequency.to_string())
           .arg("--sample-rate").arg(self.radio.sample_rate.to_string())
           .arg("--squelch").arg(self.radio.squelch_threshold.to_string())
           .arg("--cutoff").arg(self.radio.cutoff_freq.to_string())
           .arg("--transition-width").arg(self.radio.transition_width.to_string())
           .arg("--sps").arg(self.radio.gmsk_sps.to_string())
           .arg("--gain-mu").arg(self.radio.gmsk_gain_mu.to_string())
           .arg("--mu").arg(self.radio.gmsk_mu.to_string())
           .arg("--omega-limit").arg(self.radio.gmsk_omega_limit.to_string());

        cmd.stdin(Stdio::null())
           .stdout(Stdio::piped())
           .stderr(Stdio::piped());
        cmd
    }
}

impl DemodulationPipeline for ProcessPipeline {
    fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let mut cmd = self.command();
        debug!("Executing: {:?}", cmd);

        let mut child = cmd.spawn().with_context(|| {
            format!(
                "Failed to spawn demodulator {}. Make sure it is installed and in PATH",
                self.demod_cmd.display()
            )
        })?;

        let stdout = child
            .stdout
            .take()
            .context("Failed to capture demodulator stdout")?;

        // Spawn stderr reader for logging
        if let Some(stderr) = child.stderr.take() {
            thread::spawn(move || {
                let reader = std::io::BufReader::new(stderr);
                for line in reader.lines().map_while(|line| line.ok()) {
                    if !line.trim().is_empty() {
                        info!("[demod] {}", line.trim());
                    }
                }
            });
        }

        let (chunk_tx, chunk_rx) = bounded::<Vec<u8>>(CHANNEL_DEPTH);
        let running = self.running.clone();
        let bytes_received = self.bytes_received.clone();

        running.store(true, Ordering::SeqCst);

        let reader = thread::Builder::new()
            .name("ble-demod-reader".to_string())
            .spawn(move || read_stdout(stdout, running, bytes_received, chunk_tx))
            .context("Failed to spawn demodulator reader thread")?;

        info!(
            "Demodulator started on channel {} @ {} MHz (pid {})",
            self.channel,
            self.frequency / 1_000_000,
            child.id()
        );

        self.child = Some(child);
        self.reader = Some(reader);
        self.chunk_rx = Some(chunk_rx);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(child) = self.child.as_mut() {
            if let Err(e) = child.kill() {
                debug!("Demodulator already exited: {}", e);
            }
        }
    }

    fn wait(&mut self) {
        // Closing the receiver unblocks a reader stuck on a full channel
        self.chunk_rx = None;

        if let Some(mut child) = self.child.take() {
            match child.wait() {
                Ok(status) => debug!("Demodulator exited: {}", status),
                Err(e) => warn!("Failed to reap demodulator: {}", e),
            }
        }
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                error!("Demodulator reader thread panicked");
            }
            debug!("Demodulator reader stopped ({} bytes total)", self.bytes_received());
        }
    }

    fn set_channel(&mut self, channel: u8) -> Result<()> {
        let frequency = channel_frequency_hz(channel)
            .with_context(|| format!("No frequency for BLE channel {}", channel))?;

        self.channel = channel;
        self.frequency = frequency;

        if self.child.is_some() {
            self.stop();
            self.wait();
            self.start()?;
        }
        Ok(())
    }

    fn current_frequency(&self) -> u64 {
        self.frequency
    }

    fn next_chunk(&mut self, timeout: Duration) -> ChunkEvent {
        let Some(rx) = self.chunk_rx.as_ref() else {
            return ChunkEvent::Closed;
        };

        match rx.recv_timeout(timeout) {
            Ok(chunk) => ChunkEvent::Data(chunk),
            Err(RecvTimeoutError::Timeout) => ChunkEvent::Idle,
            Err(RecvTimeoutError::Disconnected) => ChunkEvent::Closed,
        }
    }
}

impl Drop for ProcessPipeline {
    fn drop(&mut self) {
        self.stop();
        self.wait();
    }
}

/// Reader loop (runs in dedicated thread)
fn read_stdout<R: Read>(
    mut stdout: R,
    running: Arc<AtomicBool>,
    bytes_received: Arc<AtomicU64>,
    chunk_tx: Sender<Vec<u8>>,
) {
    let mut buffer = vec![0u8; READ_SIZE];
    let mut first_data = true;

    while running.load(Ordering::SeqCst) {
        match stdout.read(&mut buffer) {
            Ok(0) => {
                if running.load(Ordering::SeqCst) {
                    warn!("Demodulator stdout closed (EOF)");
                }
                break;
            }
            Ok(n_read) => {
                if first_data {
                    info!("First demodulated data received ({} bytes)", n_read);
                    first_data = false;
                }
                bytes_received.fetch_add(n_read as u64, Ordering::Relaxed);

                if chunk_tx.send(buffer[..n_read].to_vec()).is_err() {
                    break; // receiver dropped
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!("Error reading from demodulator: {}", e);
                break;
            }
        }
    }

    running.store(false, Ordering::SeqCst);
}
