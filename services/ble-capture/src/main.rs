//! BLE Capture - passive Bluetooth LE link-layer sniffer
//!
//! Reads demodulated bytes from an external SDR demodulator (or a recorded
//! file), reconstructs link-layer frames, and writes validated packets to a
//! pcap file or named pipe for Wireshark.

mod ble;
mod capture;
mod config;
mod output;
mod sdr;

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use capture::{CaptureSession, SessionEnd};
use config::Config;
use output::PcapWriter;
use sdr::{FileReplay, ProcessPipeline, Source};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("===========================================");
    info!("   BLE Capture - Bluetooth LE sniffer");
    info!("   link-layer frames to pcap");
    info!("===========================================");

    // Load configuration
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    config.log_settings();

    // Ctrl+C only raises the flag; the capture loop tears down on its own
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => cancel_signal.store(true, Ordering::SeqCst),
            Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    info!("===========================================");
    info!("  Starting capture...");
    info!("  Press Ctrl+C to stop.");
    info!("===========================================");

    let end = tokio::task::spawn_blocking(move || run_capture(&config, cancel))
        .await
        .context("Capture task panicked")??;

    info!("Shutdown complete ({})", end);
    Ok(())
}

/// Open the source and the sink, then run the capture loop to completion
fn run_capture(config: &Config, cancel: Arc<AtomicBool>) -> Result<SessionEnd> {
    let source = match &config.input_file {
        Some(path) => Source::FileReplay(FileReplay::open(path)?),
        None => Source::LiveRadio(Box::new(ProcessPipeline::new(config))),
    };

    let sink = PcapWriter::create(&config.pcap_file)
        .with_context(|| format!("Failed to create pcap output {}", config.pcap_file.display()))?
        .with_checks(!config.disable_dewhitening, !config.disable_crc);

    let mut session = CaptureSession::new(config, source, sink, cancel)?;
    session.run()
}
