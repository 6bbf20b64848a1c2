//! Configuration loaded from environment variables

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::ble::{channel_frequency_hz, MAX_CHANNEL};

/// Fatal configuration problems, reported before capture starts
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no pcap output file configured (set BLE_PCAP_FILE)")]
    MissingOutput,

    #[error("invalid BLE channel '{0}' (expected 0-39)")]
    InvalidChannel(String),

    #[error("channel list is empty")]
    NoChannels,

    #[error("scan window must be a positive number of seconds, got {0}")]
    InvalidScanWindow(f64),
}

/// RF front end and demodulator settings handed to the external pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct RadioSettings {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Simple squelch threshold in dB
    pub squelch_threshold: f32,

    /// Low-pass filter cutoff in Hz
    pub cutoff_freq: f32,

    /// Low-pass filter transition width in Hz
    pub transition_width: f32,

    /// GMSK samples per symbol
    pub gmsk_sps: f32,

    /// GMSK clock recovery gain mu
    pub gmsk_gain_mu: f32,

    /// GMSK clock recovery mu
    pub gmsk_mu: f32,

    /// GMSK clock recovery omega limit
    pub gmsk_omega_limit: f32,
}

impl Default for RadioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 4_000_000,
            squelch_threshold: -70.0,
            cutoff_freq: 850_000.0,
            transition_width: 300_000.0,
            gmsk_sps: 4.0,
            gmsk_gain_mu: 0.7,
            gmsk_mu: 0.5,
            gmsk_omega_limit: 0.035,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Replay demodulated bytes from this file instead of the radio
    pub input_file: Option<PathBuf>,

    /// Pcap output file or named pipe
    pub pcap_file: PathBuf,

    /// Scan once the working buffer grows past this many bytes
    pub min_buffer_size: usize,

    /// Channels to hop across, in order
    pub scan_channels: Vec<u8>,

    /// Dwell time on each channel
    pub scan_window: Duration,

    /// Skip CRC verification
    pub disable_crc: bool,

    /// Skip de-whitening
    pub disable_dewhitening: bool,

    /// External demodulator executable
    pub demod_cmd: PathBuf,

    /// Receive timeout so hop deadlines and shutdown are honoured
    pub poll_interval: Duration,

    /// Replay read size in bytes
    pub read_chunk: usize,

    pub radio: RadioSettings,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| {
            lookup(key)
                .map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(false)
        };

        let pcap_file = lookup("BLE_PCAP_FILE")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingOutput)?;

        let scan_channels =
            parse_channels(&lookup("BLE_CHANNELS").unwrap_or_else(|| "37,38,39".to_string()))?;

        let window_secs: f64 = parsed(&lookup, "BLE_SCAN_WINDOW").unwrap_or(10.24);
        if !window_secs.is_finite() || window_secs <= 0.0 {
            return Err(ConfigError::InvalidScanWindow(window_secs));
        }

        let defaults = RadioSettings::default();

        Ok(Self {
            input_file: lookup("BLE_INPUT_FILE")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),

            pcap_file,

            min_buffer_size: parsed(&lookup, "BLE_MIN_BUFFER_SIZE").unwrap_or(65),

            scan_channels,

            scan_window: Duration::from_secs_f64(window_secs),

            disable_crc: flag("BLE_DISABLE_CRC"),

            disable_dewhitening: flag("BLE_DISABLE_DEWHITENING"),

            demod_cmd: lookup("BLE_DEMOD_CMD")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("ble_demod")),

            poll_interval: Duration::from_millis(parsed(&lookup, "BLE_POLL_INTERVAL_MS").unwrap_or(100)),

            read_chunk: parsed::<usize, _>(&lookup, "BLE_READ_CHUNK").unwrap_or(4096).max(1),

            radio: RadioSettings {
                sample_rate: parsed(&lookup, "BLE_SAMPLE_RATE").unwrap_or(defaults.sample_rate),
                squelch_threshold: parsed(&lookup, "BLE_SQUELCH_THRESHOLD")
                    .unwrap_or(defaults.squelch_threshold),
                cutoff_freq: parsed(&lookup, "BLE_CUTOFF_FREQ").unwrap_or(defaults.cutoff_freq),
                transition_width: parsed(&lookup, "BLE_TRANSITION_WIDTH")
                    .unwrap_or(defaults.transition_width),
                gmsk_sps: parsed(&lookup, "BLE_GMSK_SPS").unwrap_or(defaults.gmsk_sps),
                gmsk_gain_mu: parsed(&lookup, "BLE_GMSK_GAIN_MU").unwrap_or(defaults.gmsk_gain_mu),
                gmsk_mu: parsed(&lookup, "BLE_GMSK_MU").unwrap_or(defaults.gmsk_mu),
                gmsk_omega_limit: parsed(&lookup, "BLE_GMSK_OMEGA_LIMIT")
                    .unwrap_or(defaults.gmsk_omega_limit),
            },
        })
    }

    /// First channel in the scan list (replay captures are decoded on it)
    pub fn initial_channel(&self) -> u8 {
        self.scan_channels.first().copied().unwrap_or(37)
    }

    /// Log the capture settings
    pub fn log_settings(&self) {
        let base_mhz = channel_frequency_hz(self.initial_channel()).unwrap_or(0) / 1_000_000;
        let channels: Vec<String> = self.scan_channels.iter().map(|c| c.to_string()).collect();

        info!("Capture settings:");
        info!("  Base frequency: {} MHz", base_mhz);
        info!("  Sample rate: {} Hz", self.radio.sample_rate);
        info!("  Squelch threshold: {} dB", self.radio.squelch_threshold);
        info!("Low-pass filter:");
        info!("  Cutoff frequency: {} Hz", self.radio.cutoff_freq);
        info!("  Transition width: {} Hz", self.radio.transition_width);
        info!("GMSK demodulation:");
        info!("  Samples per symbol: {}", self.radio.gmsk_sps);
        info!("  Gain mu: {}", self.radio.gmsk_gain_mu);
        info!("  Mu: {}", self.radio.gmsk_mu);
        info!("  Omega limit: {}", self.radio.gmsk_omega_limit);
        info!("Bluetooth LE:");
        info!("  Scanning channels: {}", channels.join(", "));
        info!("  Scanning window: {:.2} s", self.scan_window.as_secs_f64());
        info!("  Disable CRC check: {}", self.disable_crc);
        info!("  Disable de-whitening: {}", self.disable_dewhitening);
        info!("  Minimum buffer size: {} bytes", self.min_buffer_size);
        match &self.input_file {
            Some(path) => info!("  Input file: {}", path.display()),
            None => info!("  Demodulator: {}", self.demod_cmd.display()),
        }
        info!("  Pcap output: {}", self.pcap_file.display());
    }
}

/// Look up and parse a value; missing or malformed values yield `None`
fn parsed<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|s| s.trim().parse().ok())
}

/// Parse a comma separated channel list ("37", "37," and "37,38,39" are all fine)
fn parse_channels(list: &str) -> Result<Vec<u8>, ConfigError> {
    let channels = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match s.parse::<u8>() {
            Ok(ch) if ch <= MAX_CHANNEL => Ok(ch),
            _ => Err(ConfigError::InvalidChannel(s.to_string())),
        })
        .collect::<Result<Vec<u8>, _>>()?;

    if channels.is_empty() {
        return Err(ConfigError::NoChannels);
    }
    Ok(channels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("BLE_PCAP_FILE", "/tmp/ble.pcap")]).unwrap();
        assert_eq!(config.pcap_file, PathBuf::from("/tmp/ble.pcap"));
        assert_eq!(config.scan_channels, vec![37, 38, 39]);
        assert_eq!(config.scan_window, Duration::from_secs_f64(10.24));
        assert_eq!(config.min_buffer_size, 65);
        assert!(!config.disable_crc);
        assert!(!config.disable_dewhitening);
        assert!(config.input_file.is_none());
        assert_eq!(config.radio, RadioSettings::default());
    }

    #[test]
    fn test_missing_output_is_fatal() {
        assert!(matches!(config_from(&[]), Err(ConfigError::MissingOutput)));
        assert!(matches!(
            config_from(&[("BLE_PCAP_FILE", "  ")]),
            Err(ConfigError::MissingOutput)
        ));
    }

    #[test]
    fn test_channel_list_forms() {
        assert_eq!(parse_channels("37").unwrap(), vec![37]);
        assert_eq!(parse_channels("37,").unwrap(), vec![37]);
        assert_eq!(parse_channels(" 0, 12 ,39").unwrap(), vec![0, 12, 39]);
        assert!(matches!(parse_channels("40"), Err(ConfigError::InvalidChannel(_))));
        assert!(matches!(parse_channels("x,37"), Err(ConfigError::InvalidChannel(_))));
        assert!(matches!(parse_channels(","), Err(ConfigError::NoChannels)));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("BLE_PCAP_FILE", "out.pcap"),
            ("BLE_INPUT_FILE", "capture.bin"),
            ("BLE_CHANNELS", "38"),
            ("BLE_SCAN_WINDOW", "2.5"),
            ("BLE_DISABLE_CRC", "1"),
            ("BLE_DISABLE_DEWHITENING", "true"),
            ("BLE_MIN_BUFFER_SIZE", "128"),
            ("BLE_SAMPLE_RATE", "2000000"),
            ("BLE_GMSK_SPS", "2"),
        ])
        .unwrap();

        assert_eq!(config.input_file, Some(PathBuf::from("capture.bin")));
        assert_eq!(config.scan_channels, vec![38]);
        assert_eq!(config.initial_channel(), 38);
        assert_eq!(config.scan_window, Duration::from_millis(2500));
        assert!(config.disable_crc);
        assert!(config.disable_dewhitening);
        assert_eq!(config.min_buffer_size, 128);
        assert_eq!(config.radio.sample_rate, 2_000_000);
        assert_eq!(config.radio.gmsk_sps, 2.0);
    }

    #[test]
    fn test_bad_numbers_fall_back_to_defaults() {
        let config = config_from(&[
            ("BLE_PCAP_FILE", "out.pcap"),
            ("BLE_MIN_BUFFER_SIZE", "lots"),
            ("BLE_POLL_INTERVAL_MS", "-5"),
        ])
        .unwrap();
        assert_eq!(config.min_buffer_size, 65);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_non_positive_scan_window_rejected() {
        assert!(matches!(
            config_from(&[("BLE_PCAP_FILE", "out.pcap"), ("BLE_SCAN_WINDOW", "0")]),
            Err(ConfigError::InvalidScanWindow(_))
        ));
    }
}
