//! PCAP sink writing LINKTYPE_BLUETOOTH_LE_LL_WITH_PHDR records

use byteorder::{LittleEndian, WriteBytesExt};
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::debug;

use super::CaptureSink;
use crate::ble::channel_frequency_hz;

/// 10-byte LE pseudo-header, then access address and link-layer frame
pub const DLT_BLUETOOTH_LE_LL_WITH_PHDR: u32 = 256;

const PCAP_MAGIC: u32 = 0xa1b2c3d4;
const SNAPLEN: u32 = 65535;

/// Pseudo-header size: rf_channel, signal, noise, aa_offenses, ref_aa, flags
const LE_PHDR_LEN: usize = 10;

// BLE LE header flags
const LE_DEWHITENED: u16 = 0x0001;
const LE_CRC_CHECKED: u16 = 0x0400;
const LE_CRC_VALID: u16 = 0x0800;

/// PCAP writer producing one record per validated BLE packet
pub struct PcapWriter<W: Write> {
    writer: W,
    flags: u16,
    records: u64,
    closed: bool,
}

impl PcapWriter<BufWriter<File>> {
    /// Create (or truncate) a pcap file. Named pipes work too.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> PcapWriter<W> {
    /// Wrap a writer and emit the global header
    pub fn new(mut writer: W) -> io::Result<Self> {
        writer.write_u32::<LittleEndian>(PCAP_MAGIC)?; // magic
        writer.write_u16::<LittleEndian>(2)?; // version_major
        writer.write_u16::<LittleEndian>(4)?; // version_minor
        writer.write_i32::<LittleEndian>(0)?; // thiszone
        writer.write_u32::<LittleEndian>(0)?; // sigfigs
        writer.write_u32::<LittleEndian>(SNAPLEN)?; // snaplen
        writer.write_u32::<LittleEndian>(DLT_BLUETOOTH_LE_LL_WITH_PHDR)?; // network
        writer.flush()?;
        Ok(Self {
            writer,
            flags: LE_DEWHITENED | LE_CRC_CHECKED | LE_CRC_VALID,
            records: 0,
            closed: false,
        })
    }

    /// Record which checks the frames went through.
    ///
    /// Every written frame passed the enabled checks, so a checked CRC is
    /// always a valid one.
    pub fn with_checks(mut self, dewhitened: bool, crc_checked: bool) -> Self {
        self.flags = 0;
        if dewhitened {
            self.flags |= LE_DEWHITENED;
        }
        if crc_checked {
            self.flags |= LE_CRC_CHECKED | LE_CRC_VALID;
        }
        self
    }

    /// Write a record for a frame seen on `channel`, stamped with `timestamp`
    pub fn write_at(
        &mut self,
        timestamp: DateTime<Utc>,
        channel: u8,
        access_address: u32,
        frame: &[u8],
    ) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pcap sink is closed"));
        }

        let mhz = channel_frequency_hz(channel).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("no RF channel for BLE channel {}", channel),
            )
        })? / 1_000_000;
        let rf_channel = ((mhz - 2402) / 2) as u8;

        let total_len = (LE_PHDR_LEN + 4 + frame.len()) as u32;

        // PCAP record header
        self.writer.write_u32::<LittleEndian>(timestamp.timestamp() as u32)?;
        self.writer.write_u32::<LittleEndian>(timestamp.timestamp_subsec_micros())?;
        self.writer.write_u32::<LittleEndian>(total_len)?;
        self.writer.write_u32::<LittleEndian>(total_len)?;

        // BLE LE pseudo-header; no power measurements are available
        self.writer.write_u8(rf_channel)?;
        self.writer.write_i8(0)?; // signal
        self.writer.write_i8(0)?; // noise
        self.writer.write_u8(0)?; // aa_offenses
        self.writer.write_u32::<LittleEndian>(0)?; // ref_aa
        self.writer.write_u16::<LittleEndian>(self.flags)?;

        // Packet data
        self.writer.write_u32::<LittleEndian>(access_address)?;
        self.writer.write_all(frame)?;

        // Keep live readers on a FIFO up to date
        self.writer.flush()?;
        self.records += 1;
        Ok(())
    }

    pub fn records(&self) -> u64 {
        self.records
    }
}

impl<W: Write + Send> CaptureSink for PcapWriter<W> {
    fn write(&mut self, channel: u8, access_address: u32, frame: &[u8]) -> io::Result<()> {
        self.write_at(Utc::now(), channel, access_address, frame)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.writer.flush()?;
        debug!("Pcap sink closed after {} records", self.records);
        Ok(())
    }
}
