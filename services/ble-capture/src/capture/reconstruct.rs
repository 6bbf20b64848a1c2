//! BLE frame reconstruction from demodulated byte buffers
//!
//! Frame layout on the 1M PHY (bytes, LSB-first bit order already packed):
//! - Preamble: 1 byte (0xAA)
//! - Access address: 4 bytes, little-endian, never whitened
//! - PDU header: 2 bytes, whitened
//! - Payload: 0-63 bytes (advertising) or 0-31 bytes (data), whitened
//! - CRC: 3 bytes, whitened
//!
//! Every preamble byte in the buffer starts an independent candidate.
//! A candidate cut off by the end of the buffer is carried into the next scan.

use std::fmt;
use tracing::{debug, trace};

use crate::ble::{
    self, crc, whitening, Rejection, ValidatedPacket, ACCESS_ADDRESS_LEN, CRC_LEN,
    PDU_HEADER_LEN, PREAMBLE, PREAMBLE_LEN,
};

/// Result of evaluating one preamble match
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateOutcome {
    Validated(ValidatedPacket),
    Rejected { position: usize, reason: Rejection },
}

impl CandidateOutcome {
    pub fn into_packet(self) -> Option<ValidatedPacket> {
        match self {
            CandidateOutcome::Validated(packet) => Some(packet),
            CandidateOutcome::Rejected { .. } => None,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ReconstructorStats {
    pub scans: u64,
    pub bytes_scanned: u64,
    pub preambles: u64,
    pub validated: u64,
    pub insufficient_data: u64,
    pub unknown_pdu_type: u64,
    pub reserved_llid: u64,
    pub truncated: u64,
    pub crc_mismatch: u64,
    pub carried_bytes: u64,
}

impl ReconstructorStats {
    fn record_rejection(&mut self, reason: &Rejection) {
        match reason {
            Rejection::InsufficientData => self.insufficient_data += 1,
            Rejection::UnknownPduType(_) => self.unknown_pdu_type += 1,
            Rejection::ReservedLlid => self.reserved_llid += 1,
            Rejection::Truncated { .. } => self.truncated += 1,
            Rejection::CrcMismatch { .. } => self.crc_mismatch += 1,
        }
    }
}

impl fmt::Display for ReconstructorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Scans: {} ({} bytes) | Preambles: {} | Packets: {} | Short: {} | PDU type: {} | LLID: {} | Truncated: {} ({} bytes carried) | CRC errors: {}",
            self.scans,
            self.bytes_scanned,
            self.preambles,
            self.validated,
            self.insufficient_data,
            self.unknown_pdu_type,
            self.reserved_llid,
            self.truncated,
            self.carried_bytes,
            self.crc_mismatch
        )
    }
}

/// Frame reconstructor - finds preambles and extracts validated frames
pub struct FrameReconstructor {
    dewhiten: bool,
    check_crc: bool,
    /// Bytes of the last truncated candidate, prefixed onto the next scan
    carry: Option<Vec<u8>>,
    pub stats: ReconstructorStats,
}

impl FrameReconstructor {
    pub fn new(dewhiten: bool, check_crc: bool) -> Self {
        Self {
            dewhiten,
            check_crc,
            carry: None,
            stats: ReconstructorStats::default(),
        }
    }

    /// Bytes waiting to be prefixed onto the next buffer
    pub fn carry(&self) -> Option<&[u8]> {
        self.carry.as_deref()
    }

    /// Forget the carried candidate; a frame never spans a retune
    pub fn discard_carry(&mut self) -> Option<Vec<u8>> {
        self.carry.take()
    }

    /// Scan a working buffer received on `channel`.
    ///
    /// Any carried bytes from the previous scan are prefixed first. The buffer is
    /// consumed; only a newly truncated candidate survives into the next scan.
    pub fn scan(&mut self, buffer: Vec<u8>, channel: u8) -> Vec<CandidateOutcome> {
        let buffer = match self.carry.take() {
            Some(mut carried) => {
                carried.extend_from_slice(&buffer);
                carried
            }
            None => buffer,
        };

        self.stats.scans += 1;
        self.stats.bytes_scanned += buffer.len() as u64;

        let positions: Vec<usize> = buffer
            .iter()
            .enumerate()
            .filter(|(_, &byte)| byte == PREAMBLE)
            .map(|(i, _)| i)
            .collect();

        let mut outcomes = Vec::with_capacity(positions.len());

        for position in positions {
            self.stats.preambles += 1;

            match self.evaluate(&buffer, position, channel) {
                Ok(packet) => {
                    self.stats.validated += 1;
                    debug!(
                        "{} packet at byte {}: ch={} AA={:08X} payload={} | {}",
                        if packet.is_advertising() { "ADV" } else { "DATA" },
                        position,
                        packet.channel,
                        packet.access_address,
                        packet.payload_len(),
                        packet.to_hex()
                    );
                    outcomes.push(CandidateOutcome::Validated(packet));
                }
                Err(reason) => {
                    self.stats.record_rejection(&reason);
                    trace!("Candidate at byte {} dropped: {}", position, reason);
                    outcomes.push(CandidateOutcome::Rejected { position, reason });
                }
            }
        }

        outcomes
    }

    /// Evaluate the candidate whose preamble sits at `preamble_pos`
    fn evaluate(
        &mut self,
        buffer: &[u8],
        preamble_pos: usize,
        channel: u8,
    ) -> Result<ValidatedPacket, Rejection> {
        let aa_start = preamble_pos + PREAMBLE_LEN;
        let header_start = aa_start + ACCESS_ADDRESS_LEN;

        if buffer.len() < header_start + PDU_HEADER_LEN {
            return Err(Rejection::InsufficientData);
        }

        let access_address = u32::from_le_bytes([
            buffer[aa_start],
            buffer[aa_start + 1],
            buffer[aa_start + 2],
            buffer[aa_start + 3],
        ]);

        let mut header = [buffer[header_start], buffer[header_start + 1]];
        if self.dewhiten {
            whitening::dewhiten_in_place(&mut header, channel);
        }

        let class = ble::classify(access_address, header)?;
        trace!("Candidate at byte {}: {}", preamble_pos, class);

        let expected = PDU_HEADER_LEN + class.length() + CRC_LEN;
        let frame_end = header_start + expected;

        if frame_end > buffer.len() {
            // Keep everything from the preamble on; the rest arrives with the
            // next buffer. A later cut-off candidate replaces this one.
            let carried = buffer[preamble_pos..].to_vec();
            self.stats.carried_bytes += carried.len() as u64;
            self.carry = Some(carried);

            return Err(Rejection::Truncated {
                expected,
                available: buffer.len() - header_start,
            });
        }

        let mut frame = buffer[header_start..frame_end].to_vec();
        if self.dewhiten {
            whitening::dewhiten_in_place(&mut frame, channel);
        }

        if self.check_crc {
            crc::validate(&frame)?;
        }

        Ok(ValidatedPacket {
            channel,
            access_address,
            frame,
        })
    }
}
