//! CRC-24 checksum for BLE link-layer frames
//!
//! Polynomial x^24 + x^10 + x^9 + x^6 + x^4 + x^3 + x + 1, shifted in LSB
//! first. The register is kept reflected so the trailer falls out in
//! over-the-air byte order.

use super::pdu::Rejection;
use super::types::CRC_LEN;

/// Reflected form of the BLE CRC-24 polynomial
const CRC24_POLY_REFLECTED: u32 = 0xDA_6000;

/// CRC preset for advertising channel PDUs
pub const ADVERTISING_CRC_INIT: u32 = 0x55_5555;

/// Reverse the low 24 bits
fn reflect24(mut v: u32) -> u32 {
    let mut result = 0u32;
    for _ in 0..24 {
        result = (result << 1) | (v & 1);
        v >>= 1;
    }
    result
}

/// Compute the CRC-24 register over `data` with the given preset
pub fn crc24(data: &[u8], init: u32) -> u32 {
    let mut crc = reflect24(init & 0xFF_FFFF);

    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ CRC24_POLY_REFLECTED;
            } else {
                crc >>= 1;
            }
        }
    }

    crc & 0xFF_FFFF
}

/// Compute the 3-byte trailer over the first `length` bytes of `data`
/// (PDU header and payload, trailer excluded)
pub fn compute(data: &[u8], length: usize) -> [u8; 3] {
    let length = length.min(data.len());
    let crc = crc24(&data[..length], ADVERTISING_CRC_INIT);
    [crc as u8, (crc >> 8) as u8, (crc >> 16) as u8]
}

/// Check the trailing 3 bytes of a de-whitened frame against its contents
pub fn validate(frame: &[u8]) -> Result<(), Rejection> {
    if frame.len() < CRC_LEN {
        return Err(Rejection::InsufficientData);
    }

    let body = frame.len() - CRC_LEN;
    let computed = compute(frame, body);
    let received = &frame[body..];

    if computed == received {
        Ok(())
    } else {
        Err(Rejection::CrcMismatch {
            computed: trailer_value(&computed),
            received: trailer_value(received),
        })
    }
}

fn trailer_value(trailer: &[u8]) -> u32 {
    trailer
        .iter()
        .take(CRC_LEN)
        .enumerate()
        .fold(0u32, |acc, (i, &b)| acc | ((b as u32) << (8 * i)))
}
