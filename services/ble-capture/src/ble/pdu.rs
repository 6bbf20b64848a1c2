//! PDU header classification
//!
//! Advertising and data channel PDUs share the 2-byte header layout but
//! differ in how the length field is masked and which header values are
//! legal. The access address tells the two domains apart.

use std::fmt;
use thiserror::Error;

use super::types::{Llid, PduType, ADVERTISING_ACCESS_ADDRESS};

/// Length field mask for advertising channel PDUs (6 bits)
const ADV_LENGTH_MASK: u8 = 0x3F;

/// Length field mask for data channel PDUs (5 bits)
const DATA_LENGTH_MASK: u8 = 0x1F;

/// Reasons a candidate frame is dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("not enough bytes after preamble for access address and header")]
    InsufficientData,

    #[error("unknown advertising PDU type {0}")]
    UnknownPduType(u8),

    #[error("reserved LLID 0 on data channel PDU")]
    ReservedLlid,

    #[error("frame needs {expected} bytes but only {available} are buffered")]
    Truncated { expected: usize, available: usize },

    #[error("CRC mismatch: computed {computed:06X}, received {received:06X}")]
    CrcMismatch { computed: u32, received: u32 },
}

/// Addressing domain and payload length resolved from a PDU header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduClass {
    Advertising { pdu_type: PduType, length: u8 },
    DataChannel { llid: Llid, length: u8 },
}

impl PduClass {
    /// Payload length in bytes (header and CRC excluded)
    pub fn length(&self) -> usize {
        match *self {
            PduClass::Advertising { length, .. } | PduClass::DataChannel { length, .. } => {
                length as usize
            }
        }
    }
}

impl fmt::Display for PduClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PduClass::Advertising { pdu_type, length } => write!(f, "{:?} len={}", pdu_type, length),
            PduClass::DataChannel { llid, length } => write!(f, "data {:?} len={}", llid, length),
        }
    }
}

/// Classify a (de-whitened) PDU header received on `access_address`
pub fn classify(access_address: u32, header: [u8; 2]) -> Result<PduClass, Rejection> {
    if access_address == ADVERTISING_ACCESS_ADDRESS {
        let raw_type = header[0] & 0x0F;
        let pdu_type = PduType::try_from(raw_type).map_err(Rejection::UnknownPduType)?;

        Ok(PduClass::Advertising {
            pdu_type,
            length: header[1] & ADV_LENGTH_MASK,
        })
    } else {
        let llid = match header[0] & 0x03 {
            1 => Llid::Continuation,
            2 => Llid::Start,
            3 => Llid::Control,
            _ => return Err(Rejection::ReservedLlid),
        };

        Ok(PduClass::DataChannel {
            llid,
            length: header[1] & DATA_LENGTH_MASK,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advertising_header() {
        // ADV_IND with TxAdd set, length 10
        let class = classify(ADVERTISING_ACCESS_ADDRESS, [0x40, 0x0A]).unwrap();
        assert_eq!(
            class,
            PduClass::Advertising {
                pdu_type: PduType::AdvInd,
                length: 10
            }
        );
        assert_eq!(class.length(), 10);
        assert_eq!(class.to_string(), "AdvInd len=10");
    }

    #[test]
    fn test_advertising_length_uses_six_bits() {
        let class = classify(ADVERTISING_ACCESS_ADDRESS, [0x02, 0xFF]).unwrap();
        assert_eq!(class.length(), 63);
    }

    #[test]
    fn test_unknown_advertising_type() {
        for raw in 7..=15u8 {
            assert_eq!(
                classify(ADVERTISING_ACCESS_ADDRESS, [raw, 0x06]),
                Err(Rejection::UnknownPduType(raw))
            );
        }
    }

    #[test]
    fn test_data_channel_header() {
        let class = classify(0x5065_17A3, [0x02, 0xE5]).unwrap();
        assert_eq!(
            class,
            PduClass::DataChannel {
                llid: Llid::Start,
                length: 5
            }
        );
        assert_eq!(class.to_string(), "data Start len=5");
    }

    #[test]
    fn test_reserved_llid_always_rejected() {
        for first in (0..=255u8).filter(|b| b & 0x03 == 0) {
            for second in [0x00, 0x1F, 0xFF] {
                assert_eq!(
                    classify(0x1234_5678, [first, second]),
                    Err(Rejection::ReservedLlid)
                );
            }
        }
    }

    #[test]
    fn test_data_channel_ignores_pdu_type_nibble() {
        // 0x0F would be an unknown advertising type, but LLID=3 is fine on data channels
        assert!(classify(0xAF9A_9283, [0x0F, 0x00]).is_ok());
    }
}
