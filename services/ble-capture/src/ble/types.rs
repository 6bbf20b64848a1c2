//! BLE link-layer data types and constants

/// Preamble byte marking the start of a frame on the 1M PHY
pub const PREAMBLE: u8 = 0xAA;
pub const PREAMBLE_LEN: usize = 1;

/// Access address length in bytes
pub const ACCESS_ADDRESS_LEN: usize = 4;

/// PDU header length in bytes
pub const PDU_HEADER_LEN: usize = 2;

/// CRC trailer length in bytes
pub const CRC_LEN: usize = 3;

/// Reserved access address used by every advertising channel PDU
pub const ADVERTISING_ACCESS_ADDRESS: u32 = 0x8E89_BED6;

/// Highest valid channel index (37-39 are advertising, 0-36 data)
pub const MAX_CHANNEL: u8 = 39;

/// Advertising channel PDU types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PduType {
    AdvInd = 0,
    AdvDirectInd = 1,
    AdvNonconnInd = 2,
    ScanReq = 3,
    ScanRsp = 4,
    ConnectReq = 5,
    AdvScanInd = 6,
}

impl TryFrom<u8> for PduType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::AdvInd),
            1 => Ok(Self::AdvDirectInd),
            2 => Ok(Self::AdvNonconnInd),
            3 => Ok(Self::ScanReq),
            4 => Ok(Self::ScanRsp),
            5 => Ok(Self::ConnectReq),
            6 => Ok(Self::AdvScanInd),
            other => Err(other),
        }
    }
}

/// Data channel LLID values (LLID 0 is reserved)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Llid {
    /// LL data PDU, continuation fragment or empty packet
    Continuation = 1,
    /// LL data PDU, start of an L2CAP message
    Start = 2,
    /// LL control PDU
    Control = 3,
}

/// A reconstructed frame that passed every check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPacket {
    /// Channel index the frame was captured on
    pub channel: u8,

    /// Access address as transmitted (little-endian on air)
    pub access_address: u32,

    /// De-whitened PDU header, payload and CRC trailer
    pub frame: Vec<u8>,
}

impl ValidatedPacket {
    /// Whether the frame was sent on the advertising access address
    pub fn is_advertising(&self) -> bool {
        self.access_address == ADVERTISING_ACCESS_ADDRESS
    }

    /// Payload length as carried in the frame (header and trailer excluded)
    pub fn payload_len(&self) -> usize {
        self.frame.len().saturating_sub(PDU_HEADER_LEN + CRC_LEN)
    }

    /// Convert frame to hex string
    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.frame)
    }
}

/// Map a channel index to its RF centre frequency in Hz
pub fn channel_frequency_hz(channel: u8) -> Option<u64> {
    let mhz: u64 = match channel {
        37 => 2402,
        38 => 2426,
        39 => 2480,
        0..=10 => 2404 + 2 * channel as u64,
        11..=36 => 2428 + 2 * (channel as u64 - 11),
        _ => return None,
    };
    Some(mhz * 1_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_frequency() {
        assert_eq!(channel_frequency_hz(37), Some(2_402_000_000));
        assert_eq!(channel_frequency_hz(38), Some(2_426_000_000));
        assert_eq!(channel_frequency_hz(39), Some(2_480_000_000));
        assert_eq!(channel_frequency_hz(0), Some(2_404_000_000));
        assert_eq!(channel_frequency_hz(10), Some(2_424_000_000));
        assert_eq!(channel_frequency_hz(11), Some(2_428_000_000));
        assert_eq!(channel_frequency_hz(36), Some(2_478_000_000));
        assert_eq!(channel_frequency_hz(40), None);
    }

    #[test]
    fn test_pdu_type_from_header_nibble() {
        assert_eq!(PduType::try_from(0), Ok(PduType::AdvInd));
        assert_eq!(PduType::try_from(5), Ok(PduType::ConnectReq));
        assert_eq!(PduType::try_from(7), Err(7));
        assert_eq!(PduType::try_from(15), Err(15));
    }

    #[test]
    fn test_packet_accessors() {
        let pkt = ValidatedPacket {
            channel: 37,
            access_address: ADVERTISING_ACCESS_ADDRESS,
            frame: vec![0x00, 0x01, 0xAB, 0x11, 0x22, 0x33],
        };
        assert!(pkt.is_advertising());
        assert_eq!(pkt.payload_len(), 1);
        assert_eq!(pkt.to_hex(), "0001AB112233");
    }
}
