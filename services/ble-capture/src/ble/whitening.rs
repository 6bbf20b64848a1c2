//! Data whitening for BLE link-layer PDUs
//!
//! The transmitter XORs the PDU and CRC with the output of a 7-bit LFSR
//! (x^7 + x^4 + 1) seeded from the channel index. Bits go over the air
//! LSB first, so the sequence is applied from bit 0 of each byte upward.
//! XOR with the same sequence undoes it, so one routine serves both ways.

/// Seed the whitening register for a channel.
/// Position 0 is forced to 1, positions 1-6 hold the channel index.
#[inline]
fn seed(channel: u8) -> u8 {
    (channel & 0x3F) | 0x40
}

/// Whiten or de-whiten `data` in place for the given channel
pub fn dewhiten_in_place(data: &mut [u8], channel: u8) {
    let mut lfsr = seed(channel);

    for byte in data.iter_mut() {
        let mut mask = 0u8;
        for bit in 0..8 {
            let out = lfsr & 1;
            mask |= out << bit;
            lfsr >>= 1;
            if out != 0 {
                lfsr ^= 0x44;
            }
        }
        *byte ^= mask;
    }
}

/// Copy `data` and de-whiten the copy
pub fn dewhiten(data: &[u8], channel: u8) -> Vec<u8> {
    let mut out = data.to_vec();
    dewhiten_in_place(&mut out, channel);
    out
}
