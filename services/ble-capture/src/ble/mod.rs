//! Bluetooth LE link-layer primitives

pub mod crc;
pub mod pdu;
mod types;
pub mod whitening;

pub use pdu::{classify, PduClass, Rejection};
pub use types::*;
