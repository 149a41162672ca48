//! darclib decodes an ARIB STD-B3 DARC bitstream: the FM-subcarrier
//! broadcast datalink carrying Japanese traffic information (VICS),
//! from raw demodulated bits up to typed traffic records.
//!
//! The pipeline is layered the way the standard is:
//!
//! * [`l2`] - BIC synchronization, descrambling, block and frame assembly
//!   with DSCC (272,190) error correction;
//! * [`l3`] - data packet extraction per service id;
//! * [`l4`] - data group reassembly across packets, CRC-16 verification;
//! * [`l5`] - data headers, TLV data units, segments, and the typed
//!   decoders for the traffic data units 0x40-0x43;
//! * [`position`] - the map mesh to Tokyo datum to WGS-84 transform.
//!
//! [`decoder::DarcDecoder`] wires the layers together behind a single
//! `push_bit`.

use thiserror::Error;

pub mod bits;
pub mod crc;
pub mod decoder;
pub mod dscc;
pub mod helpers;
pub mod l2;
pub mod l3;
pub mod l4;
pub mod l5;
pub mod lfsr;
pub mod position;
pub mod stats;

pub use decoder::{DarcDecoder, DarcEvent};

/// Decoding failures that end the current scope (packet, group or unit).
///
/// Integrity problems (CRC mismatches, uncorrectable syndromes) are not
/// errors - they surface as flags on the emitted records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DarcError {
    #[error("unexpected end of bit stream")]
    UnexpectedEnd,
    #[error("buffer too short: {actual} bits, need at least {needed}")]
    BufferTooShort { needed: usize, actual: usize },
    #[error("impossible length field: {0}")]
    ImpossibleLength(usize),
    #[error("invalid separator: {0:#04x}")]
    InvalidSeparator(u8),
}

impl From<helpers::BitstreamParseError> for DarcError {
    fn from(_: helpers::BitstreamParseError) -> Self {
        DarcError::UnexpectedEnd
    }
}
