//! Difference-Set Cyclic Code (272,190) error correction.
//!
//! The vertical code of a DARC frame is a DSCC whose 82-bit syndrome is the
//! CRC-82/DARC digest of the 272-bit codeword. Correction is a table lookup:
//! every burst-error pattern up to eight bits wide is enumerated offline,
//! its syndrome computed, and the map inverted at decode time.
//!
//! The map is a pure function of the code constants, built once per process.

use std::collections::HashMap;
use std::sync::LazyLock;

use log::debug;

use crate::crc::crc_82_darc_bits;

/// Codeword length in bits.
pub const CODEWORD_BITS: usize = 272;
/// Dataword length in bits.
pub const DATAWORD_BITS: usize = 190;
/// Codeword length in bytes (272 bits pack exactly).
pub const CODEWORD_BYTES: usize = CODEWORD_BITS / 8;
/// Maximum correctable burst width in bits.
pub const MAX_BURST_BITS: usize = 8;

type ErrorVector = [u8; CODEWORD_BYTES];

/// Syndrome -> error-vector map for every burst of width 1..=8 at every
/// shift offset. Bounded by sum over w of 2^(max(w-2,0)) * (273-w), about
/// 34k entries.
static BITFLIP_SYNDROME_MAP: LazyLock<HashMap<u128, ErrorVector>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    for width in 1..=MAX_BURST_BITS {
        // First and last bit of a burst are set; the middle bits run free.
        let middle_count: u32 = if width > 2 { 1 << (width - 2) } else { 1 };
        let base: u32 = if width == 1 { 1 } else { (1 << (width - 1)) | 1 };

        for middle in 0..middle_count {
            let pattern = base | (middle << 1);

            for offset in 0..=(CODEWORD_BITS - width) {
                let mut vector: ErrorVector = [0; CODEWORD_BYTES];
                for bit in 0..width {
                    if pattern & (1 << (width - 1 - bit)) != 0 {
                        crate::bits::set_bit(&mut vector, offset + bit, 1);
                    }
                }
                let syndrome = crc_82_darc_bits(&vector, CODEWORD_BITS);
                map.insert(syndrome, vector);
            }
        }
    }

    map
});

/// Outcome of a correction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correction {
    /// Zero syndrome; the buffer was already a codeword.
    Clean,
    /// A burst error was found in the map and flipped out.
    Corrected,
    /// The syndrome has no table entry; the buffer is left untouched.
    Uncorrectable,
}

/// Correct a packed 272-bit buffer in place.
///
/// Returns what happened; on [`Correction::Uncorrectable`] the caller
/// decides whether to drop the buffer or carry it with an integrity flag.
pub fn correct_dscc_272_190(buffer: &mut ErrorVector) -> Correction {
    let syndrome = crc_82_darc_bits(buffer, CODEWORD_BITS);
    if syndrome == 0 {
        return Correction::Clean;
    }

    debug!("non-zero DSCC syndrome {syndrome:#x}, attempting correction");

    match BITFLIP_SYNDROME_MAP.get(&syndrome) {
        Some(vector) => {
            for (dst, src) in buffer.iter_mut().zip(vector.iter()) {
                *dst ^= src;
            }
            Correction::Corrected
        }
        None => Correction::Uncorrectable,
    }
}

/// Append the CRC-82 parity to a 190-bit dataword, producing a codeword
/// with zero syndrome. Used by the frame tests and by round-trip encoding.
pub fn encode_dscc_272_190(dataword: &[u8]) -> ErrorVector {
    let mut codeword: ErrorVector = [0; CODEWORD_BYTES];
    codeword[..dataword.len()].copy_from_slice(dataword);
    // Clear any bits past the 190-bit dataword before placing the parity.
    for idx in DATAWORD_BITS..CODEWORD_BITS {
        crate::bits::set_bit(&mut codeword, idx, 0);
    }
    let parity = crc_82_darc_bits(&codeword[..24], DATAWORD_BITS);
    for bit in 0..(CODEWORD_BITS - DATAWORD_BITS) {
        let value = ((parity >> (CODEWORD_BITS - DATAWORD_BITS - 1 - bit)) & 1) as u8;
        crate::bits::set_bit(&mut codeword, DATAWORD_BITS + bit, value);
    }
    codeword
}
