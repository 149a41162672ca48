//! Layer 2: block synchronization and frame assembly.
//!
//! A DARC block is 288 bits on the wire: a 16-bit Block Identification
//! Code (BIC) followed by 272 scrambled payload bits. Information blocks
//! (BIC 1-3) carry a 176-bit data packet plus a 14-bit CRC and 82 bits of
//! horizontal parity; parity blocks (BIC 4) carry 190 bits of vertical
//! parity for the frame-level product code.
//!
//! A frame is 272 blocks. Arranged as a matrix, every column is itself a
//! DSCC (272,190) codeword over the 190 information blocks plus the 82
//! parity blocks, which is what lets the frame decoder repair damage the
//! per-block pass could not.

use log::{debug, warn};

use crate::bits::{get_bit, pack_bits, set_bit};
use crate::crc::crc_14_darc;
use crate::dscc::{correct_dscc_272_190, Correction, CODEWORD_BYTES, DATAWORD_BITS};
use crate::lfsr::Lfsr;

/// Payload bits per block, after descrambling.
pub const BLOCK_BITS: usize = 272;
/// Data packet bits within an information block.
pub const DATA_PACKET_BITS: usize = 176;
/// Data packet size in bytes.
pub const DATA_PACKET_BYTES: usize = DATA_PACKET_BITS / 8;
/// CRC width of an information block.
pub const CRC_BITS: usize = 14;
/// Blocks per frame.
pub const FRAME_BLOCKS: usize = 272;
/// Information blocks per frame.
pub const FRAME_INFO_BLOCKS: usize = 190;
/// Bytes needed to hold one 190-bit matrix row.
const ROW_BYTES: usize = 24;

/// Block Identification Codes. Four fixed 16-bit patterns; which one a
/// block carries tells the frame decoder where the block sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Bic {
    Bic1 = 0x135E,
    Bic2 = 0x74A6,
    Bic3 = 0xA791,
    Bic4 = 0xC875,
}

impl Bic {
    /// All candidates, in tie-break order.
    pub const ALL: [Bic; 4] = [Bic::Bic1, Bic::Bic2, Bic::Bic3, Bic::Bic4];

    pub fn value(self) -> u16 {
        self as u16
    }

    /// BIC 1-3 mark information blocks, BIC 4 parity blocks.
    pub fn is_information(self) -> bool {
        self != Bic::Bic4
    }
}

/// An information block: 176-bit data packet plus its CRC-14.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L2InformationBlock {
    pub block_id: Bic,
    pub data_packet: [u8; DATA_PACKET_BYTES],
    pub crc: u16,
}

impl L2InformationBlock {
    /// Whether the recorded CRC matches the data packet.
    ///
    /// A failure here is not fatal; frame-level correction may still
    /// repair the packet, and consumers get the final verdict per group.
    pub fn is_crc_valid(&self) -> bool {
        crc_14_darc(&self.data_packet) == self.crc
    }

    /// Pack data packet and CRC into a 190-bit matrix row.
    pub(crate) fn to_row(&self) -> [u8; ROW_BYTES] {
        let mut row = [0u8; ROW_BYTES];
        row[..DATA_PACKET_BYTES].copy_from_slice(&self.data_packet);
        for bit in 0..CRC_BITS {
            let value = ((self.crc >> (CRC_BITS - 1 - bit)) & 1) as u8;
            set_bit(&mut row, DATA_PACKET_BITS + bit, value);
        }
        row
    }

    /// Rebuild from a 190-bit matrix row.
    pub(crate) fn from_row(block_id: Bic, row: &[u8; ROW_BYTES]) -> Self {
        let mut data_packet = [0u8; DATA_PACKET_BYTES];
        data_packet.copy_from_slice(&row[..DATA_PACKET_BYTES]);
        let mut crc = 0u16;
        for bit in 0..CRC_BITS {
            crc = (crc << 1) | get_bit(row, DATA_PACKET_BITS + bit) as u16;
        }
        Self {
            block_id,
            data_packet,
            crc,
        }
    }

    /// Extract from a descrambled 272-bit buffer, correcting it first.
    fn from_codeword(block_id: Bic, buffer: &mut [u8; CODEWORD_BYTES]) -> (Self, Correction) {
        let outcome = correct_dscc_272_190(buffer);
        let mut row = [0u8; ROW_BYTES];
        row.copy_from_slice(&buffer[..ROW_BYTES]);
        // The row carries two stray parity bits past bit 190.
        set_bit(&mut row, DATAWORD_BITS, 0);
        set_bit(&mut row, DATAWORD_BITS + 1, 0);
        (Self::from_row(block_id, &row), outcome)
    }
}

/// A parity block: 190 bits of vertical parity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L2ParityBlock {
    pub block_id: Bic,
    /// 190 bits, packed MSB-first; the last two bits of the buffer are zero.
    pub vertical_parity: [u8; ROW_BYTES],
}

impl L2ParityBlock {
    fn from_codeword(block_id: Bic, buffer: &mut [u8; CODEWORD_BYTES]) -> (Self, Correction) {
        let outcome = correct_dscc_272_190(buffer);
        let mut vertical_parity = [0u8; ROW_BYTES];
        vertical_parity.copy_from_slice(&buffer[..ROW_BYTES]);
        set_bit(&mut vertical_parity, DATAWORD_BITS, 0);
        set_bit(&mut vertical_parity, DATAWORD_BITS + 1, 0);
        (
            Self {
                block_id,
                vertical_parity,
            },
            outcome,
        )
    }
}

/// Either kind of decoded block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum L2Block {
    Information(L2InformationBlock),
    Parity(L2ParityBlock),
}

impl L2Block {
    pub fn block_id(&self) -> Bic {
        match self {
            L2Block::Information(block) => block.block_id,
            L2Block::Parity(block) => block.block_id,
        }
    }
}

/// A fully assembled frame: the 190 information blocks after column-wise
/// DSCC correction.
#[derive(Debug, Clone)]
pub struct L2Frame {
    pub blocks: Vec<L2InformationBlock>,
}

/// Bit-level block decoder.
///
/// Feed it demodulated bits one at a time; it hunts for a BIC in a 16-bit
/// sliding window, then descrambles and accumulates the 272 payload bits
/// that follow. A corrupted BIC silently consumes bits until the window
/// matches again.
pub struct L2BlockDecoder {
    bic_register: u16,
    payload: Vec<u8>,
    lfsr: Lfsr,
    /// Maximum Hamming distance for BIC detection.
    pub allowable_bic_errors: u32,
    /// Blocks emitted so far.
    pub blocks_decoded: u64,
    /// Blocks whose DSCC syndrome had no table entry.
    pub uncorrectable: u64,
    /// Inputs that were not 0 or 1.
    pub invalid_bits: u64,
}

const DEFAULT_BIC_ERROR_TOLERANCE: u32 = 2;

impl Default for L2BlockDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl L2BlockDecoder {
    pub fn new() -> Self {
        Self {
            bic_register: 0,
            payload: Vec::with_capacity(BLOCK_BITS),
            lfsr: Lfsr::darc(),
            allowable_bic_errors: DEFAULT_BIC_ERROR_TOLERANCE,
            blocks_decoded: 0,
            uncorrectable: 0,
            invalid_bits: 0,
        }
    }

    /// Reset the sliding window, payload buffer and descrambler.
    pub fn reset(&mut self) {
        self.bic_register = 0;
        self.payload.clear();
        self.lfsr = Lfsr::darc();
    }

    /// The BIC currently matched by the sliding window, if any candidate
    /// is within the error tolerance. Ties resolve in BIC 1..4 order.
    fn detected_bic(&self) -> Option<Bic> {
        let mut best: Option<(Bic, u32)> = None;
        for bic in Bic::ALL {
            let distance = (bic.value() ^ self.bic_register).count_ones();
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((bic, distance));
            }
        }
        best.filter(|&(_, distance)| distance <= self.allowable_bic_errors)
            .map(|(bic, _)| bic)
    }

    /// Process one input bit, returning a block when 272 payload bits have
    /// been collected behind a detected BIC.
    pub fn push_bit(&mut self, bit: u8) -> Option<L2Block> {
        if bit > 1 {
            warn!("input bit must be 0 or 1, got {bit}");
            self.invalid_bits += 1;
            return None;
        }

        // Search phase: shift the window until a BIC matches.
        let Some(block_id) = self.detected_bic() else {
            self.bic_register = (self.bic_register << 1) | bit as u16;
            return None;
        };

        // Payload phase: the window is frozen while bits accumulate.
        self.payload.push(self.lfsr.descramble(bit));
        if self.payload.len() < BLOCK_BITS {
            return None;
        }

        let mut codeword = [0u8; CODEWORD_BYTES];
        codeword.copy_from_slice(&pack_bits(&self.payload));
        self.reset();

        let (block, outcome) = if block_id.is_information() {
            let (block, outcome) = L2InformationBlock::from_codeword(block_id, &mut codeword);
            (L2Block::Information(block), outcome)
        } else {
            let (block, outcome) = L2ParityBlock::from_codeword(block_id, &mut codeword);
            (L2Block::Parity(block), outcome)
        };

        if outcome == Correction::Uncorrectable {
            debug!("{:?} block has an uncorrectable syndrome", block_id);
            self.uncorrectable += 1;
        }
        self.blocks_decoded += 1;
        Some(block)
    }
}

/// Frame decoder: validates the BIC sequence and applies the vertical
/// product-code correction once 272 blocks are in.
pub struct L2FrameDecoder {
    buffer: Vec<L2Block>,
    /// Frames emitted so far.
    pub frames_decoded: u64,
    /// Buffer resets caused by out-of-sequence blocks.
    pub sequence_resets: u64,
}

impl Default for L2FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl L2FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(FRAME_BLOCKS),
            frames_decoded: 0,
            sequence_resets: 0,
        }
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Blocks currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// The BIC a block must carry at `position` (1-based) within a frame.
    pub fn expected_bic(position: usize) -> Option<Bic> {
        match position {
            1..=13 => Some(Bic::Bic1),
            137..=149 => Some(Bic::Bic2),
            14..=136 => Some(if position % 3 == 1 { Bic::Bic4 } else { Bic::Bic3 }),
            150..=FRAME_BLOCKS => Some(if position % 3 == 2 { Bic::Bic4 } else { Bic::Bic3 }),
            _ => None,
        }
    }

    /// Append a block; on the 272nd in-sequence block the corrected frame
    /// comes back. Any sequence violation discards the whole buffer.
    pub fn push_block(&mut self, block: L2Block) -> Option<L2Frame> {
        let position = self.buffer.len() + 1;
        let expected = Self::expected_bic(position);

        if expected != Some(block.block_id()) {
            debug!(
                "BIC mismatch at position {position}: expected {expected:?}, got {:?}",
                block.block_id()
            );
            if !self.buffer.is_empty() {
                self.sequence_resets += 1;
            }
            self.reset();
            return None;
        }

        self.buffer.push(block);
        if position < FRAME_BLOCKS {
            return None;
        }

        let frame = self.correct_frame();
        self.reset();
        self.frames_decoded += 1;
        Some(frame)
    }

    /// Column-wise DSCC correction over the 272x190 matrix.
    ///
    /// Rows are the information blocks in arrival order followed by the
    /// parity blocks in arrival order; each of the 190 columns is then a
    /// 272-bit codeword. Columns whose syndrome has no table entry pass
    /// through unchanged - the per-block CRC flags carry the verdict.
    fn correct_frame(&self) -> L2Frame {
        let mut info_ids = Vec::with_capacity(FRAME_INFO_BLOCKS);
        let mut rows: Vec<[u8; ROW_BYTES]> = Vec::with_capacity(FRAME_BLOCKS);

        for block in &self.buffer {
            if let L2Block::Information(info) = block {
                info_ids.push(info.block_id);
                rows.push(info.to_row());
            }
        }
        for block in &self.buffer {
            if let L2Block::Parity(parity) = block {
                rows.push(parity.vertical_parity);
            }
        }

        for col in 0..DATAWORD_BITS {
            let mut codeword = [0u8; CODEWORD_BYTES];
            for (row_idx, row) in rows.iter().enumerate() {
                set_bit(&mut codeword, row_idx, get_bit(row, col));
            }
            match correct_dscc_272_190(&mut codeword) {
                Correction::Corrected => {
                    for (row_idx, row) in rows.iter_mut().enumerate() {
                        set_bit(row, col, get_bit(&codeword, row_idx));
                    }
                }
                Correction::Clean => {}
                Correction::Uncorrectable => {
                    debug!("frame column {col} is uncorrectable");
                }
            }
        }

        let blocks = info_ids
            .into_iter()
            .zip(rows.iter())
            .map(|(block_id, row)| L2InformationBlock::from_row(block_id, row))
            .collect();
        L2Frame { blocks }
    }
}
