//! The full decoder pipeline in one object.
//!
//! `DarcDecoder` chains the block, frame, packet, group and data decoders;
//! feed it demodulated bits and collect typed events. All processing is
//! synchronous and strictly FIFO; two streams need two decoders.

use log::warn;

use crate::l2::{L2BlockDecoder, L2FrameDecoder};
use crate::l3::L3DataPacketDecoder;
use crate::l4::{L4DataGroup, L4DataGroupDecoder};
use crate::l5::{L5Data, L5DataDecoder};
use crate::stats::PipelineStats;

/// One decoded output: the layer-4 group and its layer-5 interpretation.
#[derive(Debug, Clone)]
pub struct DarcEvent {
    pub group: L4DataGroup,
    pub data: L5Data,
}

/// Streaming decoder from bits to [`DarcEvent`]s.
pub struct DarcDecoder {
    block_decoder: L2BlockDecoder,
    frame_decoder: L2FrameDecoder,
    packet_decoder: L3DataPacketDecoder,
    group_decoder: L4DataGroupDecoder,
    data_decoder: L5DataDecoder,
    events_decoded: u64,
    decode_errors: u64,
}

impl Default for DarcDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl DarcDecoder {
    pub fn new() -> Self {
        Self {
            block_decoder: L2BlockDecoder::new(),
            frame_decoder: L2FrameDecoder::new(),
            packet_decoder: L3DataPacketDecoder::new(),
            group_decoder: L4DataGroupDecoder::new(),
            data_decoder: L5DataDecoder::new(),
            events_decoded: 0,
            decode_errors: 0,
        }
    }

    /// Process one demodulated bit; most calls return nothing, a completed
    /// frame can yield several events at once.
    pub fn push_bit(&mut self, bit: u8) -> Vec<DarcEvent> {
        let Some(block) = self.block_decoder.push_bit(bit) else {
            return Vec::new();
        };
        let Some(frame) = self.frame_decoder.push_block(block) else {
            return Vec::new();
        };

        let packets = self.packet_decoder.push_frame(&frame);
        let mut events = Vec::new();
        for group in self.group_decoder.push_data_packets(&packets) {
            match self.data_decoder.push_data_group(&group) {
                Ok(data) => {
                    self.events_decoded += 1;
                    events.push(DarcEvent { group, data });
                }
                Err(err) => {
                    warn!(
                        "failed to decode group {:#x} of {:?}: {err}",
                        group.data_group_number(),
                        group.service_id()
                    );
                    self.decode_errors += 1;
                }
            }
        }
        events
    }

    /// Snapshot of all pipeline counters.
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            blocks_decoded: self.block_decoder.blocks_decoded,
            blocks_uncorrectable: self.block_decoder.uncorrectable,
            invalid_bits: self.block_decoder.invalid_bits,
            frames_decoded: self.frame_decoder.frames_decoded,
            frame_sequence_resets: self.frame_decoder.sequence_resets,
            groups_decoded: self.group_decoder.groups_decoded,
            missing_first_drops: self.group_decoder.missing_first_drops,
            group_evictions: self.group_decoder.evictions,
            events_decoded: self.events_decoded,
            decode_errors: self.decode_errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::{get_bit, set_bit};
    use crate::crc::{crc_14_darc, crc_16_darc, crc_82_darc_bits};
    use crate::l2::{Bic, L2FrameDecoder, DATA_PACKET_BYTES, FRAME_BLOCKS, FRAME_INFO_BLOCKS};
    use crate::l4::L4DataGroup1;
    use crate::l5::headers::{DataHeader, PageDataHeaderB};
    use crate::l5::{decode_data_unit, DataUnitItem, GenericDataUnit, TypedDataUnit};
    use crate::lfsr::Lfsr;
    use crate::position::MapPosition;

    /// Encode one comp-1 L3 data packet (176 bits) carrying `chunk`.
    fn l3_packet_bits(
        service_id: u8,
        group: u16,
        packet: u16,
        eoi: bool,
        chunk: &[u8; 18],
    ) -> [u8; DATA_PACKET_BYTES] {
        let mut buf = [0u8; DATA_PACKET_BYTES];
        let mut pos = 0;
        let mut put_rev = |value: u64, bits: usize| {
            for i in 0..bits {
                set_bit(&mut buf, pos, ((value >> i) & 1) as u8);
                pos += 1;
            }
        };
        put_rev(service_id as u64, 4);
        put_rev(0, 1); // decode id flag
        put_rev(eoi as u64, 1);
        put_rev(0, 2); // update flag
        put_rev(group as u64, 14);
        put_rev(packet as u64, 10);
        buf[4..].copy_from_slice(chunk);
        buf
    }

    /// Wrap a comp-1 group wire buffer into a full frame's wire bits.
    fn frame_wire_bits(group_wire: &[u8], group_number: u16) -> Vec<u8> {
        // First the 190 information rows: our packets, then zero filler.
        let mut packets: Vec<[u8; DATA_PACKET_BYTES]> = group_wire
            .chunks(18)
            .enumerate()
            .map(|(idx, chunk)| {
                let mut block = [0u8; 18];
                block.copy_from_slice(chunk);
                l3_packet_bits(
                    0x1,
                    group_number,
                    idx as u16,
                    (idx + 1) * 18 >= group_wire.len(),
                    &block,
                )
            })
            .collect();
        packets.resize(FRAME_INFO_BLOCKS, [0u8; DATA_PACKET_BYTES]);

        let info_rows: Vec<[u8; 24]> = packets
            .iter()
            .map(|packet| {
                let mut row = [0u8; 24];
                row[..DATA_PACKET_BYTES].copy_from_slice(packet);
                let crc = crc_14_darc(packet);
                for bit in 0..14 {
                    set_bit(&mut row, 176 + bit, ((crc >> (13 - bit)) & 1) as u8);
                }
                row
            })
            .collect();

        // Vertical parity rows make every column a valid codeword.
        let parity_count = FRAME_BLOCKS - FRAME_INFO_BLOCKS;
        let mut parity_rows = vec![[0u8; 24]; parity_count];
        for col in 0..190 {
            let mut column = [0u8; 24];
            for (row_idx, row) in info_rows.iter().enumerate() {
                set_bit(&mut column, row_idx, get_bit(row, col));
            }
            let parity = crc_82_darc_bits(&column, FRAME_INFO_BLOCKS);
            for bit in 0..parity_count {
                set_bit(
                    &mut parity_rows[bit],
                    col,
                    ((parity >> (parity_count - 1 - bit)) & 1) as u8,
                );
            }
        }

        // Interleave rows per the BIC sequence and serialize each block as
        // BIC bits plus the scrambled 272-bit codeword.
        let mut bits = Vec::with_capacity(FRAME_BLOCKS * 288);
        let mut info_iter = info_rows.into_iter();
        let mut parity_iter = parity_rows.into_iter();
        for position in 1..=FRAME_BLOCKS {
            let bic = L2FrameDecoder::expected_bic(position).unwrap();
            let row = if bic.is_information() {
                info_iter.next().unwrap()
            } else {
                parity_iter.next().unwrap()
            };

            let mut codeword = [0u8; 34];
            codeword[..24].copy_from_slice(&row);
            let parity = crc_82_darc_bits(&codeword[..24], 190);
            for bit in 0..82 {
                set_bit(&mut codeword, 190 + bit, ((parity >> (81 - bit)) & 1) as u8);
            }

            for i in (0..16).rev() {
                bits.push(((bic.value() >> i) & 1) as u8);
            }
            let mut lfsr = Lfsr::darc();
            for i in 0..272 {
                bits.push(lfsr.descramble(get_bit(&codeword, i)));
            }
        }
        bits
    }

    #[test]
    fn bits_to_parking_record_end_to_end() {
        let header = DataHeader::PageB(PageDataHeaderB {
            map: crate::l5::headers::MapReference {
                position: MapPosition::new(0x8E8, 0x848),
                ..Default::default()
            },
            ..Default::default()
        });
        let parking_unit = GenericDataUnit {
            data_unit_parameter: crate::l5::PARAMETER_PARKING,
            data_unit_link_flag: 0,
            // One basic record: empty general-use lot at grid (651, 132).
            data: vec![0b00_000_1_00, 0x02, 0x8B, 0x00, 0x84],
        };
        let mut payload = header.to_buffer();
        payload.extend_from_slice(&parking_unit.to_buffer());

        let mut group = L4DataGroup1 {
            service_id: crate::l3::ServiceId::Transmission1Mode,
            data_group_number: 0x11,
            data_group_link: 0,
            data_group_data: payload,
            end_of_data_group: 0,
            crc: 0,
        };
        let wire = group.to_buffer();
        group.crc = crc_16_darc(&wire[..wire.len() - 2]);

        let mut decoder = DarcDecoder::new();
        let mut events = Vec::new();
        for bit in frame_wire_bits(&group.to_buffer(), group.data_group_number) {
            events.extend(decoder.push_bit(bit));
        }

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert!(event.group.is_crc_valid());
        assert_eq!(event.group.data_group_number(), 0x11);

        let L5Data::Group {
            header: Some(DataHeader::PageB(parsed_header)),
            units,
        } = &event.data
        else {
            panic!("expected a PageB group, got {:?}", event.data);
        };
        assert_eq!(parsed_header.map.position, MapPosition::new(0x8E8, 0x848));
        assert_eq!(units.len(), 1);

        let DataUnitItem::Unit(unit) = &units[0] else {
            panic!("expected a parsed unit");
        };
        let Some(TypedDataUnit::Parking(parking)) = decode_data_unit(unit) else {
            panic!("expected a parking unit");
        };
        assert_eq!(parking.records.len(), 1);
        assert_eq!(parking.records[0].center_x, 651);
        assert_eq!(parking.records[0].center_y, 132);

        let stats = decoder.stats();
        assert_eq!(stats.blocks_decoded, FRAME_BLOCKS as u64);
        assert_eq!(stats.frames_decoded, 1);
        assert_eq!(stats.events_decoded, 1);
        assert_eq!(stats.decode_errors, 0);

        // The filler packets opened exactly one phantom group buffer.
        assert!(stats.groups_decoded == 1);
    }

    #[test]
    fn garbage_bits_produce_nothing() {
        let mut decoder = DarcDecoder::new();
        let mut state = 0x12345678u32;
        for _ in 0..10_000 {
            // Small xorshift; bits are pseudo-random but deterministic.
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            assert!(decoder.push_bit((state & 1) as u8).is_empty());
        }
        assert_eq!(decoder.stats().frames_decoded, 0);
    }

    #[test]
    fn bic_reference_values() {
        assert_eq!(Bic::Bic1.value(), 0x135E);
        assert_eq!(Bic::Bic2.value(), 0x74A6);
        assert_eq!(Bic::Bic3.value(), 0xA791);
        assert_eq!(Bic::Bic4.value(), 0xC875);
    }
}
