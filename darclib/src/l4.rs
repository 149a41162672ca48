//! Layer 4: data group reassembly.
//!
//! Data packets sharing a `(service id, group number)` key are concatenated
//! in packet-number order until one arrives with the end-of-information
//! flag, at which point the accumulated buffer parses as one of two group
//! compositions:
//!
//! * composition 1 (everything except the additional-information service):
//!   an SOH-framed structure with a 15-bit byte length, per-byte
//!   bit-reversed payload, an end marker and a CRC-16;
//! * composition 2 (additional information): raw segment data, with a
//!   trailing CRC-16 only when the group spans more than one packet.
//!
//! CRC failures never drop a group here - the flag rides along so the
//! consumer can decide.

use std::collections::{HashMap, VecDeque};

use byteorder::{BigEndian, ByteOrder};
use log::{debug, warn};

use crate::bits::reverse_bits;
use crate::crc::crc_16_darc;
use crate::l3::{L3DataPacket, ServiceId};
use crate::DarcError;

/// Start-of-heading marker opening a composition-1 group.
pub const START_OF_HEADING: u8 = 0x01;
/// Composition-1 block size: one packet's data block, in bytes.
const COMP1_BLOCK_BYTES: usize = 18;
/// Composition-2 block size, in bytes.
const COMP2_BLOCK_BYTES: usize = 20;
/// Composition-2 groups longer than this carry a trailing CRC-16.
const COMP2_CRC_THRESHOLD_BYTES: usize = 20;
/// Smallest parseable composition-1 buffer: header plus trailer.
const COMP1_MIN_BYTES: usize = 6;

/// Cap on a single reassembly buffer; a group growing past this is broken.
const MAX_GROUP_BUFFER_BYTES: usize = 4096;
/// Cap on concurrently open groups; the oldest is evicted beyond this.
const MAX_OPEN_GROUPS: usize = 64;

/// Composition-1 data group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L4DataGroup1 {
    pub service_id: ServiceId,
    pub data_group_number: u16,
    pub data_group_link: u8,
    /// Payload bytes, already un-reversed.
    pub data_group_data: Vec<u8>,
    pub end_of_data_group: u8,
    pub crc: u16,
}

impl L4DataGroup1 {
    /// Parse the assembled group buffer (a whole number of 18-byte blocks).
    pub fn from_buffer(
        service_id: ServiceId,
        data_group_number: u16,
        buffer: &[u8],
    ) -> Result<Self, DarcError> {
        if buffer.len() < COMP1_MIN_BYTES {
            return Err(DarcError::BufferTooShort {
                needed: COMP1_MIN_BYTES * 8,
                actual: buffer.len() * 8,
            });
        }

        let start_of_heading = reverse_bits(&buffer[..1])[0];
        if start_of_heading != START_OF_HEADING {
            warn!("invalid start of heading: {start_of_heading:#04x}");
        }

        // Bytes 1-2 hold a 7-bit size high part, the link bit, and the size
        // low byte, all bit-reversed per byte on the wire.
        let byte1 = reverse_bits(&buffer[1..2])[0];
        let byte2 = reverse_bits(&buffer[2..3])[0];
        let data_group_link = byte1 >> 7;
        let data_group_size = (((byte1 & 0x7F) as usize) << 8) | byte2 as usize;

        if 3 + data_group_size + 3 > buffer.len() {
            return Err(DarcError::ImpossibleLength(data_group_size));
        }

        let data_group_data = reverse_bits(&buffer[3..3 + data_group_size]);
        let end_of_data_group = reverse_bits(&buffer[buffer.len() - 3..buffer.len() - 2])[0];
        let crc = BigEndian::read_u16(&buffer[buffer.len() - 2..]);

        Ok(Self {
            service_id,
            data_group_number,
            data_group_link,
            data_group_data,
            end_of_data_group,
            crc,
        })
    }

    /// Re-encode to the wire layout, padding with zero bytes up to the next
    /// 18-byte block boundary. Inverse of [`Self::from_buffer`] on
    /// well-formed buffers.
    pub fn to_buffer(&self) -> Vec<u8> {
        let data = reverse_bits(&self.data_group_data);
        let total = COMP1_MIN_BYTES + data.len();
        let padding = (COMP1_BLOCK_BYTES - total % COMP1_BLOCK_BYTES) % COMP1_BLOCK_BYTES;

        let size = data.len();
        let byte1 = ((self.data_group_link << 7) | ((size >> 8) as u8 & 0x7F)) as u8;
        let byte2 = (size & 0xFF) as u8;

        let mut buffer = Vec::with_capacity(total + padding);
        buffer.extend_from_slice(&reverse_bits(&[START_OF_HEADING, byte1, byte2]));
        buffer.extend_from_slice(&data);
        buffer.resize(buffer.len() + padding, 0);
        buffer.extend_from_slice(&reverse_bits(&[self.end_of_data_group]));
        buffer.extend_from_slice(&self.crc.to_be_bytes());
        buffer
    }

    /// Recompute the CRC-16 over everything except the trailing 16 bits.
    pub fn is_crc_valid(&self) -> bool {
        let buffer = self.to_buffer();
        crc_16_darc(&buffer[..buffer.len() - 2]) == self.crc
    }
}

/// Composition-2 data group (additional-information service).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L4DataGroup2 {
    pub service_id: ServiceId,
    pub data_group_number: u16,
    /// Segment payload bytes, already un-reversed.
    pub segments_data: Vec<u8>,
    pub crc: Option<u16>,
}

impl L4DataGroup2 {
    pub fn from_buffer(service_id: ServiceId, data_group_number: u16, buffer: &[u8]) -> Self {
        if buffer.len() > COMP2_CRC_THRESHOLD_BYTES {
            Self {
                service_id,
                data_group_number,
                segments_data: reverse_bits(&buffer[..buffer.len() - 2]),
                crc: Some(BigEndian::read_u16(&buffer[buffer.len() - 2..])),
            }
        } else {
            Self {
                service_id,
                data_group_number,
                segments_data: reverse_bits(buffer),
                crc: None,
            }
        }
    }

    /// Whether the group is long enough to carry a CRC.
    pub fn has_crc(&self) -> bool {
        self.segments_data.len() * 8 > COMP2_CRC_THRESHOLD_BYTES * 8
    }

    /// Re-encode to the wire layout, padded to 20-byte blocks.
    pub fn to_buffer(&self) -> Vec<u8> {
        let data = reverse_bits(&self.segments_data);
        let total = data.len() + if self.crc.is_some() { 2 } else { 0 };
        let padding = (COMP2_BLOCK_BYTES - total % COMP2_BLOCK_BYTES) % COMP2_BLOCK_BYTES;

        let mut buffer = data;
        buffer.resize(buffer.len() + padding, 0);
        if let Some(crc) = self.crc {
            buffer.extend_from_slice(&crc.to_be_bytes());
        }
        buffer
    }

    /// CRC verdict; groups without a CRC count as valid.
    pub fn is_crc_valid(&self) -> bool {
        match self.crc {
            None => true,
            Some(crc) => {
                let buffer = self.to_buffer();
                crc_16_darc(&buffer[..buffer.len() - 2]) == crc
            }
        }
    }
}

/// Either composition of an assembled data group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum L4DataGroup {
    Comp1(L4DataGroup1),
    Comp2(L4DataGroup2),
}

impl L4DataGroup {
    pub fn service_id(&self) -> ServiceId {
        match self {
            L4DataGroup::Comp1(group) => group.service_id,
            L4DataGroup::Comp2(group) => group.service_id,
        }
    }

    pub fn data_group_number(&self) -> u16 {
        match self {
            L4DataGroup::Comp1(group) => group.data_group_number,
            L4DataGroup::Comp2(group) => group.data_group_number,
        }
    }

    pub fn is_crc_valid(&self) -> bool {
        match self {
            L4DataGroup::Comp1(group) => group.is_crc_valid(),
            L4DataGroup::Comp2(group) => group.is_crc_valid(),
        }
    }
}

type GroupKey = (ServiceId, u16);

/// Reassembles data groups out of layer-3 packets.
pub struct L4DataGroupDecoder {
    buffers: HashMap<GroupKey, Vec<u8>>,
    open_order: VecDeque<GroupKey>,
    /// Packets dropped because their group had no open buffer.
    pub missing_first_drops: u64,
    /// Buffers evicted by the caps.
    pub evictions: u64,
    /// Groups completed.
    pub groups_decoded: u64,
}

impl Default for L4DataGroupDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl L4DataGroupDecoder {
    pub fn new() -> Self {
        Self {
            buffers: HashMap::new(),
            open_order: VecDeque::new(),
            missing_first_drops: 0,
            evictions: 0,
            groups_decoded: 0,
        }
    }

    /// Open reassembly buffers.
    pub fn open_groups(&self) -> usize {
        self.buffers.len()
    }

    fn close(&mut self, key: &GroupKey) -> Option<Vec<u8>> {
        self.open_order.retain(|k| k != key);
        self.buffers.remove(key)
    }

    /// Feed one frame's worth of packets; completed groups come back in
    /// stream order.
    pub fn push_data_packets(&mut self, packets: &[L3DataPacket]) -> Vec<L4DataGroup> {
        let mut groups = Vec::new();

        for packet in packets {
            let key = (packet.service_id, packet.data_group_number);

            match self.buffers.get_mut(&key) {
                None => {
                    if packet.data_packet_number != 0 {
                        debug!(
                            "first data packet not found: service_id={:?} group={:#x} packet={:#x}",
                            packet.service_id, packet.data_group_number, packet.data_packet_number
                        );
                        self.missing_first_drops += 1;
                        continue;
                    }
                    if self.buffers.len() >= MAX_OPEN_GROUPS {
                        if let Some(oldest) = self.open_order.pop_front() {
                            warn!("too many open data groups, evicting {oldest:?}");
                            self.buffers.remove(&oldest);
                            self.evictions += 1;
                        }
                    }
                    self.buffers.insert(key, packet.data_block.clone());
                    self.open_order.push_back(key);
                }
                Some(buffer) => {
                    if buffer.len() + packet.data_block.len() > MAX_GROUP_BUFFER_BYTES {
                        warn!("data group {key:?} exceeded the buffer cap, dropping");
                        self.close(&key);
                        self.evictions += 1;
                        continue;
                    }
                    buffer.extend_from_slice(&packet.data_block);
                }
            }

            if packet.end_of_information {
                let Some(buffer) = self.close(&key) else {
                    continue;
                };
                let group = if packet.service_id == ServiceId::AdditionalInformation {
                    Some(L4DataGroup::Comp2(L4DataGroup2::from_buffer(
                        packet.service_id,
                        packet.data_group_number,
                        &buffer,
                    )))
                } else {
                    match L4DataGroup1::from_buffer(
                        packet.service_id,
                        packet.data_group_number,
                        &buffer,
                    ) {
                        Ok(group) => Some(L4DataGroup::Comp1(group)),
                        Err(err) => {
                            warn!("failed to parse data group {key:?}: {err}");
                            None
                        }
                    }
                };
                if let Some(group) = group {
                    self.groups_decoded += 1;
                    groups.push(group);
                }
            }
        }

        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comp1_group(payload: &[u8]) -> L4DataGroup1 {
        let mut group = L4DataGroup1 {
            service_id: ServiceId::Transmission1Mode,
            data_group_number: 0x21,
            data_group_link: 0,
            data_group_data: payload.to_vec(),
            end_of_data_group: 0x03,
            crc: 0,
        };
        // Stamp the real CRC so the wire image is self-consistent.
        let buffer = group.to_buffer();
        group.crc = crc_16_darc(&buffer[..buffer.len() - 2]);
        group
    }

    #[test]
    fn comp1_round_trip() {
        let group = comp1_group(b"\x1e\x30hello data group");
        let buffer = group.to_buffer();
        assert_eq!(buffer.len() % COMP1_BLOCK_BYTES, 0);
        let parsed =
            L4DataGroup1::from_buffer(group.service_id, group.data_group_number, &buffer).unwrap();
        assert_eq!(parsed, group);
        assert!(parsed.is_crc_valid());
    }

    #[test]
    fn comp1_round_trip_on_block_boundary() {
        // 12 payload bytes put header+payload at exactly one block.
        let group = comp1_group(&[0xA5; 12]);
        let buffer = group.to_buffer();
        assert_eq!(buffer.len(), COMP1_BLOCK_BYTES);
        let parsed =
            L4DataGroup1::from_buffer(group.service_id, group.data_group_number, &buffer).unwrap();
        assert_eq!(parsed, group);
    }

    #[test]
    fn comp1_rejects_impossible_length() {
        let group = comp1_group(b"abc");
        let mut buffer = group.to_buffer();
        // Claim far more payload than the buffer holds (size lives
        // bit-reversed in bytes 1-2).
        buffer[1] = reverse_bits(&[0x7F])[0];
        buffer[2] = 0xFF;
        let err = L4DataGroup1::from_buffer(group.service_id, group.data_group_number, &buffer)
            .unwrap_err();
        assert!(matches!(err, DarcError::ImpossibleLength(_)));
    }

    #[test]
    fn comp1_detects_corruption() {
        let group = comp1_group(b"payload under test");
        let mut buffer = group.to_buffer();
        buffer[4] ^= 0x40;
        let parsed =
            L4DataGroup1::from_buffer(group.service_id, group.data_group_number, &buffer).unwrap();
        assert!(!parsed.is_crc_valid());
    }

    #[test]
    fn comp2_short_group_has_no_crc() {
        let buffer = [0x11u8; COMP2_BLOCK_BYTES];
        let group = L4DataGroup2::from_buffer(ServiceId::AdditionalInformation, 0x5, &buffer);
        assert_eq!(group.crc, None);
        assert!(!group.has_crc());
        assert!(group.is_crc_valid());
        assert_eq!(group.segments_data, reverse_bits(&buffer));
    }

    #[test]
    fn comp2_long_group_round_trip() {
        let mut wire = vec![0u8; 2 * COMP2_BLOCK_BYTES - 2];
        for (i, byte) in wire.iter_mut().enumerate() {
            *byte = (i as u8).wrapping_mul(37);
        }
        let crc = crc_16_darc(&wire);
        wire.extend_from_slice(&crc.to_be_bytes());

        let group = L4DataGroup2::from_buffer(ServiceId::AdditionalInformation, 0x5, &wire);
        assert_eq!(group.crc, Some(crc));
        assert!(group.has_crc());
        assert!(group.is_crc_valid());
        assert_eq!(group.to_buffer(), wire);
    }

    fn comp1_packets(group_number: u16, buffer: &[u8]) -> Vec<L3DataPacket> {
        buffer
            .chunks(COMP1_BLOCK_BYTES)
            .enumerate()
            .map(|(idx, chunk)| L3DataPacket {
                service_id: ServiceId::Transmission1Mode,
                decode_id_flag: false,
                end_of_information: (idx + 1) * COMP1_BLOCK_BYTES >= buffer.len(),
                update_flag: 0,
                data_group_number: group_number,
                data_packet_number: idx as u16,
                data_block: chunk.to_vec(),
            })
            .collect()
    }

    #[test]
    fn reassembles_across_packets() {
        let group = comp1_group(&[0x5A; 40]);
        let packets = comp1_packets(group.data_group_number, &group.to_buffer());
        assert!(packets.len() > 1);

        let mut decoder = L4DataGroupDecoder::new();
        let groups = decoder.push_data_packets(&packets);
        assert_eq!(groups.len(), 1);
        assert_eq!(decoder.open_groups(), 0);
        match &groups[0] {
            L4DataGroup::Comp1(parsed) => {
                assert_eq!(parsed, &group);
                assert!(parsed.is_crc_valid());
            }
            other => panic!("expected composition 1, got {other:?}"),
        }
    }

    #[test]
    fn drops_packets_without_an_open_buffer() {
        let group = comp1_group(&[0x5A; 40]);
        let mut packets = comp1_packets(group.data_group_number, &group.to_buffer());
        packets.remove(0);

        let mut decoder = L4DataGroupDecoder::new();
        let groups = decoder.push_data_packets(&packets);
        assert!(groups.is_empty());
        assert_eq!(decoder.missing_first_drops, packets.len() as u64);
        assert_eq!(decoder.open_groups(), 0);
    }

    #[test]
    fn interleaved_groups_reassemble_independently() {
        let group_a = comp1_group(&[0xAA; 40]);
        let group_b = comp1_group(&[0xBB; 58]);
        let packets_a = comp1_packets(0x21, &group_a.to_buffer());
        let packets_b: Vec<_> = comp1_packets(0x22, &group_b.to_buffer())
            .into_iter()
            .map(|mut p| {
                p.data_group_number = 0x22;
                p
            })
            .collect();

        let mut interleaved = Vec::new();
        let mut a = packets_a.into_iter();
        let mut b = packets_b.into_iter();
        loop {
            match (a.next(), b.next()) {
                (None, None) => break,
                (pa, pb) => {
                    interleaved.extend(pa);
                    interleaved.extend(pb);
                }
            }
        }

        let mut decoder = L4DataGroupDecoder::new();
        let groups = decoder.push_data_packets(&interleaved);
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| g.is_crc_valid()));
    }

    #[test]
    fn open_group_cap_evicts_the_oldest() {
        let mut decoder = L4DataGroupDecoder::new();
        let open_packet = |group: u16| L3DataPacket {
            service_id: ServiceId::Transmission1Mode,
            decode_id_flag: false,
            end_of_information: false,
            update_flag: 0,
            data_group_number: group,
            data_packet_number: 0,
            data_block: vec![0u8; COMP1_BLOCK_BYTES],
        };
        for group in 0..(MAX_OPEN_GROUPS as u16 + 1) {
            decoder.push_data_packets(&[open_packet(group)]);
        }
        assert_eq!(decoder.open_groups(), MAX_OPEN_GROUPS);
        assert_eq!(decoder.evictions, 1);
    }
}
