//! Layer 3: data packet extraction.
//!
//! Each information block of a frame carries one 176-bit data packet. The
//! packet header selects one of two compositions: the additional-information
//! service uses short 4-bit group/packet numbers and a 160-bit data block,
//! every other service uses 14/10-bit numbers and a 144-bit data block.
//!
//! Multi-bit header fields are transmitted LSB-first within the field, so
//! the parser reads them MSB-first off the wire and reverses.

use crate::bits::reverse_field;
use crate::helpers::{safe_enum, BitReader, BitstreamParseError};
use crate::l2::{L2Frame, DATA_PACKET_BYTES};

safe_enum! {
    /// Service identification codes (4 bits on the wire).
    pub enum ServiceId {
        Undefined0 = 0x0,
        Transmission1Mode = 0x1,
        Transmission2Mode = 0x2,
        Transmission3Mode = 0x3,
        Transmission4Mode = 0x4,
        Transmission5Mode = 0x5,
        Transmission6Mode = 0x6,
        Transmission7Mode = 0x7,
        Transmission8Mode = 0x8,
        Transmission9Mode = 0x9,
        UndefinedA = 0xA,
        UndefinedB = 0xB,
        UndefinedC = 0xC,
        /// Carries segments (composition 2) rather than data groups.
        AdditionalInformation = 0xD,
        AuxiliarySignal = 0xE,
        OperationalSignal = 0xF,
    }
    fallback Undefined0
}

/// A parsed layer-3 data packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L3DataPacket {
    pub service_id: ServiceId,
    pub decode_id_flag: bool,
    /// Set on the last packet of a data group.
    pub end_of_information: bool,
    pub update_flag: u8,
    pub data_group_number: u16,
    pub data_packet_number: u16,
    /// 18 bytes (composition 1) or 20 bytes (composition 2), packed.
    pub data_block: Vec<u8>,
}

impl L3DataPacket {
    /// Whether this packet uses the composition-2 layout.
    pub fn is_composition_2(&self) -> bool {
        self.service_id == ServiceId::AdditionalInformation
    }

    /// Parse a 176-bit data packet.
    pub fn from_data_packet(
        buffer: &[u8; DATA_PACKET_BYTES],
    ) -> Result<Self, BitstreamParseError> {
        let mut reader = BitReader::new(buffer);

        let service_id = ServiceId::from(reverse_field(reader.u(4)?, 4) as u8);
        let decode_id_flag = reader.flag()?;
        let end_of_information = reader.flag()?;
        let update_flag = reverse_field(reader.u(2)?, 2) as u8;

        let (data_group_number, data_packet_number, data_start) =
            if service_id == ServiceId::AdditionalInformation {
                let group = reverse_field(reader.u(4)?, 4) as u16;
                let packet = reverse_field(reader.u(4)?, 4) as u16;
                (group, packet, 2)
            } else {
                let group = reverse_field(reader.u(14)?, 14) as u16;
                let packet = reverse_field(reader.u(10)?, 10) as u16;
                (group, packet, 4)
            };

        Ok(Self {
            service_id,
            decode_id_flag,
            end_of_information,
            update_flag,
            data_group_number,
            data_packet_number,
            data_block: buffer[data_start..].to_vec(),
        })
    }
}

/// Stateless layer-3 decoder: one data packet per information block.
#[derive(Debug, Default)]
pub struct L3DataPacketDecoder;

impl L3DataPacketDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Extract the data packets of every information block in a frame.
    pub fn push_frame(&self, frame: &L2Frame) -> Vec<L3DataPacket> {
        frame
            .blocks
            .iter()
            .filter_map(|block| L3DataPacket::from_data_packet(&block.data_packet).ok())
            .collect()
    }
}
