//! Layer 5: data headers, data units and segments.
//!
//! A composition-1 group payload is a data header (see [`headers`])
//! followed by a stream of TLV data units separated by `0x1F`. The
//! additional-information service instead delivers a single segment.
//! Typed decoders for the four traffic-domain data units live in the
//! sibling modules and are reached through [`decode_data_unit`].

pub mod headers;
pub mod parking;
pub mod restriction;
pub mod section_tt;
pub mod travel_time;

use log::warn;

use crate::helpers::{BitReader, BitWriter, BitstreamParseError};
use crate::l4::{L4DataGroup, L4DataGroup1, L4DataGroup2};
use crate::DarcError;

pub use headers::{read_data_header, DataHeader, INFORMATION_SEPARATOR};

/// Separator byte opening every data unit.
pub const DATA_UNIT_SEPARATOR: u8 = 0x1F;
/// Padding between data units.
const PADDING_BYTE: u8 = 0x00;

/// Data-unit parameter carrying congestion / travel-time records.
pub const PARAMETER_TRAVEL_TIME: u8 = 0x40;
/// Data-unit parameter carrying restriction / accident records.
pub const PARAMETER_RESTRICTION: u8 = 0x41;
/// Data-unit parameter carrying parking records.
pub const PARAMETER_PARKING: u8 = 0x42;
/// Data-unit parameter carrying section travel-time records.
pub const PARAMETER_SECTION_TRAVEL_TIME: u8 = 0x43;

/// A raw TLV data unit: parameter, link flag, length-prefixed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericDataUnit {
    pub data_unit_parameter: u8,
    pub data_unit_link_flag: u8,
    pub data: Vec<u8>,
}

/// One item of a data-unit stream: either a parsed unit or, after an
/// unexpected separator byte, the raw remainder of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataUnitItem {
    Unit(GenericDataUnit),
    /// Remainder read verbatim; most likely scrambled content.
    Raw(Vec<u8>),
}

impl GenericDataUnit {
    /// Read one unit. A wrong separator demotes the rest of the stream to
    /// [`DataUnitItem::Raw`]; a truncated length field or payload is an
    /// error that ends the stream.
    pub fn read(reader: &mut BitReader) -> Result<DataUnitItem, BitstreamParseError> {
        let start = reader.pos();
        let separator = reader.u(8)? as u8;
        if separator != DATA_UNIT_SEPARATOR {
            warn!("invalid data unit separator: {separator:#04x}");
            reader.set_pos(start);
            return Ok(DataUnitItem::Raw(reader.remaining_bytes()));
        }

        let data_unit_parameter = reader.u(8)? as u8;
        let data_unit_link_flag = reader.u(1)? as u8;
        let size_high = reader.u(7)? as usize;
        let size_low = reader.u(8)? as usize;
        let data = reader.bytes(size_high << 8 | size_low)?;

        Ok(DataUnitItem::Unit(Self {
            data_unit_parameter,
            data_unit_link_flag,
            data,
        }))
    }

    /// Re-encode separator, parameter, link flag, split length and payload.
    pub fn to_buffer(&self) -> Vec<u8> {
        let mut writer = BitWriter::new();
        writer.put(DATA_UNIT_SEPARATOR as u64, 8);
        writer.put(self.data_unit_parameter as u64, 8);
        writer.put(self.data_unit_link_flag as u64, 1);
        writer.put((self.data.len() >> 8) as u64, 7);
        writer.put((self.data.len() & 0xFF) as u64, 8);
        writer.put_bytes(&self.data);
        writer.into_bytes()
    }
}

/// The composition-2 payload form used by the additional-information
/// service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub segment_identifier: u8,
    /// Set when the identifier is `0xE`: this segment relays another
    /// station's data.
    pub other_station_number: Option<u8>,
    pub other_station_segment_identifier: Option<u8>,
    pub segment_data: Vec<u8>,
}

impl Segment {
    pub fn read(reader: &mut BitReader) -> Result<Self, BitstreamParseError> {
        let segment_identifier = reader.u(4)? as u8;

        let (other_station_number, other_station_segment_identifier) =
            if segment_identifier == 0xE {
                (Some(reader.u(4)? as u8), Some(reader.u(4)? as u8))
            } else {
                (None, None)
            };

        let mut length = reader.u(4)? as usize;
        if length == 0xF {
            length = reader.u(8)? as usize;
        }
        let segment_data = reader.bytes(length)?;

        Ok(Self {
            segment_identifier,
            other_station_number,
            other_station_segment_identifier,
            segment_data,
        })
    }
}

/// What layer 5 makes of one data group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum L5Data {
    /// A composition-1 group: the data header (when readable) and the
    /// units that followed it.
    Group {
        header: Option<DataHeader>,
        units: Vec<DataUnitItem>,
    },
    /// A composition-2 group.
    Segment(Segment),
}

/// Layer-5 decoder. Stateless; each group decodes independently.
#[derive(Debug, Default)]
pub struct L5DataDecoder;

impl L5DataDecoder {
    pub fn new() -> Self {
        Self
    }

    pub fn push_data_group(&self, group: &L4DataGroup) -> Result<L5Data, DarcError> {
        match group {
            L4DataGroup::Comp1(group) => self.decode_group1(group),
            L4DataGroup::Comp2(group) => self.decode_group2(group),
        }
    }

    fn decode_group1(&self, group: &L4DataGroup1) -> Result<L5Data, DarcError> {
        let mut reader = BitReader::new(&group.data_group_data);
        let header = read_data_header(&mut reader)?;
        if header.is_none() {
            warn!("failed to read data header");
            return Ok(L5Data::Group {
                header: None,
                units: Vec::new(),
            });
        }

        let mut units = Vec::new();
        while reader.remaining() >= 8 {
            if reader.peek_u(8)? as u8 == PADDING_BYTE {
                reader.u(8)?;
                continue;
            }
            match GenericDataUnit::read(&mut reader) {
                Ok(item) => units.push(item),
                Err(err) => {
                    // Truncated unit: keep what was accumulated.
                    warn!("error reading data unit: {err}");
                    break;
                }
            }
        }

        Ok(L5Data::Group { header, units })
    }

    fn decode_group2(&self, group: &L4DataGroup2) -> Result<L5Data, DarcError> {
        let mut reader = BitReader::new(&group.segments_data);
        Ok(L5Data::Segment(Segment::read(&mut reader)?))
    }
}

/// A data unit decoded into its domain-specific record type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedDataUnit {
    TravelTime(travel_time::TravelTimeDataUnit),
    Restriction(restriction::RestrictionDataUnit),
    Parking(parking::ParkingDataUnit),
    SectionTravelTime(section_tt::SectionTravelTimeDataUnit),
}

/// Decode a generic unit into its typed form, `None` for parameters this
/// implementation has no decoder for.
pub fn decode_data_unit(unit: &GenericDataUnit) -> Option<TypedDataUnit> {
    match unit.data_unit_parameter {
        PARAMETER_TRAVEL_TIME => Some(TypedDataUnit::TravelTime(
            travel_time::TravelTimeDataUnit::from_generic(unit),
        )),
        PARAMETER_RESTRICTION => Some(TypedDataUnit::Restriction(
            restriction::RestrictionDataUnit::from_generic(unit),
        )),
        PARAMETER_PARKING => Some(TypedDataUnit::Parking(
            parking::ParkingDataUnit::from_generic(unit),
        )),
        PARAMETER_SECTION_TRAVEL_TIME => Some(TypedDataUnit::SectionTravelTime(
            section_tt::SectionTravelTimeDataUnit::from_generic(unit),
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::l3::ServiceId;

    fn unit(parameter: u8, payload: &[u8]) -> GenericDataUnit {
        GenericDataUnit {
            data_unit_parameter: parameter,
            data_unit_link_flag: 0,
            data: payload.to_vec(),
        }
    }

    #[test]
    fn generic_unit_round_trip() {
        let original = unit(0x42, &[1, 2, 3, 4, 5]);
        let buffer = original.to_buffer();
        assert_eq!(buffer.len(), 4 + 5);
        let mut reader = BitReader::new(&buffer);
        match GenericDataUnit::read(&mut reader).unwrap() {
            DataUnitItem::Unit(parsed) => assert_eq!(parsed, original),
            DataUnitItem::Raw(raw) => panic!("expected a unit, got raw {raw:?}"),
        }
    }

    #[test]
    fn non_separator_becomes_raw_remainder() {
        let buffer = [0x77, 0xAB, 0xCD];
        let mut reader = BitReader::new(&buffer);
        match GenericDataUnit::read(&mut reader).unwrap() {
            DataUnitItem::Raw(raw) => assert_eq!(raw, buffer.to_vec()),
            DataUnitItem::Unit(unit) => panic!("expected raw bytes, got {unit:?}"),
        }
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn truncated_unit_is_an_error() {
        // Length claims 200 bytes, only 2 present.
        let buffer = [DATA_UNIT_SEPARATOR, 0x42, 0x00, 200, 1, 2];
        let mut reader = BitReader::new(&buffer);
        assert!(GenericDataUnit::read(&mut reader).is_err());
    }

    fn group1_with(payload: Vec<u8>) -> L4DataGroup1 {
        L4DataGroup1 {
            service_id: ServiceId::Transmission1Mode,
            data_group_number: 1,
            data_group_link: 0,
            data_group_data: payload,
            end_of_data_group: 0,
            crc: 0,
        }
    }

    #[test]
    fn group1_header_and_units_with_padding() {
        let header = DataHeader::ProgramA(headers::ProgramDataHeaderA {
            program_number: 5,
            ..Default::default()
        });
        let mut payload = header.to_buffer();
        payload.extend_from_slice(&unit(0x40, &[0x11]).to_buffer());
        payload.extend_from_slice(&[0x00, 0x00]); // inter-unit padding
        payload.extend_from_slice(&unit(0x42, &[0x22, 0x33]).to_buffer());
        payload.push(0x00);

        let decoded = L5DataDecoder::new()
            .push_data_group(&L4DataGroup::Comp1(group1_with(payload)))
            .unwrap();
        match decoded {
            L5Data::Group {
                header: Some(parsed),
                units,
            } => {
                assert_eq!(parsed, header);
                assert_eq!(
                    units,
                    vec![
                        DataUnitItem::Unit(unit(0x40, &[0x11])),
                        DataUnitItem::Unit(unit(0x42, &[0x22, 0x33])),
                    ]
                );
            }
            other => panic!("unexpected decode result: {other:?}"),
        }
    }

    #[test]
    fn group1_unknown_header_yields_empty_group() {
        let decoded = L5DataDecoder::new()
            .push_data_group(&L4DataGroup::Comp1(group1_with(vec![0x1E, 0x99, 0x01])))
            .unwrap();
        assert_eq!(
            decoded,
            L5Data::Group {
                header: None,
                units: Vec::new()
            }
        );
    }

    #[test]
    fn group1_truncated_unit_keeps_earlier_units() {
        let header = DataHeader::Continue(headers::ContinueDataHeader);
        let mut payload = header.to_buffer();
        payload.extend_from_slice(&unit(0x41, &[0x01]).to_buffer());
        // A unit whose declared length runs past the stream.
        payload.extend_from_slice(&[DATA_UNIT_SEPARATOR, 0x40, 0x00, 0xFF, 0xAA]);

        let decoded = L5DataDecoder::new()
            .push_data_group(&L4DataGroup::Comp1(group1_with(payload)))
            .unwrap();
        match decoded {
            L5Data::Group { units, .. } => {
                assert_eq!(units, vec![DataUnitItem::Unit(unit(0x41, &[0x01]))]);
            }
            other => panic!("unexpected decode result: {other:?}"),
        }
    }

    fn group2_with(payload: Vec<u8>) -> L4DataGroup2 {
        L4DataGroup2 {
            service_id: ServiceId::AdditionalInformation,
            data_group_number: 2,
            segments_data: payload,
            crc: None,
        }
    }

    #[test]
    fn segment_with_plain_identifier() {
        let mut writer = BitWriter::new();
        writer.put(0x3, 4); // identifier
        writer.put(2, 4); // length
        writer.put_bytes(&[0xDE, 0xAD]);
        let decoded = L5DataDecoder::new()
            .push_data_group(&L4DataGroup::Comp2(group2_with(writer.into_bytes())))
            .unwrap();
        match decoded {
            L5Data::Segment(segment) => {
                assert_eq!(segment.segment_identifier, 0x3);
                assert_eq!(segment.other_station_number, None);
                assert_eq!(segment.segment_data, vec![0xDE, 0xAD]);
            }
            other => panic!("unexpected decode result: {other:?}"),
        }
    }

    #[test]
    fn segment_with_cross_station_reference_and_extended_length() {
        let body: Vec<u8> = (0..20).collect();
        let mut writer = BitWriter::new();
        writer.put(0xE, 4); // identifier: other-station data
        writer.put(0x5, 4); // other station number
        writer.put(0x2, 4); // other station segment id
        writer.put(0xF, 4); // escape to extended length
        writer.put(body.len() as u64, 8);
        writer.put_bytes(&body);

        let bytes = writer.into_bytes();
        let mut reader = BitReader::new(&bytes);
        let segment = Segment::read(&mut reader).unwrap();
        assert_eq!(segment.segment_identifier, 0xE);
        assert_eq!(segment.other_station_number, Some(0x5));
        assert_eq!(segment.other_station_segment_identifier, Some(0x2));
        assert_eq!(segment.segment_data, body);
    }

    #[test]
    fn typed_dispatch_by_parameter() {
        assert!(decode_data_unit(&unit(0x44, &[])).is_none());
        assert!(matches!(
            decode_data_unit(&unit(PARAMETER_PARKING, &[])),
            Some(TypedDataUnit::Parking(_))
        ));
    }
}
