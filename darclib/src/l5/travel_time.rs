//! Data unit 0x40: congestion and link travel time.
//!
//! Two provide forms share the unit. Form 0 spends a byte per link and can
//! attach the distance extension (Ext-1) and the extended travel time
//! (Ext-2); form 1 is a packed half-byte per link with an optional Ext-1.

use log::debug;

use crate::helpers::{safe_enum, BitReader, BitstreamParseError, DistanceUnit, LinkType, TimeUnit};
use crate::l5::GenericDataUnit;

safe_enum! {
    /// Degree of congestion on a link.
    pub enum CongestionDegree {
        Unknown = 0,
        Free = 1,
        Slow = 2,
        Jam = 3,
    }
    fallback Unknown
}

safe_enum! {
    /// Selects the per-link record layout.
    pub enum ProvideForm {
        /// Rich format: travel time plus optional extensions.
        TravelTime = 0,
        /// Compact format: congestion degree plus optional Ext-1.
        CongestionOnly = 1,
    }
    fallback TravelTime
}

safe_enum! {
    /// Whether the unit reports current or predicted travel times.
    pub enum TravelTimeKind {
        Current = 0,
        Prediction = 1,
    }
    fallback Current
}

/// Form-0 extension flags (the 6-bit field past the congestion degree).
pub const EXT_FLAG_BASIC_EXT1: u8 = 60;
pub const EXT_FLAG_BASIC_EXT1_EXT2: u8 = 61;
pub const EXT_FLAG_RESERVED: u8 = 62;
pub const EXT_FLAG_DISAPPEAR_OR_AGGREGATE: u8 = 63;

/// Ext-1 (2 bytes): congestion head position and jam length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TravelTimeExt1 {
    pub distance_unit: DistanceUnit,
    pub head_pos_raw: u8,
    pub jam_length_raw: u8,
}

impl TravelTimeExt1 {
    /// Distance from the link end to the congestion head, in metres.
    pub fn head_pos_m(&self) -> Option<u32> {
        self.distance_unit.decode(self.head_pos_raw as u32)
    }

    /// Congestion length in metres.
    pub fn jam_length_m(&self) -> Option<u32> {
        self.distance_unit.decode(self.jam_length_raw as u32)
    }

    fn parse(reader: &mut BitReader) -> Result<Self, BitstreamParseError> {
        let b2 = reader.u(8)? as u8;
        let b3 = reader.u(8)? as u8;
        // The unit's two bits ride as the MSB of each byte.
        let unit_bits = ((b2 >> 7) << 1) | (b3 >> 7);
        Ok(Self {
            distance_unit: DistanceUnit::from(unit_bits),
            head_pos_raw: b2 & 0x7F,
            jam_length_raw: b3 & 0x7F,
        })
    }
}

/// Ext-2 (1 byte): extended link travel time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TravelTimeExt2 {
    pub time_unit: TimeUnit,
    pub link_travel_time_raw: u8,
}

impl TravelTimeExt2 {
    pub fn link_travel_time_sec(&self) -> Option<u32> {
        self.time_unit.decode(self.link_travel_time_raw as u32)
    }

    fn parse(reader: &mut BitReader) -> Result<Self, BitstreamParseError> {
        let byte = reader.u(8)? as u8;
        Ok(Self {
            time_unit: TimeUnit::from(byte >> 7),
            link_travel_time_raw: byte & 0x7F,
        })
    }
}

/// One per-link record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TravelTimeLinkRecord {
    pub congestion: CongestionDegree,
    /// Quick travel time in seconds; `None` when unknown or not provided.
    pub travel_time_sec: Option<u32>,
    /// Raw extension flag: 6 bits in form 0, 2 bits in form 1.
    pub ext_flag_raw: u8,
    pub ext1: Option<TravelTimeExt1>,
    pub ext2: Option<TravelTimeExt2>,
}

/// Decoded 0x40 data unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TravelTimeDataUnit {
    pub provide_form: ProvideForm,
    pub travel_time_kind: TravelTimeKind,
    /// One record stood for every link and was replicated.
    pub single_record: bool,
    /// Reserved layout flag; when set the records are not parseable.
    pub mode_flag: bool,
    pub link_count: u16,
    pub link_type: LinkType,
    pub lead_link_number: u16,
    pub records: Vec<TravelTimeLinkRecord>,
}

impl TravelTimeDataUnit {
    pub fn from_generic(generic: &GenericDataUnit) -> Self {
        let mut reader = BitReader::new(&generic.data);
        match Self::parse(&mut reader) {
            Ok(unit) => unit,
            Err(BitstreamParseError) => {
                debug!("travel-time unit truncated in its header");
                Self {
                    provide_form: ProvideForm::TravelTime,
                    travel_time_kind: TravelTimeKind::Current,
                    single_record: false,
                    mode_flag: false,
                    link_count: 0,
                    link_type: LinkType::Other,
                    lead_link_number: 0,
                    records: Vec::new(),
                }
            }
        }
    }

    fn parse(reader: &mut BitReader) -> Result<Self, BitstreamParseError> {
        let provide_form = ProvideForm::from(reader.u(1)? as u8);
        let travel_time_kind = TravelTimeKind::from(reader.u(1)? as u8);
        let single_record = reader.flag()?;
        let mode_flag = reader.flag()?;
        let link_count = (reader.u(4)? << 8 | reader.u(8)?) as u16;
        let _reserved = reader.u(2)?;
        let link_type = LinkType::from(reader.u(2)? as u8);
        let lead_link_number = reader.u(12)? as u16;

        let mut unit = Self {
            provide_form,
            travel_time_kind,
            single_record,
            mode_flag,
            link_count,
            link_type,
            lead_link_number,
            records: Vec::new(),
        };

        // A set mode flag selects a reserved layout; stop right here.
        if mode_flag {
            return Ok(unit);
        }

        let wanted = if single_record { 1 } else { link_count as usize };
        for _ in 0..wanted {
            let record = match provide_form {
                ProvideForm::TravelTime => Self::parse_form0(reader),
                ProvideForm::CongestionOnly => Self::parse_form1(reader),
            };
            match record {
                Ok(record) => unit.records.push(record),
                Err(BitstreamParseError) => {
                    debug!("travel-time unit truncated after {} records", unit.records.len());
                    return Ok(unit);
                }
            }
        }

        // A single record stands for every link in the run.
        if single_record && link_count > 1 {
            if let Some(&record) = unit.records.first() {
                unit.records.resize(link_count as usize, record);
            }
        }

        Ok(unit)
    }

    /// Form 0: a full byte per link, extensions selected by the low 6 bits.
    fn parse_form0(reader: &mut BitReader) -> Result<TravelTimeLinkRecord, BitstreamParseError> {
        let byte = reader.u(8)? as u8;
        let congestion = CongestionDegree::from((byte >> 6) & 0x03);
        let flag = byte & 0x3F;

        let mut record = TravelTimeLinkRecord {
            congestion,
            travel_time_sec: None,
            ext_flag_raw: flag,
            ext1: None,
            ext2: None,
        };

        match flag {
            0 => {}
            1..=59 => record.travel_time_sec = Some(flag as u32 * 10),
            EXT_FLAG_BASIC_EXT1 => record.ext1 = Some(TravelTimeExt1::parse(reader)?),
            EXT_FLAG_BASIC_EXT1_EXT2 => {
                record.ext1 = Some(TravelTimeExt1::parse(reader)?);
                record.ext2 = Some(TravelTimeExt2::parse(reader)?);
            }
            // 62 is reserved and 63 flags a disappeared or aggregated
            // link; neither carries extra bytes.
            _ => {}
        }

        Ok(record)
    }

    /// Form 1: a half byte per link, Ext-1 only.
    fn parse_form1(reader: &mut BitReader) -> Result<TravelTimeLinkRecord, BitstreamParseError> {
        let nibble = reader.u(4)? as u8;
        let ext_flag = (nibble >> 2) & 0x03;
        let congestion = CongestionDegree::from(nibble & 0x03);

        let ext1 = if ext_flag == 1 {
            Some(TravelTimeExt1::parse(reader)?)
        } else {
            None
        };

        Ok(TravelTimeLinkRecord {
            congestion,
            travel_time_sec: None,
            ext_flag_raw: ext_flag,
            ext1,
            ext2: None,
        })
    }
}
