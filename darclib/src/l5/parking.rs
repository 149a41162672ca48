//! Data unit 0x42: parking lot status.
//!
//! Each record carries a vacancy status and a 16-bit coordinate pair on
//! the 10,000-grid of the second mesh named by the group's data header.
//! Ext-1 adds entrance information, Ext-2 adds vacancy rate, fees and
//! opening hours; most Ext-2 fields use reserved values for "unknown".

use crate::helpers::{read_name, safe_enum, AribString, BitReader, BitstreamParseError, LinkType};
use crate::l5::GenericDataUnit;

safe_enum! {
    /// Which extensions follow each record.
    pub enum ParkingExtFlag {
        Basic = 0,
        BasicExt1 = 1,
        BasicExt1Ext2 = 2,
        ModeReserved = 3,
    }
    fallback ModeReserved
}

safe_enum! {
    /// Vacancy status of the lot.
    pub enum VacancyStatus {
        Empty = 0,
        Congested = 1,
        Full = 2,
        Closed = 3,
        Undefined4 = 4,
        Undefined5 = 5,
        Undefined6 = 6,
        Unknown = 7,
    }
    fallback Unknown
}

safe_enum! {
    /// Entrance-distance step (one bit on the wire).
    pub enum ParkingDistanceUnit {
        TenM = 0,
        HundredM = 1,
    }
    fallback TenM
}

safe_enum! {
    /// Capacity bracket of the lot.
    pub enum CapacityClass {
        Under20 = 0,
        Under50 = 1,
        Under100 = 2,
        Under200 = 3,
        Under500 = 4,
        Under1000 = 5,
        Over1000 = 6,
        Unknown = 7,
    }
    fallback Unknown
}

safe_enum! {
    pub enum HeightLimit {
        None = 0,
        Limited = 1,
        Undefined = 2,
        Unknown = 3,
    }
    fallback Unknown
}

safe_enum! {
    pub enum VehicleLimit {
        None = 0,
        LargeVehicle = 1,
        ThreeNumber = 2,
        Undefined3 = 3,
        Undefined4 = 4,
        Undefined5 = 5,
        Other = 6,
        Unknown = 7,
    }
    fallback Unknown
}

safe_enum! {
    pub enum DiscountCondition {
        None = 0,
        Exists = 1,
        Undefined = 2,
        Unknown = 3,
    }
    fallback Unknown
}

safe_enum! {
    /// Billing period the fee code applies to.
    pub enum FeeUnit {
        Min30 = 0,
        Hour1 = 1,
        Hour2 = 2,
        Hour3 = 3,
        HalfDay = 4,
        OneDay = 5,
        Once = 6,
        Unknown = 7,
    }
    fallback Unknown
}

/// Ext-1: entrance location and optional name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParkingExt1 {
    pub mesh_flag: bool,
    pub name_flag: bool,
    pub link_type: LinkType,
    pub link_number: u16,
    pub distance_unit: ParkingDistanceUnit,
    pub entrance_distance_raw: u8,
    pub entrance_x: Option<u16>,
    pub entrance_y: Option<u16>,
    pub name: Option<AribString>,
}

impl ParkingExt1 {
    /// Distance to the entrance in metres; raw 127 means unknown.
    pub fn entrance_distance_m(&self) -> Option<u32> {
        if self.entrance_distance_raw == 127 {
            return None;
        }
        let factor = match self.distance_unit {
            ParkingDistanceUnit::TenM => 10,
            ParkingDistanceUnit::HundredM => 100,
        };
        Some(self.entrance_distance_raw as u32 * factor)
    }

    fn parse(reader: &mut BitReader) -> Result<Self, BitstreamParseError> {
        let mesh_flag = reader.flag()?;
        let name_flag = reader.flag()?;
        let link_type = LinkType::from(reader.u(2)? as u8);
        let link_number = reader.u(12)? as u16;
        let distance_unit = ParkingDistanceUnit::from(reader.u(1)? as u8);
        let entrance_distance_raw = reader.u(7)? as u8;

        let (entrance_x, entrance_y) = if mesh_flag {
            (Some(reader.u(16)? as u16), Some(reader.u(16)? as u16))
        } else {
            (None, None)
        };

        let name = if name_flag {
            Some(read_name(reader)?)
        } else {
            None
        };

        Ok(Self {
            mesh_flag,
            name_flag,
            link_type,
            link_number,
            distance_unit,
            entrance_distance_raw,
            entrance_x,
            entrance_y,
            name,
        })
    }
}

/// Ext-2 (6 bytes): vacancy rate, fee and opening hours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParkingExt2 {
    pub vacancy_rate_raw: u8,
    pub waiting_time_raw: u8,
    pub capacity_class: CapacityClass,
    pub height_limit: HeightLimit,
    pub vehicle_limit: VehicleLimit,
    pub discount_condition: DiscountCondition,
    pub fee_unit: FeeUnit,
    pub fee_code_raw: u16,
    pub start_hour_raw: u8,
    pub start_min_raw: u8,
    pub end_hour_raw: u8,
    pub end_min_raw: u8,
}

impl ParkingExt2 {
    /// Vacancy rate in percent; raw 15 means unknown.
    pub fn vacancy_rate_pct(&self) -> Option<u32> {
        (self.vacancy_rate_raw != 15).then_some(self.vacancy_rate_raw as u32 * 10)
    }

    /// Waiting time in minutes; raw 15 means unknown.
    pub fn waiting_time_min(&self) -> Option<u32> {
        (self.waiting_time_raw != 15).then_some(self.waiting_time_raw as u32 * 10)
    }

    /// Fee in yen for one [`FeeUnit`]; raw 2047 means unknown.
    pub fn fee_yen(&self) -> Option<u32> {
        (self.fee_code_raw != 2047).then_some(self.fee_code_raw as u32 * 10)
    }

    pub fn start_hour(&self) -> Option<u8> {
        (self.start_hour_raw < 24).then_some(self.start_hour_raw)
    }

    /// Opening minute, scaled from the ten-minute field; raw >= 6 unknown.
    pub fn start_minute(&self) -> Option<u8> {
        (self.start_min_raw < 6).then_some(self.start_min_raw * 10)
    }

    pub fn end_hour(&self) -> Option<u8> {
        (self.end_hour_raw < 24).then_some(self.end_hour_raw)
    }

    pub fn end_minute(&self) -> Option<u8> {
        (self.end_min_raw < 6).then_some(self.end_min_raw * 10)
    }

    fn parse(reader: &mut BitReader) -> Result<Self, BitstreamParseError> {
        Ok(Self {
            vacancy_rate_raw: reader.u(4)? as u8,
            waiting_time_raw: reader.u(4)? as u8,
            capacity_class: CapacityClass::from(reader.u(3)? as u8),
            height_limit: HeightLimit::from(reader.u(2)? as u8),
            vehicle_limit: VehicleLimit::from(reader.u(3)? as u8),
            discount_condition: DiscountCondition::from(reader.u(2)? as u8),
            fee_unit: FeeUnit::from(reader.u(3)? as u8),
            fee_code_raw: reader.u(11)? as u16,
            start_hour_raw: reader.u(5)? as u8,
            start_min_raw: reader.u(3)? as u8,
            end_hour_raw: reader.u(5)? as u8,
            end_min_raw: reader.u(3)? as u8,
        })
    }
}

/// One parking record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParkingRecord {
    pub ext_flag: ParkingExtFlag,
    pub vacancy_status: VacancyStatus,
    /// Cleared when the lot is reserved-use only.
    pub is_general: bool,
    pub center_x: u16,
    pub center_y: u16,
    pub ext1: Option<ParkingExt1>,
    pub ext2: Option<ParkingExt2>,
}

impl ParkingRecord {
    fn parse(reader: &mut BitReader) -> Result<Self, BitstreamParseError> {
        let ext_flag = ParkingExtFlag::from(reader.u(2)? as u8);
        let vacancy_status = VacancyStatus::from(reader.u(3)? as u8);
        let is_general = reader.flag()?;
        reader.u(2)?; // padding

        let center_x = reader.u(16)? as u16;
        let center_y = reader.u(16)? as u16;

        let ext1 = if matches!(
            ext_flag,
            ParkingExtFlag::BasicExt1 | ParkingExtFlag::BasicExt1Ext2
        ) {
            Some(ParkingExt1::parse(reader)?)
        } else {
            None
        };
        let ext2 = if ext_flag == ParkingExtFlag::BasicExt1Ext2 {
            Some(ParkingExt2::parse(reader)?)
        } else {
            None
        };

        Ok(Self {
            ext_flag,
            vacancy_status,
            is_general,
            center_x,
            center_y,
            ext1,
            ext2,
        })
    }
}

/// Decoded 0x42 data unit: records until the stream runs out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParkingDataUnit {
    pub records: Vec<ParkingRecord>,
}

impl ParkingDataUnit {
    pub fn from_generic(generic: &GenericDataUnit) -> Self {
        let mut reader = BitReader::new(&generic.data);
        let mut records = Vec::new();

        while reader.remaining() > 0 {
            let start = reader.pos();
            match ParkingRecord::parse(&mut reader) {
                Ok(record) => records.push(record),
                Err(BitstreamParseError) => break,
            }
            if reader.pos() == start {
                break;
            }
        }

        Self { records }
    }
}
