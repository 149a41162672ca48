//! Data unit 0x41: road restrictions and accidents.
//!
//! A record names a stretch of road as a start block, an end block and any
//! number of via blocks, then optionally attaches detail codes with
//! distance offsets (Ext-1) and a validity period (Ext-2).

use log::debug;

use crate::helpers::{
    read_name, safe_enum, AribString, BitReader, BitstreamParseError, DistanceUnit, LinkType,
};
use crate::l5::GenericDataUnit;

safe_enum! {
    /// Which extensions follow each record.
    pub enum RestrictionExtFlag {
        Basic = 0,
        BasicExt1 = 1,
        BasicExt1Ext2 = 2,
        ModeReserved = 3,
    }
    fallback ModeReserved
}

safe_enum! {
    /// Event that caused the restriction.
    pub enum CauseEvent {
        None = 0,
        Accident = 1,
        Fire = 2,
        Breakdown = 3,
        Obstacle = 4,
        Construction = 5,
        Work = 6,
        Event = 7,
        Weather = 8,
        Disaster = 9,
        EarthquakeWarning = 10,
        Undefined11 = 11,
        Undefined12 = 12,
        Undefined13 = 13,
        Other = 14,
        Unknown = 15,
    }
    fallback Unknown
}

safe_enum! {
    /// What the restriction consists of.
    pub enum RestrictionContent {
        None = 0,
        TrafficStop = 1,
        RightTurnRestrict = 2,
        SpeedLimit = 3,
        LaneRestrict = 4,
        ShoulderRestrict = 5,
        ChainRestrict = 6,
        OnRampRestrict = 7,
        LargeVehicleRestrict = 8,
        TrafficControl = 9,
        OffRampRestrict = 10,
        Undefined11 = 11,
        Undefined12 = 12,
        Undefined13 = 13,
        Other = 14,
        Unknown = 15,
    }
    fallback Unknown
}

/// Ext-1 (4 bytes): detail codes plus distances from the section ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictionExt1 {
    pub restriction_content_detail_raw: u8,
    pub cause_event_detail_raw: u8,
    pub distance_start_unit: DistanceUnit,
    pub distance_end_unit: DistanceUnit,
    pub dist_from_start_raw: u8,
    pub dist_from_end_raw: u8,
}

impl RestrictionExt1 {
    pub fn dist_from_start_m(&self) -> Option<u32> {
        self.distance_start_unit.decode(self.dist_from_start_raw as u32)
    }

    pub fn dist_from_end_m(&self) -> Option<u32> {
        self.distance_end_unit.decode(self.dist_from_end_raw as u32)
    }

    fn parse(reader: &mut BitReader) -> Result<Self, BitstreamParseError> {
        let restriction_content_detail_raw = reader.u(8)? as u8;
        let cause_event_detail_raw = reader.u(8)? as u8;
        let distance_start_unit = DistanceUnit::from(reader.u(2)? as u8);
        let dist_from_start_raw = reader.u(6)? as u8;
        let distance_end_unit = DistanceUnit::from(reader.u(2)? as u8);
        let dist_from_end_raw = reader.u(6)? as u8;
        Ok(Self {
            restriction_content_detail_raw,
            cause_event_detail_raw,
            distance_start_unit,
            distance_end_unit,
            dist_from_start_raw,
            dist_from_end_raw,
        })
    }
}

/// Ext-2 (6 bytes): start and end of the restriction period, at ten-minute
/// resolution. Month 0, day 0, hour >= 24 and minute >= 60 mean unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictionExt2 {
    pub time_flag: bool,
    pub start_month_raw: u8,
    pub end_month_raw: u8,
    pub start_day_raw: u8,
    pub start_hour_raw: u8,
    pub start_min10_raw: u8,
    pub end_day_raw: u8,
    pub end_hour_raw: u8,
    pub end_min10_raw: u8,
}

impl RestrictionExt2 {
    pub fn start_month(&self) -> Option<u8> {
        (self.start_month_raw != 0).then_some(self.start_month_raw)
    }

    pub fn end_month(&self) -> Option<u8> {
        (self.end_month_raw != 0).then_some(self.end_month_raw)
    }

    pub fn start_day(&self) -> Option<u8> {
        (self.start_day_raw != 0).then_some(self.start_day_raw)
    }

    pub fn end_day(&self) -> Option<u8> {
        (self.end_day_raw != 0).then_some(self.end_day_raw)
    }

    pub fn start_hour(&self) -> Option<u8> {
        (self.start_hour_raw < 24).then_some(self.start_hour_raw)
    }

    pub fn end_hour(&self) -> Option<u8> {
        (self.end_hour_raw < 24).then_some(self.end_hour_raw)
    }

    /// Start minute, already scaled from the ten-minute field.
    pub fn start_minute(&self) -> Option<u8> {
        let minute = self.start_min10_raw * 10;
        (minute < 60).then_some(minute)
    }

    pub fn end_minute(&self) -> Option<u8> {
        let minute = self.end_min10_raw * 10;
        (minute < 60).then_some(minute)
    }

    fn parse(reader: &mut BitReader) -> Result<Self, BitstreamParseError> {
        let time_flag = reader.flag()?;
        reader.u(7)?; // undefined
        let start_month_raw = reader.u(4)? as u8;
        let end_month_raw = reader.u(4)? as u8;
        let start_day_raw = reader.u(5)? as u8;
        let start_hour_raw = reader.u(5)? as u8;
        let start_min10_raw = reader.u(6)? as u8;
        let end_day_raw = reader.u(5)? as u8;
        let end_hour_raw = reader.u(5)? as u8;
        let end_min10_raw = reader.u(6)? as u8;
        Ok(Self {
            time_flag,
            start_month_raw,
            end_month_raw,
            start_day_raw,
            start_hour_raw,
            start_min10_raw,
            end_day_raw,
            end_hour_raw,
            end_min10_raw,
        })
    }
}

/// One start/end/via block of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictionBasicInfo {
    pub mesh_flag: bool,
    pub name_flag: bool,
    pub link_type: LinkType,
    pub link_number: u16,
    /// Via blocks only: how many further links this block covers.
    pub continuous_links: Option<u8>,
    /// End and via blocks: upper coordinate bytes when the mesh flag is set.
    pub coord_x_hi: Option<u8>,
    pub coord_y_hi: Option<u8>,
    pub name: Option<AribString>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Start,
    End,
    Via,
}

impl RestrictionBasicInfo {
    fn parse(reader: &mut BitReader, kind: BlockKind) -> Result<Self, BitstreamParseError> {
        let mesh_flag = reader.flag()?;
        let name_flag = reader.flag()?;
        let link_type = LinkType::from(reader.u(2)? as u8);
        let link_high = reader.u(4)? as u16;
        let link_low = reader.u(8)? as u16;

        let continuous_links = if kind == BlockKind::Via {
            Some(reader.u(8)? as u8)
        } else {
            None
        };

        let (coord_x_hi, coord_y_hi) = if kind != BlockKind::Start && mesh_flag {
            (Some(reader.u(8)? as u8), Some(reader.u(8)? as u8))
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
            link_number: link_high << 8 | link_low,
            continuous_links,
            coord_x_hi,
            coord_y_hi,
            name,
        })
    }
}

/// One restriction/accident record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictionRecord {
    pub ext_flag: RestrictionExtFlag,
    pub link_count: u8,
    pub cause_event: CauseEvent,
    pub restriction_content: RestrictionContent,
    pub distance_unit: DistanceUnit,
    pub restriction_length_raw: u8,
    /// Start, end, then via blocks, in wire order.
    pub basics: Vec<RestrictionBasicInfo>,
    pub ext1: Option<RestrictionExt1>,
    pub ext2: Option<RestrictionExt2>,
}

impl RestrictionRecord {
    /// Restriction length in the record's distance unit; 0 and 63 mean
    /// unknown.
    pub fn restriction_length_m(&self) -> Option<u32> {
        if matches!(self.restriction_length_raw, 0 | 63) {
            return None;
        }
        self.distance_unit.decode(self.restriction_length_raw as u32)
    }

    fn parse(reader: &mut BitReader) -> Result<Self, BitstreamParseError> {
        let ext_flag = RestrictionExtFlag::from(reader.u(2)? as u8);
        let link_count = reader.u(6)? as u8;
        let cause_event = CauseEvent::from(reader.u(4)? as u8);
        let restriction_content = RestrictionContent::from(reader.u(4)? as u8);
        let distance_unit = DistanceUnit::from(reader.u(2)? as u8);
        let restriction_length_raw = reader.u(6)? as u8;

        let mut basics = Vec::new();
        let mut remaining = link_count as i32;

        basics.push(RestrictionBasicInfo::parse(reader, BlockKind::Start)?);
        remaining -= 1;

        if remaining >= 1 {
            basics.push(RestrictionBasicInfo::parse(reader, BlockKind::End)?);
            remaining -= 1;
        }

        while remaining > 0 {
            let via = RestrictionBasicInfo::parse(reader, BlockKind::Via)?;
            // A via block stands for itself plus its continuation links.
            let covered = via.continuous_links.unwrap_or(0) as i32 + 1;
            basics.push(via);
            remaining -= covered;
            if remaining < 0 {
                debug!("via blocks cover more links than the record header says");
                return Err(BitstreamParseError);
            }
        }

        let ext1 = if matches!(
            ext_flag,
            RestrictionExtFlag::BasicExt1 | RestrictionExtFlag::BasicExt1Ext2
        ) {
            Some(RestrictionExt1::parse(reader)?)
        } else {
            None
        };
        let ext2 = if ext_flag == RestrictionExtFlag::BasicExt1Ext2 {
            Some(RestrictionExt2::parse(reader)?)
        } else {
            None
        };

        Ok(Self {
            ext_flag,
            link_count,
            cause_event,
            restriction_content,
            distance_unit,
            restriction_length_raw,
            basics,
            ext1,
            ext2,
        })
    }
}

/// Decoded 0x41 data unit: records until the stream runs out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictionDataUnit {
    pub records: Vec<RestrictionRecord>,
}

impl RestrictionDataUnit {
    pub fn from_generic(generic: &GenericDataUnit) -> Self {
        let mut reader = BitReader::new(&generic.data);
        let mut records = Vec::new();

        while reader.remaining() > 0 {
            let start = reader.pos();
            match RestrictionRecord::parse(&mut reader) {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::{BitWriter, LossyUtf8Decoder};

    fn generic(data: Vec<u8>) -> GenericDataUnit {
        GenericDataUnit {
            data_unit_parameter: crate::l5::PARAMETER_RESTRICTION,
            data_unit_link_flag: 0,
            data,
        }
    }

    fn record_header(
        w: &mut BitWriter,
        ext_flag: u8,
        link_count: u8,
        cause: u8,
        content: u8,
        dist_unit: u8,
        length: u8,
    ) {
        w.put(ext_flag as u64, 2);
        w.put(link_count as u64, 6);
        w.put(cause as u64, 4);
        w.put(content as u64, 4);
        w.put(dist_unit as u64, 2);
        w.put(length as u64, 6);
    }

    fn point(w: &mut BitWriter, mesh: bool, name: Option<&str>, link_type: u8, link: u16) {
        w.put_flag(mesh);
        w.put_flag(name.is_some());
        w.put(link_type as u64, 2);
        w.put((link >> 8) as u64, 4);
        w.put((link & 0xFF) as u64, 8);
    }

    #[test]
    fn single_link_record_with_name() {
        let mut w = BitWriter::new();
        record_header(&mut w, 0, 1, 1, 3, 1, 12);
        point(&mut w, false, Some("R1"), 0, 0x5AB);
        w.put(2, 8);
        w.put_bytes(b"R1");

        let unit = RestrictionDataUnit::from_generic(&generic(w.into_bytes()));
        assert_eq!(unit.records.len(), 1);
        let record = &unit.records[0];
        assert_eq!(record.ext_flag, RestrictionExtFlag::Basic);
        assert_eq!(record.cause_event, CauseEvent::Accident);
        assert_eq!(record.restriction_content, RestrictionContent::SpeedLimit);
        assert_eq!(record.restriction_length_m(), Some(1_200));
        assert_eq!(record.basics.len(), 1);
        let start = &record.basics[0];
        assert_eq!(start.link_number, 0x5AB);
        assert_eq!(start.link_type, LinkType::Expressway);
        assert_eq!(
            start.name.as_ref().unwrap().decode(&LossyUtf8Decoder),
            "R1"
        );
        assert!(start.coord_x_hi.is_none());
    }

    #[test]
    fn start_end_via_blocks_and_extensions() {
        let mut w = BitWriter::new();
        record_header(&mut w, 2, 4, 5, 4, 0, 0);
        point(&mut w, false, None, 1, 0x100); // start
        point(&mut w, true, None, 1, 0x101); // end, mesh coords follow
        w.put_bytes(&[0x12, 0x34]);
        point(&mut w, true, None, 1, 0x102); // via
        w.put(1, 8); // one continuation link
        w.put_bytes(&[0x56, 0x78]);
        // Ext-1: details 0x0A/0x0B, 300 m from start, unit undefined at end.
        w.put_bytes(&[0x0A, 0x0B]);
        w.put(1, 2);
        w.put(3, 6);
        w.put(3, 2);
        w.put(9, 6);
        // Ext-2: 3 Apr 08:30 .. 5 Apr 17:50.
        w.put_flag(true);
        w.put(0, 7);
        w.put(4, 4);
        w.put(4, 4);
        w.put(3, 5);
        w.put(8, 5);
        w.put(3, 6);
        w.put(5, 5);
        w.put(17, 5);
        w.put(5, 6);

        let unit = RestrictionDataUnit::from_generic(&generic(w.into_bytes()));
        assert_eq!(unit.records.len(), 1);
        let record = &unit.records[0];
        assert_eq!(record.ext_flag, RestrictionExtFlag::BasicExt1Ext2);
        assert_eq!(record.cause_event, CauseEvent::Construction);
        assert_eq!(record.restriction_length_m(), None); // raw 0
        assert_eq!(record.basics.len(), 3);

        assert_eq!(record.basics[1].coord_x_hi, Some(0x12));
        assert_eq!(record.basics[1].coord_y_hi, Some(0x34));
        assert_eq!(record.basics[2].continuous_links, Some(1));
        assert_eq!(record.basics[2].coord_x_hi, Some(0x56));

        let ext1 = record.ext1.as_ref().unwrap();
        assert_eq!(ext1.restriction_content_detail_raw, 0x0A);
        assert_eq!(ext1.dist_from_start_m(), Some(300));
        assert_eq!(ext1.dist_from_end_m(), None);

        let ext2 = record.ext2.as_ref().unwrap();
        assert!(ext2.time_flag);
        assert_eq!(ext2.start_month(), Some(4));
        assert_eq!(ext2.start_day(), Some(3));
        assert_eq!(ext2.start_hour(), Some(8));
        assert_eq!(ext2.start_minute(), Some(30));
        assert_eq!(ext2.end_day(), Some(5));
        assert_eq!(ext2.end_hour(), Some(17));
        assert_eq!(ext2.end_minute(), Some(50));
    }

    #[test]
    fn ext2_sentinels_mean_unknown() {
        let ext2 = RestrictionExt2 {
            time_flag: false,
            start_month_raw: 0,
            end_month_raw: 13,
            start_day_raw: 0,
            start_hour_raw: 24,
            start_min10_raw: 6,
            end_day_raw: 31,
            end_hour_raw: 31,
            end_min10_raw: 7,
        };
        assert_eq!(ext2.start_month(), None);
        assert_eq!(ext2.end_month(), Some(13));
        assert_eq!(ext2.start_day(), None);
        assert_eq!(ext2.end_day(), Some(31));
        assert_eq!(ext2.start_hour(), None);
        assert_eq!(ext2.end_hour(), None);
        assert_eq!(ext2.start_minute(), None);
        assert_eq!(ext2.end_minute(), None);
    }

    #[test]
    fn multiple_records_until_exhaustion() {
        let mut w = BitWriter::new();
        for link in [0x200u16, 0x300] {
            record_header(&mut w, 0, 1, 0, 0, 0, 5);
            point(&mut w, false, None, 2, link);
        }

        let unit = RestrictionDataUnit::from_generic(&generic(w.into_bytes()));
        assert_eq!(unit.records.len(), 2);
        assert_eq!(unit.records[0].basics[0].link_number, 0x200);
        assert_eq!(unit.records[1].basics[0].link_number, 0x300);
    }

    #[test]
    fn truncated_record_is_discarded() {
        let mut w = BitWriter::new();
        record_header(&mut w, 0, 1, 0, 0, 0, 5);
        point(&mut w, false, None, 2, 0x200);
        // Second record header promising two links, then nothing.
        record_header(&mut w, 0, 2, 0, 0, 0, 5);
        point(&mut w, false, None, 2, 0x201);

        let unit = RestrictionDataUnit::from_generic(&generic(w.into_bytes()));
        assert_eq!(unit.records.len(), 1);
    }

    #[test]
    fn via_overrun_aborts_the_record() {
        let mut w = BitWriter::new();
        record_header(&mut w, 0, 3, 0, 0, 0, 5);
        point(&mut w, false, None, 2, 0x200); // start
        point(&mut w, false, None, 2, 0x201); // end
        point(&mut w, false, None, 2, 0x202); // via...
        w.put(200, 8); // ...claiming 201 links
        w.put_bytes(&[0; 16]);

        let unit = RestrictionDataUnit::from_generic(&generic(w.into_bytes()));
        assert!(unit.records.is_empty());
    }
}
