//! Data unit 0x43: section travel time.
//!
//! Each segment announces the travel time over a route given as a start
//! point, an end point and via points. With extension 1 the segment may
//! append groups of alternate routes, each with its own travel time.

use crate::helpers::{read_name, safe_enum, AribString, BitReader, BitstreamParseError, LinkType};
use crate::l5::GenericDataUnit;

safe_enum! {
    /// Segment-level extension flag.
    pub enum SectionTTExtFlag {
        Basic = 0,
        BasicExt1 = 1,
        ModeReserved2 = 2,
        ModeReserved3 = 3,
    }
    fallback ModeReserved3
}

safe_enum! {
    /// Route priority of the primary route.
    pub enum SectionTTPriority {
        Undefined0 = 0,
        Normal = 1,
        Undefined2 = 2,
        Important = 3,
    }
    fallback Undefined0
}

/// A single link reference with optional coordinates and name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionPoint {
    pub mesh_flag: bool,
    pub name_flag: bool,
    pub link_type: LinkType,
    pub link_number: u16,
    pub coord_x_hi: Option<u8>,
    pub coord_y_hi: Option<u8>,
    pub name: Option<AribString>,
}

impl SectionPoint {
    fn parse(reader: &mut BitReader) -> Result<Self, BitstreamParseError> {
        let mesh_flag = reader.flag()?;
        let name_flag = reader.flag()?;
        let link_type = LinkType::from(reader.u(2)? as u8);
        let link_high = reader.u(4)? as u16;
        let link_low = reader.u(8)? as u16;

        let (coord_x_hi, coord_y_hi) = if mesh_flag {
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
            coord_x_hi,
            coord_y_hi,
            name,
        })
    }
}

/// A route and its travel time (primary or alternate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteBlock {
    pub hour_raw: u8,
    pub minute_raw: u8,
    /// Only the primary route carries a priority.
    pub priority: Option<SectionTTPriority>,
    pub link_count: u8,
    /// Points in path order: start, vias, end.
    pub points: Vec<SectionPoint>,
}

impl RouteBlock {
    /// Travel time over the route, in minutes.
    pub fn travel_time_minutes(&self) -> u32 {
        self.hour_raw as u32 * 60 + self.minute_raw as u32
    }
}

/// One group of alternate routes (extension 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AltRouteGroup {
    pub alt_count: u8,
    pub routes: Vec<RouteBlock>,
}

/// A self-contained segment; several can share one data unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionTravelTimeSegment {
    pub ext_flag: SectionTTExtFlag,
    pub primary_route: RouteBlock,
    pub alt_route_groups: Vec<AltRouteGroup>,
}

/// Decoded 0x43 data unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionTravelTimeDataUnit {
    pub segments: Vec<SectionTravelTimeSegment>,
}

impl SectionTravelTimeDataUnit {
    pub fn from_generic(generic: &GenericDataUnit) -> Self {
        let mut reader = BitReader::new(&generic.data);
        let mut segments = Vec::new();

        while reader.remaining() > 0 {
            let start = reader.pos();
            match Self::parse_segment(&mut reader) {
                Ok(segment) => segments.push(segment),
                Err(BitstreamParseError) => break,
            }
            if reader.pos() == start {
                break;
            }
        }

        Self { segments }
    }

    fn parse_segment(reader: &mut BitReader) -> Result<SectionTravelTimeSegment, BitstreamParseError> {
        let ext_flag = SectionTTExtFlag::from(reader.u(2)? as u8);
        reader.u(1)?; // undefined
        let hour_raw = reader.u(5)? as u8;
        let priority = SectionTTPriority::from(reader.u(2)? as u8);
        let minute_raw = reader.u(6)? as u8;
        let link_count = reader.u(8)? as u8;

        // Reserved modes: fast-forward to the end of the data unit.
        if matches!(
            ext_flag,
            SectionTTExtFlag::ModeReserved2 | SectionTTExtFlag::ModeReserved3
        ) {
            reader.set_pos(reader.len());
            return Ok(SectionTravelTimeSegment {
                ext_flag,
                primary_route: RouteBlock {
                    hour_raw,
                    minute_raw,
                    priority: Some(priority),
                    link_count,
                    points: Vec::new(),
                },
                alt_route_groups: Vec::new(),
            });
        }

        let points = Self::parse_points(reader, link_count)?;
        let primary_route = RouteBlock {
            hour_raw,
            minute_raw,
            priority: Some(priority),
            link_count,
            points,
        };

        let mut alt_route_groups = Vec::new();
        if ext_flag == SectionTTExtFlag::BasicExt1 {
            // Alternate groups run until the stream is byte-aligned again,
            // which is where the next segment would start.
            while reader.remaining() >= 8 && reader.pos() % 8 != 0 {
                alt_route_groups.push(Self::parse_alt_group(reader)?);
            }
        }

        Ok(SectionTravelTimeSegment {
            ext_flag,
            primary_route,
            alt_route_groups,
        })
    }

    fn parse_alt_group(reader: &mut BitReader) -> Result<AltRouteGroup, BitstreamParseError> {
        let alt_count = reader.u(5)? as u8;
        reader.u(3)?; // reserved

        let mut routes = Vec::with_capacity(alt_count as usize);
        for _ in 0..alt_count {
            let hour_raw = reader.u(5)? as u8;
            let minute_raw = reader.u(6)? as u8;
            reader.align_byte(); // route blocks start on a byte boundary
            let link_count = reader.u(8)? as u8;
            let points = Self::parse_points(reader, link_count)?;
            routes.push(RouteBlock {
                hour_raw,
                minute_raw,
                priority: None,
                link_count,
                points,
            });
        }

        Ok(AltRouteGroup { alt_count, routes })
    }

    /// Start, end, then `link_count - 2` vias; returned in path order.
    fn parse_points(
        reader: &mut BitReader,
        link_count: u8,
    ) -> Result<Vec<SectionPoint>, BitstreamParseError> {
        let start = SectionPoint::parse(reader)?;
        let end = SectionPoint::parse(reader)?;
        let via_count = (link_count as usize).saturating_sub(2);
        let mut points = Vec::with_capacity(link_count as usize);
        points.push(start);
        for _ in 0..via_count {
            points.push(SectionPoint::parse(reader)?);
        }
        points.push(end);
        Ok(points)
    }
}
