//! The eight L5 data-header variants.
//!
//! A composition-1 group payload opens with a two-byte header: the
//! information separator `0x1E` and a parameter byte selecting the
//! variant. The general approach mirrors the layer above it - peek the
//! parameter, then hand the stream to the matching parser - and every
//! variant can re-encode itself bit-exactly for round-trip checks.

use crate::helpers::{BitReader, BitWriter};
use crate::position::MapPosition;
use crate::DarcError;

/// Separator byte opening every data header.
pub const INFORMATION_SEPARATOR: u8 = 0x1E;

/// The map block shared by the "B" header variants: two undefined bits, a
/// prefecture code, map kind/zoom, and the 12-bit position pair (split
/// 8/8/4/4 on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MapReference {
    pub undefined: u8,
    pub prefecture_identifier: u8,
    pub map_type: u8,
    pub map_zoom: u8,
    pub position: MapPosition,
}

impl MapReference {
    fn read(reader: &mut BitReader) -> Result<Self, DarcError> {
        let undefined = reader.u(2)? as u8;
        let prefecture_identifier = reader.u(6)? as u8;
        let map_type = reader.u(4)? as u8;
        let map_zoom = reader.u(4)? as u8;
        let x_high = reader.u(8)? as u16;
        let y_high = reader.u(8)? as u16;
        let x_low = reader.u(4)? as u16;
        let y_low = reader.u(4)? as u16;
        Ok(Self {
            undefined,
            prefecture_identifier,
            map_type,
            map_zoom,
            position: MapPosition::new(x_high << 4 | x_low, y_high << 4 | y_low),
        })
    }

    fn write(&self, writer: &mut BitWriter) {
        writer.put(self.undefined as u64, 2);
        writer.put(self.prefecture_identifier as u64, 6);
        writer.put(self.map_type as u64, 4);
        writer.put(self.map_zoom as u64, 4);
        writer.put((self.position.x >> 4) as u64, 8);
        writer.put((self.position.y >> 4) as u64, 8);
        writer.put((self.position.x & 0x0F) as u64, 4);
        writer.put((self.position.y & 0x0F) as u64, 4);
    }
}

/// The link block closing the PageDataB / ProgramCommonMacroB variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkReference {
    pub link_layer: u8,
    pub link_type: u8,
    pub reference_link_number: u16,
}

impl LinkReference {
    fn read(reader: &mut BitReader) -> Result<Self, DarcError> {
        let link_layer = reader.u(2)? as u8;
        let link_type = reader.u(2)? as u8;
        let high = reader.u(4)? as u16;
        let low = reader.u(8)? as u16;
        Ok(Self {
            link_layer,
            link_type,
            reference_link_number: high << 8 | low,
        })
    }

    fn write(&self, writer: &mut BitWriter) {
        writer.put(self.link_layer as u64, 2);
        writer.put(self.link_type as u64, 2);
        writer.put((self.reference_link_number >> 8) as u64, 4);
        writer.put((self.reference_link_number & 0xFF) as u64, 8);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgramDataHeaderA {
    pub program_number: u8,
    pub content_change: u8,
    pub total_pages: u8,
    pub display_instruction: u8,
    pub information_type: u8,
    pub display_format: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgramDataHeaderB {
    pub program_number: u8,
    pub content_update: u8,
    pub total_pages: u8,
    pub display_instruction: u8,
    pub information_type: u8,
    pub display_format: u8,
    pub map: MapReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageDataHeaderA {
    pub program_number: u8,
    pub content_update: u8,
    pub total_pages: u8,
    pub display_instruction: u8,
    pub information_type: u8,
    pub display_format: u8,
    pub header_raster_color: u8,
    pub raster_color: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageDataHeaderB {
    pub program_number: u8,
    pub content_update: u8,
    pub page_number: u8,
    pub display_instruction: u8,
    pub information_type: u8,
    pub display_format: u8,
    pub header_raster_color: u8,
    pub raster_color: u8,
    pub map: MapReference,
    pub content_type: u8,
    pub information_deliver_time_flag: bool,
    pub information_deliver_time_hour: u8,
    pub information_deliver_time_minute: u8,
    pub link: LinkReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgramCommonMacroDataHeaderA {
    pub display_instruction: u8,
    pub update: u8,
    pub undefined: u8,
    pub display_format: u8,
    pub program_common_macro_set: u8,
    pub program_common_macro_set_code: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgramCommonMacroDataHeaderB {
    pub display_instruction: u8,
    pub update: u8,
    pub undefined: u8,
    pub display_format: u8,
    pub program_common_macro_set: u8,
    pub program_common_macro_set_code: u16,
    pub map: MapReference,
    pub link: LinkReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContinueDataHeader;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgramIndexDataHeader {
    pub undefined: u8,
    pub index_control: u8,
}

/// A parsed data header, tagged by its parameter byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataHeader {
    ProgramA(ProgramDataHeaderA),
    ProgramB(ProgramDataHeaderB),
    PageA(PageDataHeaderA),
    PageB(PageDataHeaderB),
    ProgramCommonMacroA(ProgramCommonMacroDataHeaderA),
    ProgramCommonMacroB(ProgramCommonMacroDataHeaderB),
    Continue(ContinueDataHeader),
    ProgramIndex(ProgramIndexDataHeader),
}

impl DataHeader {
    /// The parameter byte identifying this variant on the wire.
    pub fn parameter(&self) -> u8 {
        match self {
            DataHeader::ProgramA(_) => 0x30,
            DataHeader::ProgramB(_) => 0x31,
            DataHeader::PageA(_) => 0x32,
            DataHeader::PageB(_) => 0x33,
            DataHeader::ProgramCommonMacroA(_) => 0x34,
            DataHeader::ProgramCommonMacroB(_) => 0x35,
            DataHeader::Continue(_) => 0x36,
            DataHeader::ProgramIndex(_) => 0x37,
        }
    }

    /// Re-encode the header, separator and parameter included.
    pub fn to_buffer(&self) -> Vec<u8> {
        let mut writer = BitWriter::new();
        writer.put(INFORMATION_SEPARATOR as u64, 8);
        writer.put(self.parameter() as u64, 8);
        match self {
            DataHeader::ProgramA(h) => {
                writer.put(h.program_number as u64, 8);
                writer.put(h.content_change as u64, 2);
                writer.put(h.total_pages as u64, 6);
                writer.put(h.display_instruction as u64, 8);
                writer.put(h.information_type as u64, 4);
                writer.put(h.display_format as u64, 4);
            }
            DataHeader::ProgramB(h) => {
                writer.put(h.program_number as u64, 8);
                writer.put(h.content_update as u64, 2);
                writer.put(h.total_pages as u64, 6);
                writer.put(h.display_instruction as u64, 8);
                writer.put(h.information_type as u64, 4);
                writer.put(h.display_format as u64, 4);
                h.map.write(&mut writer);
            }
            DataHeader::PageA(h) => {
                writer.put(h.program_number as u64, 8);
                writer.put(h.content_update as u64, 2);
                writer.put(h.total_pages as u64, 6);
                writer.put(h.display_instruction as u64, 8);
                writer.put(h.information_type as u64, 4);
                writer.put(h.display_format as u64, 4);
                writer.put(h.header_raster_color as u64, 4);
                writer.put(h.raster_color as u64, 4);
            }
            DataHeader::PageB(h) => {
                writer.put(h.program_number as u64, 8);
                writer.put(h.content_update as u64, 2);
                writer.put(h.page_number as u64, 6);
                writer.put(h.display_instruction as u64, 8);
                writer.put(h.information_type as u64, 4);
                writer.put(h.display_format as u64, 4);
                writer.put(h.header_raster_color as u64, 4);
                writer.put(h.raster_color as u64, 4);
                h.map.write(&mut writer);
                writer.put(h.content_type as u64, 4);
                writer.put_flag(h.information_deliver_time_flag);
                writer.put((h.information_deliver_time_hour >> 2) as u64, 3);
                writer.put((h.information_deliver_time_hour & 0x03) as u64, 2);
                writer.put(h.information_deliver_time_minute as u64, 6);
                h.link.write(&mut writer);
            }
            DataHeader::ProgramCommonMacroA(h) => {
                writer.put(h.display_instruction as u64, 8);
                writer.put(h.update as u64, 1);
                writer.put(h.undefined as u64, 3);
                writer.put(h.display_format as u64, 4);
                writer.put(h.program_common_macro_set as u64, 8);
                writer.put(h.program_common_macro_set_code as u64, 16);
            }
            DataHeader::ProgramCommonMacroB(h) => {
                writer.put(h.display_instruction as u64, 8);
                writer.put(h.update as u64, 1);
                writer.put(h.undefined as u64, 3);
                writer.put(h.display_format as u64, 4);
                writer.put(h.program_common_macro_set as u64, 8);
                writer.put(h.program_common_macro_set_code as u64, 16);
                h.map.write(&mut writer);
                h.link.write(&mut writer);
            }
            DataHeader::Continue(_) => {}
            DataHeader::ProgramIndex(h) => {
                writer.put(h.undefined as u64, 6);
                writer.put(h.index_control as u64, 2);
            }
        }
        writer.into_bytes()
    }
}

/// Peek the two-byte header and parse the matching variant.
///
/// Returns `Ok(None)` for an unknown parameter byte, leaving the stream
/// untouched so the caller can decide what to do with the group.
pub fn read_data_header(reader: &mut BitReader) -> Result<Option<DataHeader>, DarcError> {
    let preview = reader.peek_u(16)?;
    let parameter = (preview & 0xFF) as u8;
    if !(0x30..=0x37).contains(&parameter) {
        return Ok(None);
    }

    let separator = reader.u(8)? as u8;
    if separator != INFORMATION_SEPARATOR {
        return Err(DarcError::InvalidSeparator(separator));
    }
    reader.u(8)?; // the parameter, already known

    let header = match parameter {
        0x30 => DataHeader::ProgramA(ProgramDataHeaderA {
            program_number: reader.u(8)? as u8,
            content_change: reader.u(2)? as u8,
            total_pages: reader.u(6)? as u8,
            display_instruction: reader.u(8)? as u8,
            information_type: reader.u(4)? as u8,
            display_format: reader.u(4)? as u8,
        }),
        0x31 => DataHeader::ProgramB(ProgramDataHeaderB {
            program_number: reader.u(8)? as u8,
            content_update: reader.u(2)? as u8,
            total_pages: reader.u(6)? as u8,
            display_instruction: reader.u(8)? as u8,
            information_type: reader.u(4)? as u8,
            display_format: reader.u(4)? as u8,
            map: MapReference::read(reader)?,
        }),
        0x32 => DataHeader::PageA(PageDataHeaderA {
            program_number: reader.u(8)? as u8,
            content_update: reader.u(2)? as u8,
            total_pages: reader.u(6)? as u8,
            display_instruction: reader.u(8)? as u8,
            information_type: reader.u(4)? as u8,
            display_format: reader.u(4)? as u8,
            header_raster_color: reader.u(4)? as u8,
            raster_color: reader.u(4)? as u8,
        }),
        0x33 => {
            let program_number = reader.u(8)? as u8;
            let content_update = reader.u(2)? as u8;
            let page_number = reader.u(6)? as u8;
            let display_instruction = reader.u(8)? as u8;
            let information_type = reader.u(4)? as u8;
            let display_format = reader.u(4)? as u8;
            let header_raster_color = reader.u(4)? as u8;
            let raster_color = reader.u(4)? as u8;
            let map = MapReference::read(reader)?;
            let content_type = reader.u(4)? as u8;
            let information_deliver_time_flag = reader.flag()?;
            let hour_high = reader.u(3)? as u8;
            let hour_low = reader.u(2)? as u8;
            let information_deliver_time_minute = reader.u(6)? as u8;
            let link = LinkReference::read(reader)?;
            DataHeader::PageB(PageDataHeaderB {
                program_number,
                content_update,
                page_number,
                display_instruction,
                information_type,
                display_format,
                header_raster_color,
                raster_color,
                map,
                content_type,
                information_deliver_time_flag,
                information_deliver_time_hour: hour_high << 2 | hour_low,
                information_deliver_time_minute,
                link,
            })
        }
        0x34 => DataHeader::ProgramCommonMacroA(ProgramCommonMacroDataHeaderA {
            display_instruction: reader.u(8)? as u8,
            update: reader.u(1)? as u8,
            undefined: reader.u(3)? as u8,
            display_format: reader.u(4)? as u8,
            program_common_macro_set: reader.u(8)? as u8,
            program_common_macro_set_code: reader.u(16)? as u16,
        }),
        0x35 => DataHeader::ProgramCommonMacroB(ProgramCommonMacroDataHeaderB {
            display_instruction: reader.u(8)? as u8,
            update: reader.u(1)? as u8,
            undefined: reader.u(3)? as u8,
            display_format: reader.u(4)? as u8,
            program_common_macro_set: reader.u(8)? as u8,
            program_common_macro_set_code: reader.u(16)? as u16,
            map: MapReference::read(reader)?,
            link: LinkReference::read(reader)?,
        }),
        0x36 => DataHeader::Continue(ContinueDataHeader),
        0x37 => DataHeader::ProgramIndex(ProgramIndexDataHeader {
            undefined: reader.u(6)? as u8,
            index_control: reader.u(2)? as u8,
        }),
        _ => unreachable!("parameter range checked above"),
    };

    Ok(Some(header))
}
