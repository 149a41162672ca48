//! Human-readable dump of every decoded event, for the CLI.

use std::io::Write;

use darclib::helpers::{AribStringDecoder, LossyUtf8Decoder};
use darclib::l4::L4DataGroup;
use darclib::l5::{
    decode_data_unit, DataHeader, DataUnitItem, GenericDataUnit, L5Data, Segment, TypedDataUnit,
};
use darclib::DarcEvent;

use super::{Handler, HandlerError};

const SEP: &str = "--------------------------------------------------------------------------------";
const DSEP: &str = "================================================================================";

/// Writes a dump of groups, headers, data units and segments to a writer
/// (stdout in the CLI).
pub struct DumpHandler<W: Write> {
    out: W,
    arib: LossyUtf8Decoder,
}

impl<W: Write> DumpHandler<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            arib: LossyUtf8Decoder,
        }
    }

    fn dump_group(&mut self, group: &L4DataGroup) -> std::io::Result<()> {
        writeln!(self.out, "{DSEP}")?;
        writeln!(self.out, "DATA GROUP INFORMATION")?;
        writeln!(self.out, "{SEP}")?;
        let kind = match group {
            L4DataGroup::Comp1(_) => "Composition 1",
            L4DataGroup::Comp2(_) => "Composition 2",
        };
        writeln!(self.out, "Type          : {kind}")?;
        writeln!(
            self.out,
            "CRC Status    : {}",
            if group.is_crc_valid() { "Valid" } else { "Invalid" }
        )?;
        writeln!(self.out, "Service ID    : {:?}", group.service_id())?;
        writeln!(self.out, "Group Number  : {:#x}", group.data_group_number())?;
        match group {
            L4DataGroup::Comp1(group) => {
                writeln!(self.out, "Group Link    : {:#x}", group.data_group_link)?;
                writeln!(self.out, "End Marker    : {:#04x}", group.end_of_data_group)?;
                writeln!(self.out, "CRC Value     : {:#06x}", group.crc)?;
            }
            L4DataGroup::Comp2(group) => match group.crc {
                Some(crc) => writeln!(self.out, "CRC Value     : {crc:#06x}")?,
                None => writeln!(self.out, "CRC Value     : None")?,
            },
        }
        writeln!(self.out, "{DSEP}")
    }

    fn dump_header(&mut self, header: &DataHeader) -> std::io::Result<()> {
        writeln!(self.out, "{DSEP}")?;
        writeln!(self.out, "DATA HEADER (parameter {:#04x})", header.parameter())?;
        writeln!(self.out, "{SEP}")?;
        writeln!(self.out, "{header:#?}")?;
        writeln!(self.out, "{DSEP}")
    }

    fn dump_unit(&mut self, unit: &GenericDataUnit, crc_valid: bool) -> std::io::Result<()> {
        writeln!(self.out, "{SEP}")?;
        writeln!(self.out, "GENERIC DATA UNIT")?;
        writeln!(self.out, "Parameter     : {:#04x}", unit.data_unit_parameter)?;
        writeln!(self.out, "Link Flag     : {:#x}", unit.data_unit_link_flag)?;
        writeln!(self.out, "Data          :")?;
        self.hexdump(&unit.data)?;
        // Typed decoding is only trustworthy on groups that passed the CRC.
        if crc_valid {
            match decode_data_unit(unit) {
                Some(TypedDataUnit::TravelTime(typed)) => writeln!(self.out, "{typed:#?}")?,
                Some(TypedDataUnit::Restriction(typed)) => writeln!(self.out, "{typed:#?}")?,
                Some(TypedDataUnit::Parking(typed)) => writeln!(self.out, "{typed:#?}")?,
                Some(TypedDataUnit::SectionTravelTime(typed)) => writeln!(self.out, "{typed:#?}")?,
                None => {}
            }
        }
        writeln!(self.out, "{SEP}")
    }

    fn dump_raw(&mut self, raw: &[u8]) -> std::io::Result<()> {
        writeln!(self.out, "{SEP}")?;
        writeln!(self.out, "RAW DATA (no data unit separator)")?;
        self.hexdump(raw)?;
        writeln!(self.out, "{SEP}")
    }

    fn dump_segment(&mut self, segment: &Segment) -> std::io::Result<()> {
        writeln!(self.out, "{DSEP}")?;
        writeln!(self.out, "SEGMENT INFORMATION")?;
        writeln!(self.out, "{SEP}")?;
        writeln!(self.out, "Identifier    : {:#x}", segment.segment_identifier)?;
        if let (Some(station), Some(id)) = (
            segment.other_station_number,
            segment.other_station_segment_identifier,
        ) {
            writeln!(self.out, "Other Station Number      : {station:#x}")?;
            writeln!(self.out, "Other Station Segment ID  : {id:#x}")?;
        }
        writeln!(self.out, "Segment Data  :")?;
        self.hexdump(&segment.segment_data)?;
        writeln!(
            self.out,
            "Data (ARIBStr): {}",
            self.arib.decode(&segment.segment_data)
        )?;
        writeln!(self.out, "{DSEP}")
    }

    fn hexdump(&mut self, data: &[u8]) -> std::io::Result<()> {
        for (offset, line) in data.chunks(16).enumerate() {
            let hex: Vec<String> = line.iter().map(|b| format!("{b:02x}")).collect();
            let ascii: String = line
                .iter()
                .map(|&b| if (0x20..0x7F).contains(&b) { b as char } else { '.' })
                .collect();
            writeln!(
                self.out,
                "  {:08x}  {:<47}  |{}|",
                offset * 16,
                hex.join(" "),
                ascii
            )?;
        }
        Ok(())
    }
}

impl<W: Write> Handler for DumpHandler<W> {
    fn handle(&mut self, event: &DarcEvent) -> Result<(), HandlerError> {
        self.dump_group(&event.group)?;
        match &event.data {
            L5Data::Segment(segment) => {
                self.dump_segment(segment)?;
                writeln!(self.out).map_err(HandlerError::Io)?;
            }
            L5Data::Group { header, units } => {
                if let Some(header) = header {
                    self.dump_header(header)?;
                }
                let crc_valid = event.group.is_crc_valid();
                for item in units {
                    match item {
                        DataUnitItem::Unit(unit) => self.dump_unit(unit, crc_valid)?,
                        DataUnitItem::Raw(raw) => self.dump_raw(raw)?,
                    }
                }
                writeln!(self.out).map_err(HandlerError::Io)?;
            }
        }
        Ok(())
    }
}
