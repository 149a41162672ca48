//! Feeds decoded parking records into the shared store, with coordinates
//! resolved to WGS-84.

use std::sync::Arc;

use darclib::l5::headers::DataHeader;
use darclib::l5::{decode_data_unit, DataUnitItem, L5Data, TypedDataUnit};
use darclib::position::tokyo_to_wgs84;
use darclib::DarcEvent;

use crate::store::ParkingStore;

use super::{Handler, HandlerError};

pub struct ParkingHandler {
    store: Arc<ParkingStore>,
    /// Records upserted so far.
    pub records_stored: u64,
}

impl ParkingHandler {
    pub fn new(store: Arc<ParkingStore>) -> Self {
        Self {
            store,
            records_stored: 0,
        }
    }
}

impl Handler for ParkingHandler {
    fn handle(&mut self, event: &DarcEvent) -> Result<(), HandlerError> {
        // Unreliable groups never reach the map.
        if !event.group.is_crc_valid() {
            return Err(HandlerError::Skipped);
        }

        // Parking units are only positioned through a PageDataB header,
        // whose map block names the second mesh of the coordinates.
        let L5Data::Group {
            header: Some(DataHeader::PageB(header)),
            units,
        } = &event.data
        else {
            return Err(HandlerError::Skipped);
        };

        for item in units {
            let DataUnitItem::Unit(unit) = item else {
                continue;
            };
            let Some(TypedDataUnit::Parking(parking)) = decode_data_unit(unit) else {
                continue;
            };
            for record in parking.records {
                let (lat_t, lon_t) = header.map.position.to_tokyo_degrees(
                    record.center_x as u32,
                    record.center_y as u32,
                    false,
                );
                let (lat_w, lon_w) = tokyo_to_wgs84(lat_t, lon_t);
                self.store.upsert(lat_w, lon_w, record);
                self.records_stored += 1;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use darclib::l3::ServiceId;
    use darclib::l4::{L4DataGroup, L4DataGroup2};
    use darclib::l5::headers::{MapReference, PageDataHeaderB};
    use darclib::l5::{GenericDataUnit, Segment, PARAMETER_PARKING};
    use darclib::position::MapPosition;

    fn parking_event() -> DarcEvent {
        let header = PageDataHeaderB {
            map: MapReference {
                position: MapPosition::new(0x8E8, 0x848),
                ..Default::default()
            },
            ..Default::default()
        };
        let unit = GenericDataUnit {
            data_unit_parameter: PARAMETER_PARKING,
            data_unit_link_flag: 0,
            // Basic record at grid (651, 132).
            data: vec![0b00_000_1_00, 0x02, 0x8B, 0x00, 0x84],
        };
        // Composition irrelevant for the handler; a CRC-less comp-2 shell
        // keeps the test fixture small.
        let group = L4DataGroup::Comp2(L4DataGroup2 {
            service_id: ServiceId::AdditionalInformation,
            data_group_number: 0,
            segments_data: Vec::new(),
            crc: None,
        });
        DarcEvent {
            group,
            data: L5Data::Group {
                header: Some(DataHeader::PageB(header)),
                units: vec![DataUnitItem::Unit(unit)],
            },
        }
    }

    #[test]
    fn stores_parking_records_in_wgs84() {
        let store = Arc::new(ParkingStore::new());
        let mut handler = ParkingHandler::new(store.clone());
        handler.handle(&parking_event()).unwrap();

        assert_eq!(handler.records_stored, 1);
        let geojson = store.to_geojson();
        let coords = geojson["features"][0]["geometry"]["coordinates"]
            .as_array()
            .unwrap();
        // Grid (651, 132) in second mesh (0x8E8, 0x848), via the GSI
        // Tokyo-to-WGS-84 formula.
        assert!((coords[0].as_f64().unwrap() - 139.754929).abs() < 1e-4);
        assert!((coords[1].as_f64().unwrap() - 35.670994).abs() < 1e-4);
    }

    #[test]
    fn skips_segments() {
        let store = Arc::new(ParkingStore::new());
        let mut handler = ParkingHandler::new(store.clone());
        let event = DarcEvent {
            group: L4DataGroup::Comp2(L4DataGroup2 {
                service_id: ServiceId::AdditionalInformation,
                data_group_number: 0,
                segments_data: Vec::new(),
                crc: None,
            }),
            data: L5Data::Segment(Segment {
                segment_identifier: 1,
                other_station_number: None,
                other_station_segment_identifier: None,
                segment_data: Vec::new(),
            }),
        };
        assert!(matches!(handler.handle(&event), Err(HandlerError::Skipped)));
        assert!(store.is_empty());
    }
}
