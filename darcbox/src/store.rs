//! Thread-safe in-memory cache of parking records, deduplicated by
//! coordinate, with GeoJSON snapshots for the map server.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use darclib::helpers::{LinkType, LossyUtf8Decoder};
use darclib::l5::parking::{
    CapacityClass, DiscountCondition, FeeUnit, HeightLimit, ParkingRecord, VacancyStatus,
    VehicleLimit,
};

fn fee_unit_text(unit: FeeUnit) -> &'static str {
    match unit {
        FeeUnit::Min30 => "30分",
        FeeUnit::Hour1 => "1時間",
        FeeUnit::Hour2 => "2時間",
        FeeUnit::Hour3 => "3時間",
        FeeUnit::HalfDay => "半日",
        FeeUnit::OneDay => "1日",
        FeeUnit::Once => "1回",
        FeeUnit::Unknown => "不明",
    }
}

fn capacity_class_text(class: CapacityClass) -> &'static str {
    match class {
        CapacityClass::Under20 => "〜20台",
        CapacityClass::Under50 => "〜50台",
        CapacityClass::Under100 => "〜100台",
        CapacityClass::Under200 => "〜200台",
        CapacityClass::Under500 => "〜500台",
        CapacityClass::Under1000 => "〜1000台",
        CapacityClass::Over1000 => "1000台超",
        CapacityClass::Unknown => "不明",
    }
}

fn vacancy_status_text(status: VacancyStatus) -> &'static str {
    match status {
        VacancyStatus::Empty => "空車",
        VacancyStatus::Congested => "混雑",
        VacancyStatus::Full => "満車",
        VacancyStatus::Closed => "閉鎖",
        _ => "不明",
    }
}

fn vacancy_status_color(status: VacancyStatus) -> &'static str {
    match status {
        VacancyStatus::Empty => "#28a745",
        VacancyStatus::Congested => "#fd7e14",
        VacancyStatus::Full => "#dc3545",
        VacancyStatus::Closed => "#6c757d",
        _ => "#6c757d",
    }
}

fn link_type_text(link_type: LinkType) -> &'static str {
    match link_type {
        LinkType::Expressway => "高速道路",
        LinkType::UrbanExpressway => "都市高速",
        LinkType::Arterial => "主要道",
        LinkType::Other => "その他",
    }
}

fn height_limit_text(limit: HeightLimit) -> &'static str {
    match limit {
        HeightLimit::None => "制限なし",
        HeightLimit::Limited => "制限あり",
        _ => "不明",
    }
}

fn vehicle_limit_text(limit: VehicleLimit) -> &'static str {
    match limit {
        VehicleLimit::None => "制限なし",
        VehicleLimit::LargeVehicle => "大型不可",
        VehicleLimit::ThreeNumber => "3ナンバー不可",
        VehicleLimit::Other => "その他制限",
        _ => "不明",
    }
}

fn discount_text(discount: DiscountCondition) -> &'static str {
    match discount {
        DiscountCondition::None => "割引なし",
        DiscountCondition::Exists => "割引あり",
        _ => "不明",
    }
}

struct StoredParking {
    lat: f64,
    lon: f64,
    record: ParkingRecord,
    updated_at: DateTime<Utc>,
}

/// Deduplicating store: one entry per rounded WGS-84 coordinate.
///
/// All mutation happens under the mutex; readers get a point-in-time
/// snapshot rendered to GeoJSON.
#[derive(Default)]
pub struct ParkingStore {
    data: Mutex<HashMap<String, StoredParking>>,
}

fn round_coord(value: f64) -> f64 {
    (value * 1e7).round() / 1e7
}

impl ParkingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh the record at the given WGS-84 coordinates.
    pub fn upsert(&self, lat: f64, lon: f64, record: ParkingRecord) {
        let lat = round_coord(lat);
        let lon = round_coord(lon);
        let key = format!("P:{lat},{lon}");
        let mut data = self.data.lock().expect("parking store poisoned");
        data.insert(
            key,
            StoredParking {
                lat,
                lon,
                record,
                updated_at: Utc::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.data.lock().expect("parking store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render the current contents as a GeoJSON `FeatureCollection`.
    pub fn to_geojson(&self) -> Value {
        let data = self.data.lock().expect("parking store poisoned");
        let features: Vec<Value> = data
            .iter()
            .map(|(key, stored)| Self::to_feature(key, stored))
            .collect();
        drop(data);
        json!({ "type": "FeatureCollection", "features": features })
    }

    fn to_feature(key: &str, stored: &StoredParking) -> Value {
        let record = &stored.record;
        let mut props = serde_json::Map::new();

        let name = record
            .ext1
            .as_ref()
            .and_then(|ext1| ext1.name.as_ref())
            .map(|name| name.decode(&LossyUtf8Decoder));
        props.insert("name".into(), json!(name));
        props.insert(
            "vacancy_status".into(),
            json!(format!("{:?}", record.vacancy_status).to_uppercase()),
        );
        props.insert(
            "vacancy_status_jp".into(),
            json!(vacancy_status_text(record.vacancy_status)),
        );
        props.insert(
            "vacancy_color".into(),
            json!(vacancy_status_color(record.vacancy_status)),
        );
        props.insert("updated_at".into(), json!(stored.updated_at.to_rfc3339()));

        if let Some(ext1) = &record.ext1 {
            if let Some(distance) = ext1.entrance_distance_m() {
                props.insert("entrance_distance".into(), json!(format!("{distance} m")));
            }
            let road_link = (ext1.link_number != 0)
                .then(|| format!("{} {}", link_type_text(ext1.link_type), ext1.link_number));
            props.insert("road_link".into(), json!(road_link));
        }

        if let Some(ext2) = &record.ext2 {
            props.insert(
                "capacity_class".into(),
                json!(capacity_class_text(ext2.capacity_class)),
            );
            if let Some(rate) = ext2.vacancy_rate_pct() {
                props.insert("vacancy_rate".into(), json!(format!("{rate}%")));
            }
            props.insert(
                "waiting_time".into(),
                json!(format!("{}分", ext2.waiting_time_min().unwrap_or(0))),
            );
            let fee_text = match ext2.fee_yen() {
                Some(fee) => format!("{fee}円 / {}", fee_unit_text(ext2.fee_unit)),
                None => "料金不明".to_string(),
            };
            props.insert("fee_text".into(), json!(fee_text));

            let fmt_time = |hour: Option<u8>, minute: Option<u8>| match (hour, minute) {
                (Some(hour), Some(minute)) => format!("{hour:02}:{minute:02}"),
                _ => "--".to_string(),
            };
            props.insert(
                "hours_text".into(),
                json!(format!(
                    "{} - {}",
                    fmt_time(ext2.start_hour(), ext2.start_minute()),
                    fmt_time(ext2.end_hour(), ext2.end_minute())
                )),
            );
            props.insert(
                "height_limit".into(),
                json!(height_limit_text(ext2.height_limit)),
            );
            props.insert(
                "vehicle_limit".into(),
                json!(vehicle_limit_text(ext2.vehicle_limit)),
            );
            props.insert("discount".into(), json!(discount_text(ext2.discount_condition)));
        }

        json!({
            "type": "Feature",
            "id": key,
            "geometry": { "type": "Point", "coordinates": [stored.lon, stored.lat] },
            "properties": Value::Object(props),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use darclib::helpers::AribString;
    use darclib::l5::parking::{ParkingDistanceUnit, ParkingExt1, ParkingExt2, ParkingExtFlag};

    fn full_record() -> ParkingRecord {
        ParkingRecord {
            ext_flag: ParkingExtFlag::BasicExt1Ext2,
            vacancy_status: VacancyStatus::Full,
            is_general: true,
            center_x: 0x1234,
            center_y: 0x5678,
            ext1: Some(ParkingExt1 {
                mesh_flag: false,
                name_flag: true,
                link_type: LinkType::Arterial,
                link_number: 42,
                distance_unit: ParkingDistanceUnit::TenM,
                entrance_distance_raw: 5,
                entrance_x: None,
                entrance_y: None,
                name: Some(AribString("駐車場".as_bytes().to_vec())),
            }),
            ext2: Some(ParkingExt2 {
                vacancy_rate_raw: 15,
                waiting_time_raw: 15,
                capacity_class: CapacityClass::Under200,
                height_limit: HeightLimit::None,
                vehicle_limit: VehicleLimit::None,
                discount_condition: DiscountCondition::None,
                fee_unit: FeeUnit::Hour1,
                fee_code_raw: 10,
                start_hour_raw: 8,
                start_min_raw: 0,
                end_hour_raw: 22,
                end_min_raw: 3,
            }),
        }
    }

    #[test]
    fn upsert_deduplicates_by_coordinate() {
        let store = ParkingStore::new();
        store.upsert(35.1234567, 139.1234567, full_record());
        store.upsert(35.1234567, 139.1234567, full_record());
        assert_eq!(store.len(), 1);
        store.upsert(35.2, 139.2, full_record());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn geojson_feature_enrichment() {
        let store = ParkingStore::new();
        store.upsert(35.670994, 139.754929, full_record());

        let geojson = store.to_geojson();
        assert_eq!(geojson["type"], "FeatureCollection");
        let features = geojson["features"].as_array().unwrap();
        assert_eq!(features.len(), 1);

        let feature = &features[0];
        assert_eq!(feature["geometry"]["type"], "Point");
        let coords = feature["geometry"]["coordinates"].as_array().unwrap();
        assert!((coords[0].as_f64().unwrap() - 139.754929).abs() < 1e-6);
        assert!((coords[1].as_f64().unwrap() - 35.670994).abs() < 1e-6);

        let props = &feature["properties"];
        assert_eq!(props["name"], "駐車場");
        assert_eq!(props["vacancy_status"], "FULL");
        assert_eq!(props["vacancy_status_jp"], "満車");
        assert_eq!(props["vacancy_color"], "#dc3545");
        assert_eq!(props["fee_text"], "100円 / 1時間");
        assert_eq!(props["hours_text"], "08:00 - 22:30");
        assert_eq!(props["entrance_distance"], "50 m");
        assert_eq!(props["road_link"], "主要道 42");
        assert_eq!(props["capacity_class"], "〜200台");
        // Raw 15 means unknown rate; waiting time falls back to 0 minutes.
        assert!(props["vacancy_rate"].is_null() || props.get("vacancy_rate").is_none());
        assert_eq!(props["waiting_time"], "0分");
    }
}
