//! ARIB STD-B3 map coordinates.
//!
//! A position on the broadcast is a pair of 12-bit mesh indices (5 bits of
//! first mesh, 3 bits of second mesh, 4 bits of sub-mesh refinement) plus
//! an optional 10,000 x 10,000 lattice offset within the second mesh.
//! Conversion lands in the Tokyo datum; a closed-form GSI approximation
//! carries it to WGS-84.

/// Grid origin: 24 deg 40 min N.
const LAT_ORIGIN_DEG: f64 = 24.0 + 40.0 / 60.0;
/// Grid origin: 122 deg 00 min E.
const LON_ORIGIN_DEG: f64 = 122.0;

/// First mesh: 40 minutes of latitude by 1 degree of longitude.
const FIRST_MESH_LAT: f64 = 40.0 / 60.0;
const FIRST_MESH_LON: f64 = 1.0;
/// Second mesh: an eighth of the first in both directions.
const SECOND_MESH_LAT: f64 = FIRST_MESH_LAT / 8.0;
const SECOND_MESH_LON: f64 = FIRST_MESH_LON / 8.0;
/// One relative unit on the 10,000-grid inside a second mesh (about a
/// metre on the ground).
const UNIT_LAT: f64 = SECOND_MESH_LAT / 10_000.0;
const UNIT_LON: f64 = SECOND_MESH_LON / 10_000.0;

/// A 12-bit map position pair as carried in L5 data headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MapPosition {
    pub x: u16,
    pub y: u16,
}

/// Decompose a 12-bit mesh value into (first mesh, second mesh, 4-bit
/// refinement).
fn parse_mesh(value: u16) -> (u16, u16, u16) {
    ((value >> 7) & 0x1F, (value >> 4) & 0x07, value & 0x0F)
}

impl MapPosition {
    pub fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    /// Convert to Tokyo-datum decimal degrees.
    ///
    /// `rel_x`/`rel_y` are offsets on the 10,000-grid inside the second
    /// mesh. When `use_rel4` is set the 4-bit sub-mesh refinement carried
    /// in the position itself is applied as well; broadcasts normally use
    /// one refinement or the other, not both, so the default caller passes
    /// `false`.
    pub fn to_tokyo_degrees(&self, rel_x: u32, rel_y: u32, use_rel4: bool) -> (f64, f64) {
        let (x1, x2, x_rel4) = parse_mesh(self.x);
        let (y1, y2, y_rel4) = parse_mesh(self.y);

        let mut lat = LAT_ORIGIN_DEG + y1 as f64 * FIRST_MESH_LAT + y2 as f64 * SECOND_MESH_LAT;
        let mut lon = LON_ORIGIN_DEG + x1 as f64 * FIRST_MESH_LON + x2 as f64 * SECOND_MESH_LON;

        if use_rel4 {
            lat += y_rel4 as f64 * (SECOND_MESH_LAT / 16.0);
            lon += x_rel4 as f64 * (SECOND_MESH_LON / 16.0);
        }

        lat += rel_y as f64 * UNIT_LAT;
        lon += rel_x as f64 * UNIT_LON;
        (lat, lon)
    }

    /// Convert straight to WGS-84 decimal degrees.
    pub fn to_wgs84_degrees(&self, rel_x: u32, rel_y: u32, use_rel4: bool) -> (f64, f64) {
        let (lat, lon) = self.to_tokyo_degrees(rel_x, rel_y, use_rel4);
        tokyo_to_wgs84(lat, lon)
    }
}

/// Tokyo datum to WGS-84, per the GSI closed-form approximation (accurate
/// to a few metres within Japan).
pub fn tokyo_to_wgs84(lat_t: f64, lon_t: f64) -> (f64, f64) {
    let lat_w = lat_t - 0.00010695 * lat_t + 0.000017464 * lon_t + 0.0046017;
    let lon_w = lon_t - 0.000046038 * lat_t - 0.000083043 * lon_t + 0.010040;
    (lat_w, lon_w)
}
