//! Coordinate reference system detection and normalization to WGS84.

use geo::{Coord, MapCoords, MultiPolygon};

/// WGS84 / Web Mercator semi-major axis in metres
const EARTH_RADIUS: f64 = 6_378_137.0;

/// Reference systems the loader can bring to WGS84 degrees
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crs {
    Wgs84,
    WebMercator,
}

impl Crs {
    /// Recognize a GeoJSON `crs.properties.name`.
    ///
    /// Handles the `EPSG:n` short form, OGC URNs (`urn:ogc:def:crs:EPSG::n`,
    /// with or without a version) and `CRS84`.
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        if upper.ends_with("CRS84") {
            return Some(Crs::Wgs84);
        }
        if !upper.contains("EPSG") {
            return None;
        }

        let code = upper.rsplit(':').next()?;
        match code {
            "4326" => Some(Crs::Wgs84),
            "3857" | "3785" | "900913" | "102100" => Some(Crs::WebMercator),
            _ => None,
        }
    }

    pub fn to_wgs84(self, c: Coord<f64>) -> Coord<f64> {
        match self {
            Crs::Wgs84 => c,
            Crs::WebMercator => Coord {
                x: (c.x / EARTH_RADIUS).to_degrees(),
                y: (2.0 * (c.y / EARTH_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2)
                    .to_degrees(),
            },
        }
    }

    pub fn normalize(self, geometry: MultiPolygon<f64>) -> MultiPolygon<f64> {
        match self {
            Crs::Wgs84 => geometry,
            Crs::WebMercator => geometry.map_coords(move |c| self.to_wgs84(c)),
        }
    }
}
