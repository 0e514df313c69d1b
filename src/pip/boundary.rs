//! Boundary features parsed from GeoJSON collections.

use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::models::AdminLevel;

/// Attribute carrying the ISO3 country code
pub const COUNTRY_CODE_FIELD: &str = "GID_0";
/// Attribute carrying the country display name
pub const COUNTRY_NAME_FIELD: &str = "COUNTRY";

/// A single admin boundary polygon with its attributes
#[derive(Debug, Clone)]
pub struct BoundaryFeature {
    pub country_code: String,
    pub country_name: String,
    /// Region names for `NAME_1`..`NAME_5`; `None` when not populated
    pub region_names: [Option<String>; 5],
    pub geometry: MultiPolygon<f64>,
    /// Every attribute as found in the source file
    pub properties: Map<String, Value>,
}

impl BoundaryFeature {
    /// Get the bounding box of this boundary
    pub fn bbox(&self) -> Option<(f64, f64, f64, f64)> {
        use geo::BoundingRect;
        self.geometry
            .bounding_rect()
            .map(|rect| (rect.min().x, rect.min().y, rect.max().x, rect.max().y))
    }

    pub fn region_name(&self, level: AdminLevel) -> Option<&str> {
        let idx = usize::from(level.get()).checked_sub(1)?;
        self.region_names.get(idx)?.as_deref()
    }

    /// Build a feature from its GeoJSON properties and an already-normalized geometry
    pub(crate) fn from_parts(
        properties: Map<String, Value>,
        geometry: MultiPolygon<f64>,
    ) -> Result<Self, String> {
        let country_code = text_attribute(&properties, COUNTRY_CODE_FIELD)
            .ok_or_else(|| format!("feature has no {} attribute", COUNTRY_CODE_FIELD))?;
        let country_name = text_attribute(&properties, COUNTRY_NAME_FIELD)
            .unwrap_or_else(|| country_code.clone());

        let mut region_names: [Option<String>; 5] = Default::default();
        for (slot, level) in region_names.iter_mut().zip(AdminLevel::regions()) {
            if let Some(field) = level.name_field() {
                *slot = text_attribute(&properties, &field);
            }
        }

        Ok(Self {
            country_code,
            country_name,
            region_names,
            geometry,
            properties,
        })
    }
}

/// Non-empty string attribute; numbers are accepted and stringified
fn text_attribute(properties: &Map<String, Value>, key: &str) -> Option<String> {
    match properties.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// GeoJSON `FeatureCollection` as stored on disk
#[derive(Debug, Deserialize)]
pub(crate) struct RawCollection {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub crs: Option<Value>,
    pub features: Vec<RawFeature>,
}

impl RawCollection {
    /// Legacy `crs.properties.name`, if declared
    pub fn crs_name(&self) -> Option<&str> {
        self.crs.as_ref()?.get("properties")?.get("name")?.as_str()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawFeature {
    #[serde(default)]
    pub geometry: Option<RawGeometry>,
    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
}

type RawRing = Vec<Vec<f64>>;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub(crate) enum RawGeometry {
    Polygon(Vec<RawRing>),
    MultiPolygon(Vec<Vec<RawRing>>),
}

impl RawGeometry {
    pub fn into_multi_polygon(self) -> Result<MultiPolygon<f64>, String> {
        let polygons = match self {
            RawGeometry::Polygon(rings) => vec![build_polygon(rings)?],
            RawGeometry::MultiPolygon(parts) => parts
                .into_iter()
                .map(build_polygon)
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(MultiPolygon::new(polygons))
    }
}

fn build_polygon(rings: Vec<RawRing>) -> Result<Polygon<f64>, String> {
    let mut rings = rings.into_iter().map(build_ring);
    let exterior = rings
        .next()
        .ok_or_else(|| "polygon has no exterior ring".to_string())??;
    let interiors = rings.collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn build_ring(positions: RawRing) -> Result<LineString<f64>, String> {
    let coords = positions
        .into_iter()
        .map(|pos| match pos.as_slice() {
            [x, y, ..] => Ok(Coord { x: *x, y: *y }),
            _ => Err(format!("position has {} ordinates, need at least 2", pos.len())),
        })
        .collect::<Result<Vec<_>, _>>()?;

    if coords.len() < 4 {
        return Err(format!("ring has {} positions, need at least 4", coords.len()));
    }
    // LineString::new does not close rings; Polygon::new does
    Ok(LineString::new(coords))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_parse_polygon_and_multipolygon() {
        let poly: RawGeometry = serde_json::from_value(json!({
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]]]
        }))
        .unwrap();
        assert_eq!(poly.into_multi_polygon().unwrap().0.len(), 1);

        let multi: RawGeometry = serde_json::from_value(json!({
            "type": "MultiPolygon",
            "coordinates": [
                [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]],
                [[[5.0, 5.0, 120.0], [6.0, 5.0, 120.0], [6.0, 6.0, 120.0], [5.0, 5.0, 120.0]]]
            ]
        }))
        .unwrap();
        assert_eq!(multi.into_multi_polygon().unwrap().0.len(), 2);
    }

    #[test]
    fn test_degenerate_ring_rejected() {
        let poly: RawGeometry = serde_json::from_value(json!({
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [1.0, 0.0], [0.0, 0.0]]]
        }))
        .unwrap();
        assert!(poly.into_multi_polygon().is_err());
    }

    #[test]
    fn test_point_geometry_is_not_a_boundary() {
        let res = serde_json::from_value::<RawGeometry>(json!({
            "type": "Point",
            "coordinates": [36.8, -1.3]
        }));
        assert!(res.is_err());
    }

    #[test]
    fn test_attributes_extracted() {
        let feature = BoundaryFeature::from_parts(
            props(json!({
                "GID_0": "KEN",
                "COUNTRY": "Kenya",
                "NAME_1": "Nairobi",
                "NAME_2": null,
                "NAME_3": "Kilimani",
            })),
            MultiPolygon::new(vec![]),
        )
        .unwrap();

        assert_eq!(feature.country_code, "KEN");
        assert_eq!(feature.country_name, "Kenya");
        assert_eq!(feature.region_name(AdminLevel::new(1).unwrap()), Some("Nairobi"));
        assert_eq!(feature.region_name(AdminLevel::new(2).unwrap()), None);
        assert_eq!(feature.region_name(AdminLevel::new(3).unwrap()), Some("Kilimani"));
        assert_eq!(feature.region_name(AdminLevel::COUNTRY), None);
    }

    #[test]
    fn test_missing_country_code_is_an_error() {
        let res = BoundaryFeature::from_parts(
            props(json!({ "COUNTRY": "Kenya" })),
            MultiPolygon::new(vec![]),
        );
        assert!(res.is_err());
    }
}
