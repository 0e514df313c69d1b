//! GeoJSON export of a single boundary feature.

use std::io::Write;
use std::path::Path;

use geo::{LineString, MultiPolygon, Polygon};
use serde_json::{json, Value};
use tempfile::NamedTempFile;
use tracing::info;

use crate::error::{LocateError, Result};
use crate::pip::BoundaryFeature;

/// Render a feature as a one-feature GeoJSON `FeatureCollection`.
pub fn to_geojson(feature: &BoundaryFeature) -> Value {
    json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": feature.properties,
            "geometry": geometry_to_geojson(&feature.geometry),
        }]
    })
}

/// Write a feature to `destination`.
///
/// The file is staged next to the destination and renamed into place, so
/// concurrent exports to the same name never interleave. Returns bytes written.
pub fn export(feature: &BoundaryFeature, destination: &Path) -> Result<u64> {
    let export_err = |source| LocateError::Export {
        path: destination.to_path_buf(),
        source,
    };

    let body = serde_json::to_vec(&to_geojson(feature))
        .map_err(|e| export_err(std::io::Error::other(e)))?;

    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(export_err)?;

    let mut staged = NamedTempFile::new_in(dir).map_err(export_err)?;
    staged.write_all(&body).map_err(export_err)?;
    staged.as_file().sync_all().map_err(export_err)?;
    staged.persist(destination).map_err(|e| export_err(e.error))?;

    info!(
        "Exported {} boundary to {} ({} bytes)",
        feature.country_code,
        destination.display(),
        body.len()
    );
    Ok(body.len() as u64)
}

fn geometry_to_geojson(geometry: &MultiPolygon<f64>) -> Value {
    match geometry.0.as_slice() {
        [single] => json!({
            "type": "Polygon",
            "coordinates": polygon_coords(single),
        }),
        polygons => json!({
            "type": "MultiPolygon",
            "coordinates": polygons.iter().map(polygon_coords).collect::<Vec<_>>(),
        }),
    }
}

fn polygon_coords(polygon: &Polygon<f64>) -> Vec<Vec<[f64; 2]>> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(ring_coords)
        .collect()
}

fn ring_coords(ring: &LineString<f64>) -> Vec<[f64; 2]> {
    ring.coords().map(|c| [c.x, c.y]).collect()
}
