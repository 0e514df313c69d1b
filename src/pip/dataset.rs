//! Parsed boundary datasets with an R-tree over their features.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use flate2::read::GzDecoder;
use geo::{BoundingRect, Contains};
use rstar::{RTree, RTreeObject, AABB};
use tracing::{debug, info, warn};

use super::boundary::{BoundaryFeature, RawCollection};
use super::crs::Crs;
use crate::error::{LocateError, Result};
use crate::models::{AdminLevel, GeoPoint};

/// Slack allowed past the WGS84 bounds (GADM rings touch +/-180 exactly)
const RANGE_EPSILON: f64 = 1e-6;

/// Which territory a dataset covers
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DatasetScope {
    /// Every country, at level 0
    Global,
    Country(String),
}

impl fmt::Display for DatasetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetScope::Global => write!(f, "global"),
            DatasetScope::Country(code) => write!(f, "{}", code),
        }
    }
}

/// Where a dataset lives and what it represents. The path is the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetSource {
    pub path: PathBuf,
    pub level: AdminLevel,
    pub scope: DatasetScope,
}

impl DatasetSource {
    pub fn global(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            level: AdminLevel::COUNTRY,
            scope: DatasetScope::Global,
        }
    }

    pub fn country(path: impl Into<PathBuf>, code: &str, level: AdminLevel) -> Self {
        Self {
            path: path.into(),
            level,
            scope: DatasetScope::Country(code.to_string()),
        }
    }
}

/// R-tree entry pointing back at a feature by its position in the dataset
#[derive(Debug, Clone)]
struct IndexedFeature {
    position: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedFeature {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// One parsed collection of boundary features sharing a level and CRS (WGS84).
pub struct BoundaryDataset {
    source: DatasetSource,
    features: Vec<Arc<BoundaryFeature>>,
    tree: RTree<IndexedFeature>,
}

impl BoundaryDataset {
    /// Build a dataset from features already in WGS84
    pub fn new(source: DatasetSource, features: Vec<BoundaryFeature>) -> Self {
        let features: Vec<Arc<BoundaryFeature>> = features.into_iter().map(Arc::new).collect();

        // Features without an extent (empty geometry) can never contain a point
        let indexed: Vec<IndexedFeature> = features
            .iter()
            .enumerate()
            .filter_map(|(position, feature)| {
                let (min_x, min_y, max_x, max_y) = feature.bbox()?;
                Some(IndexedFeature {
                    position,
                    envelope: AABB::from_corners([min_x, min_y], [max_x, max_y]),
                })
            })
            .collect();

        Self {
            source,
            features,
            tree: RTree::bulk_load(indexed),
        }
    }

    /// Read and parse a GeoJSON (optionally gzipped) file, normalizing it to WGS84.
    pub fn load(source: DatasetSource) -> Result<Self> {
        let started = Instant::now();
        let path = source.path.as_path();

        let file = File::open(path).map_err(|e| LocateError::io(path, e))?;
        let reader: Box<dyn Read> = if is_gzipped(path) {
            Box::new(GzDecoder::new(BufReader::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };

        let raw: RawCollection =
            serde_json::from_reader(reader).map_err(|e| LocateError::parse(path, e))?;
        if raw.kind != "FeatureCollection" {
            return Err(LocateError::parse(
                path,
                format!("expected a FeatureCollection, found {}", raw.kind),
            ));
        }

        let crs = match raw.crs_name() {
            None => Crs::Wgs84,
            Some(name) => Crs::from_name(name).ok_or_else(|| LocateError::UnsupportedCrs {
                path: path.to_path_buf(),
                crs: name.to_string(),
            })?,
        };
        debug!("{} declares {:?}", path.display(), crs);

        let mut features = Vec::with_capacity(raw.features.len());
        for (i, feature) in raw.features.into_iter().enumerate() {
            let geometry = feature
                .geometry
                .ok_or_else(|| LocateError::parse(path, format!("feature {} has no geometry", i)))?
                .into_multi_polygon()
                .map_err(|reason| LocateError::parse(path, format!("feature {}: {}", i, reason)))?;
            let geometry = crs.normalize(geometry);

            if let Some(rect) = geometry.bounding_rect() {
                if !in_wgs84_range(rect.min().x, rect.min().y)
                    || !in_wgs84_range(rect.max().x, rect.max().y)
                {
                    return Err(LocateError::UnsupportedCrs {
                        path: path.to_path_buf(),
                        crs: format!(
                            "{:?} (feature {} has coordinates outside WGS84 range)",
                            crs, i
                        ),
                    });
                }
            }

            let boundary =
                BoundaryFeature::from_parts(feature.properties.unwrap_or_default(), geometry)
                    .map_err(|reason| {
                        LocateError::parse(path, format!("feature {}: {}", i, reason))
                    })?;
            features.push(boundary);
        }

        let dataset = Self::new(source.clone(), features);
        info!(
            "Loaded {} {} dataset from {}: {} features in {:?}",
            dataset.source.scope,
            dataset.source.level,
            path.display(),
            dataset.len(),
            started.elapsed()
        );
        if dataset.is_empty() {
            warn!("{} has no features; every lookup in it will miss", path.display());
        }
        Ok(dataset)
    }

    /// Find the feature containing a point.
    ///
    /// When several features contain it, the one earliest in file order wins.
    /// Points exactly on a boundary are not contained.
    pub fn find_containing(&self, point: GeoPoint) -> Option<&Arc<BoundaryFeature>> {
        let geo_point = point.to_geo();
        let query_envelope = AABB::from_point([point.longitude, point.latitude]);

        self.tree
            .locate_in_envelope_intersecting(&query_envelope)
            .filter(|ib| self.features[ib.position].geometry.contains(&geo_point))
            .map(|ib| ib.position)
            .min()
            .map(|position| &self.features[position])
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl fmt::Debug for BoundaryDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundaryDataset")
            .field("source", &self.source)
            .field("features", &self.features.len())
            .finish()
    }
}

fn is_gzipped(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

fn in_wgs84_range(lon: f64, lat: f64) -> bool {
    lon.abs() <= 180.0 + RANGE_EPSILON && lat.abs() <= 90.0 + RANGE_EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    fn square(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> serde_json::Value {
        json!({
            "type": "Polygon",
            "coordinates": [[
                [min_x, min_y], [max_x, min_y], [max_x, max_y], [min_x, max_y], [min_x, min_y]
            ]]
        })
    }

    fn collection(features: Vec<(serde_json::Value, serde_json::Value)>) -> serde_json::Value {
        json!({
            "type": "FeatureCollection",
            "features": features
                .into_iter()
                .map(|(properties, geometry)| json!({
                    "type": "Feature",
                    "properties": properties,
                    "geometry": geometry,
                }))
                .collect::<Vec<_>>()
        })
    }

    fn write(dir: &TempDir, name: &str, value: &serde_json::Value) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, serde_json::to_vec(value).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_first_match_wins_on_overlap() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "overlap.geojson",
            &collection(vec![
                (json!({"GID_0": "AAA", "COUNTRY": "First"}), square(0.0, 0.0, 10.0, 10.0)),
                (json!({"GID_0": "BBB", "COUNTRY": "Second"}), square(-5.0, -5.0, 5.0, 5.0)),
            ]),
        );

        let dataset = BoundaryDataset::load(DatasetSource::global(path)).unwrap();
        assert_eq!(dataset.len(), 2);

        let hit = dataset.find_containing(GeoPoint::new(2.0, 2.0)).unwrap();
        assert_eq!(hit.country_code, "AAA");

        let only_second = dataset.find_containing(GeoPoint::new(-2.0, -2.0)).unwrap();
        assert_eq!(only_second.country_code, "BBB");

        assert!(dataset.find_containing(GeoPoint::new(50.0, 50.0)).is_none());
    }

    #[test]
    fn test_gzipped_dataset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gadm41_KEN_1.geojson.gz");
        let body = collection(vec![(
            json!({"GID_0": "KEN", "COUNTRY": "Kenya", "NAME_1": "Nairobi"}),
            square(36.6, -1.5, 37.1, -1.1),
        )]);
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(&serde_json::to_vec(&body).unwrap()).unwrap();
        encoder.finish().unwrap();

        let source = DatasetSource::country(&path, "KEN", AdminLevel::new(1).unwrap());
        let dataset = BoundaryDataset::load(source).unwrap();
        let hit = dataset.find_containing(GeoPoint::new(-1.2921, 36.8219)).unwrap();
        assert_eq!(hit.region_name(AdminLevel::new(1).unwrap()), Some("Nairobi"));
    }

    #[test]
    fn test_web_mercator_is_normalized() {
        let dir = TempDir::new().unwrap();
        let mut body = collection(vec![(
            json!({"GID_0": "KEN", "COUNTRY": "Kenya"}),
            // Roughly 36.6..37.1 E, 1.5..1.1 S
            square(4_074_378.0, -166_998.0, 4_130_038.0, -122_451.0),
        )]);
        body["crs"] = json!({"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::3857"}});
        let path = write(&dir, "mercator.geojson", &body);

        let dataset = BoundaryDataset::load(DatasetSource::global(path)).unwrap();
        assert!(dataset.find_containing(GeoPoint::new(-1.2921, 36.8219)).is_some());
    }

    #[test]
    fn test_unknown_crs_rejected() {
        let dir = TempDir::new().unwrap();
        let mut body = collection(vec![(
            json!({"GID_0": "KEN"}),
            square(0.0, 0.0, 1.0, 1.0),
        )]);
        body["crs"] = json!({"type": "name", "properties": {"name": "EPSG:32737"}});
        let path = write(&dir, "utm.geojson", &body);

        let err = BoundaryDataset::load(DatasetSource::global(path)).unwrap_err();
        assert!(matches!(err, LocateError::UnsupportedCrs { .. }));
    }

    #[test]
    fn test_undeclared_projected_coordinates_rejected() {
        let dir = TempDir::new().unwrap();
        let body = collection(vec![(
            json!({"GID_0": "KEN"}),
            square(4_074_378.0, -166_998.0, 4_130_038.0, -122_451.0),
        )]);
        let path = write(&dir, "metres.geojson", &body);

        let err = BoundaryDataset::load(DatasetSource::global(path)).unwrap_err();
        assert!(matches!(err, LocateError::UnsupportedCrs { .. }));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.geojson");
        std::fs::write(&path, b"{\"type\": \"FeatureCollection\", \"features\": [").unwrap();

        let err = BoundaryDataset::load(DatasetSource::global(path)).unwrap_err();
        assert!(matches!(err, LocateError::Parse { .. }));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err =
            BoundaryDataset::load(DatasetSource::global(dir.path().join("absent.geojson")))
                .unwrap_err();
        assert!(matches!(err, LocateError::Io { .. }));
    }
}
