//! Resolver that turns a point into a name hierarchy or a boundary feature.
//!
//! Every query starts at the global level-0 dataset to find the country, then
//! either descends to the finest dataset the catalog lists for that country
//! (`locate`) or to the exact level the caller asked for (`boundary`).

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use super::{BoundaryCatalog, BoundaryFeature, DatasetCache, DatasetSource};
use crate::config::RegionProfile;
use crate::error::{LocateError, NoMatchScope, Result};
use crate::models::{AdminLevel, GeoPoint, NameHierarchy, RegionName};

/// Point-in-polygon resolver over one region's boundary catalog
pub struct BoundaryResolver {
    profile: RegionProfile,
    global: DatasetSource,
    catalog: RwLock<Arc<BoundaryCatalog>>,
    cache: Arc<DatasetCache>,
}

impl BoundaryResolver {
    /// Scan the profile's catalog and create a resolver with its own cache.
    pub fn new(profile: RegionProfile) -> Result<Self> {
        Self::with_cache(profile, Arc::new(DatasetCache::new()))
    }

    /// Create a resolver sharing a dataset cache with other resolvers.
    pub fn with_cache(profile: RegionProfile, cache: Arc<DatasetCache>) -> Result<Self> {
        let catalog = BoundaryCatalog::scan(
            &profile.base_dir,
            &profile.file_prefix,
            profile.max_level,
        )?;

        Ok(Self {
            global: DatasetSource::global(&profile.global_dataset),
            profile,
            catalog: RwLock::new(Arc::new(catalog)),
            cache,
        })
    }

    /// Country code of the level-0 polygon containing the point.
    pub fn resolve_country(&self, point: GeoPoint) -> Result<String> {
        self.country_feature(point)
            .map(|feature| feature.country_code.clone())
    }

    fn country_feature(&self, point: GeoPoint) -> Result<Arc<BoundaryFeature>> {
        let dataset = self.cache.get(&self.global)?;
        let feature = dataset
            .find_containing(point)
            .ok_or(LocateError::NoMatch(NoMatchScope::Country))?;

        debug!("{} is in {}", point, feature.country_code);
        Ok(Arc::clone(feature))
    }

    /// Names of every enclosing unit, from the finest dataset published for
    /// the point's country.
    ///
    /// Fails rather than return a partial hierarchy: a country without finer
    /// data, or a point in a gap of the finer dataset, is a `NoMatch`.
    pub fn resolve_hierarchy(&self, point: GeoPoint) -> Result<NameHierarchy> {
        let country = self.resolve_country(point)?;

        let source = match self.catalog().highest_level(&country) {
            Ok(source) => source,
            Err(LocateError::DatasetNotFound { .. }) => {
                return Err(LocateError::NoMatch(NoMatchScope::NoFinerData { country }));
            }
            Err(e) => return Err(e),
        };

        let dataset = self.cache.get(&source)?;
        let feature = dataset.find_containing(point).ok_or_else(|| {
            LocateError::NoMatch(NoMatchScope::Dataset {
                country: country.clone(),
                level: source.level,
            })
        })?;

        let regions = AdminLevel::regions()
            .take_while(|level| *level <= source.level)
            .filter_map(|level| {
                feature.region_name(level).map(|name| RegionName {
                    level,
                    name: name.to_string(),
                })
            })
            .collect();

        debug!("{} resolved through {} {}", point, country, source.level);

        Ok(NameHierarchy {
            country_code: feature.country_code.clone(),
            country: feature.country_name.clone(),
            level: source.level,
            regions,
        })
    }

    /// The feature containing the point at exactly `level`.
    ///
    /// Never substitutes another level. Level 0 uses a per-country level-0
    /// file when the catalog lists one, otherwise the global dataset's feature.
    pub fn resolve_geometry(
        &self,
        point: GeoPoint,
        level: AdminLevel,
    ) -> Result<Arc<BoundaryFeature>> {
        if level > self.profile.max_level {
            return Err(LocateError::InvalidLevel(level.to_string()));
        }

        let country = self.country_feature(point)?;
        let code = country.country_code.clone();

        let source = match self.catalog().dataset_for(&code, level) {
            Ok(source) => source,
            Err(LocateError::DatasetNotFound { .. }) if level == AdminLevel::COUNTRY => {
                return Ok(country);
            }
            Err(e) => return Err(e),
        };

        let dataset = self.cache.get(&source)?;
        dataset.find_containing(point).cloned().ok_or_else(|| {
            LocateError::NoMatch(NoMatchScope::Dataset {
                country: code,
                level,
            })
        })
    }

    /// Levels with a dataset for the point's country, always including 0.
    pub fn available_levels(&self, point: GeoPoint) -> Result<Vec<AdminLevel>> {
        let country = self.resolve_country(point)?;
        let mut levels = self.catalog().levels_for(&country);
        if levels.first() != Some(&AdminLevel::COUNTRY) {
            levels.insert(0, AdminLevel::COUNTRY);
        }
        Ok(levels)
    }

    /// Point -> name hierarchy
    pub fn locate(&self, point: GeoPoint) -> Result<NameHierarchy> {
        self.resolve_hierarchy(point)
    }

    /// Point + caller-supplied level number -> boundary feature.
    ///
    /// The level is validated before any dataset is touched.
    pub fn boundary(&self, point: GeoPoint, level: i64) -> Result<Arc<BoundaryFeature>> {
        let level = AdminLevel::new(level)?;
        self.resolve_geometry(point, level)
    }

    /// Rescan the directory the current catalog was built from and drop cached
    /// datasets. That is the profile's base directory until `refresh_catalog`
    /// points the resolver somewhere else.
    pub fn refresh(&self) -> Result<()> {
        let catalog = self.catalog();
        self.refresh_catalog(catalog.base_dir())
    }

    /// Rebuild the catalog from `base_dir` and drop cached datasets.
    ///
    /// Queries already running keep the catalog and datasets they started with.
    pub fn refresh_catalog(&self, base_dir: &Path) -> Result<()> {
        let catalog = BoundaryCatalog::scan(
            base_dir,
            &self.profile.file_prefix,
            self.profile.max_level,
        )?;
        if catalog.is_empty() {
            warn!("No datasets found under {}", base_dir.display());
        }

        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(catalog);
        self.cache.clear();
        Ok(())
    }

    /// Snapshot of the current catalog
    pub fn catalog(&self) -> Arc<BoundaryCatalog> {
        Arc::clone(&self.catalog.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn cache(&self) -> &DatasetCache {
        &self.cache
    }

    pub fn profile(&self) -> &RegionProfile {
        &self.profile
    }
}
