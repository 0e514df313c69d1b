//! Point-in-Polygon (PIP) administrative boundary resolution.
//!
//! Reads per-country, per-level GeoJSON boundary files, caches them once
//! parsed, and answers containment queries through an R-tree spatial index.

mod boundary;
mod cache;
mod catalog;
mod crs;
mod dataset;
mod service;

pub use boundary::{BoundaryFeature, COUNTRY_CODE_FIELD, COUNTRY_NAME_FIELD};
pub use cache::{CacheStats, DatasetCache};
pub use catalog::BoundaryCatalog;
pub use crs::Crs;
pub use dataset::{BoundaryDataset, DatasetScope, DatasetSource};
pub use service::BoundaryResolver;
