//! Core data models for the boundary resolver.

pub mod admin;
pub mod place;

pub use admin::{AdminLevel, NameHierarchy, RegionName};
pub use place::GeoPoint;
