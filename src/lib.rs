//! Admin Locator - reverse geocoding against administrative boundary datasets
//!
//! This library provides the boundary resolver shared by the server and lookup binaries.

pub mod config;
pub mod error;
pub mod export;
pub mod models;
pub mod pip;

pub use error::{ErrorClass, LocateError, NoMatchScope};
pub use models::{AdminLevel, GeoPoint, NameHierarchy};
pub use pip::{BoundaryFeature, BoundaryResolver};
