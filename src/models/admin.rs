//! Administrative level and name hierarchy types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LocateError;

/// Depth in the country -> region nesting.
///
/// Level 0 is the country itself; levels 1 through 5 are successively finer
/// subdivisions (GADM `ADM_1`..`ADM_5`). Not every country publishes every level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct AdminLevel(u8);

impl AdminLevel {
    pub const COUNTRY: AdminLevel = AdminLevel(0);
    pub const FINEST: AdminLevel = AdminLevel(5);

    /// Validate a caller-supplied level number.
    pub fn new(level: i64) -> Result<Self, LocateError> {
        match u8::try_from(level) {
            Ok(l) if l <= Self::FINEST.0 => Ok(AdminLevel(l)),
            _ => Err(LocateError::InvalidLevel(level.to_string())),
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Region levels (1..=5) in ascending order
    pub fn regions() -> impl Iterator<Item = AdminLevel> {
        (1..=Self::FINEST.0).map(AdminLevel)
    }

    /// Attribute carrying the region name at this level (`NAME_1`..`NAME_5`).
    /// The country level has none; its name lives in `COUNTRY`.
    pub fn name_field(self) -> Option<String> {
        (self.0 > 0).then(|| format!("NAME_{}", self.0))
    }
}

impl fmt::Display for AdminLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ADM_{}", self.0)
    }
}

impl TryFrom<u8> for AdminLevel {
    type Error = LocateError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        AdminLevel::new(i64::from(level))
    }
}

impl From<AdminLevel> for u8 {
    fn from(level: AdminLevel) -> u8 {
        level.0
    }
}

impl FromStr for AdminLevel {
    type Err = LocateError;

    /// Accepts `3`, `adm_3`, `ADM3` and `country`, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if lower == "country" {
            return Ok(AdminLevel::COUNTRY);
        }

        let digits = lower
            .strip_prefix("adm_")
            .or_else(|| lower.strip_prefix("adm"))
            .unwrap_or(&lower);

        digits
            .parse::<i64>()
            .map_err(|_| LocateError::InvalidLevel(s.to_string()))
            .and_then(AdminLevel::new)
    }
}

/// One populated region name in a hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionName {
    pub level: AdminLevel,
    pub name: String,
}

/// Names of every administrative unit enclosing a point, from the country
/// down to the deepest level resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameHierarchy {
    pub country_code: String,
    pub country: String,
    /// Deepest level of the dataset the names came from
    pub level: AdminLevel,
    /// Populated region names, ascending by level
    pub regions: Vec<RegionName>,
}

impl NameHierarchy {
    /// Get the region name at a given level
    pub fn get(&self, level: AdminLevel) -> Option<&str> {
        if level == AdminLevel::COUNTRY {
            return Some(&self.country);
        }
        self.regions
            .iter()
            .find(|r| r.level == level)
            .map(|r| r.name.as_str())
    }
}
