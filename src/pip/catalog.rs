//! Index of which per-country, per-level boundary files exist on disk.
//!
//! Files are named `<prefix>_<COUNTRY>_<LEVEL>.geojson` (optionally `.json`
//! and/or `.gz`), e.g. `gadm41_KEN_3.geojson`. Anything else is skipped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use hashbrown::HashMap;
use regex::Regex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::dataset::DatasetSource;
use crate::error::{LocateError, Result};
use crate::models::AdminLevel;

pub struct BoundaryCatalog {
    base_dir: PathBuf,
    /// country code -> level -> file
    entries: HashMap<String, BTreeMap<AdminLevel, PathBuf>>,
}

impl BoundaryCatalog {
    /// Walk `base_dir` and index every matching file at or below `max_level`.
    ///
    /// Directory entries are visited in file-name order, so when two files
    /// claim the same country and level (say `.geojson` and `.json.gz`), the
    /// one sorting last wins. Symlinked files and directories are followed.
    pub fn scan(base_dir: &Path, prefix: &str, max_level: AdminLevel) -> Result<Self> {
        let pattern = file_pattern(prefix)?;
        let mut entries: HashMap<String, BTreeMap<AdminLevel, PathBuf>> = HashMap::new();
        let mut skipped = 0usize;

        for entry in WalkDir::new(base_dir)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                // Dangling links and loops below the root don't sink the whole scan
                Err(e) if e.depth() > 0 => {
                    warn!("Skipping unreadable catalog entry: {}", e);
                    skipped += 1;
                    continue;
                }
                Err(e) => {
                    let path = e.path().unwrap_or(base_dir).to_path_buf();
                    return Err(match e.into_io_error() {
                        Some(io) => LocateError::io(path, io),
                        None => LocateError::parse(path, "filesystem loop while scanning catalog"),
                    });
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let Some((code, level)) = entry
                .file_name()
                .to_str()
                .and_then(|name| parse_file_name(&pattern, name))
            else {
                skipped += 1;
                continue;
            };

            if level > max_level {
                debug!("Ignoring {} above {}", entry.path().display(), max_level);
                continue;
            }

            let path = entry.path().to_path_buf();
            if let Some(previous) = entries.entry(code.clone()).or_default().insert(level, path) {
                warn!(
                    "Duplicate {} {} dataset, {} replaced by {}",
                    code,
                    level,
                    previous.display(),
                    entry.path().display()
                );
            }
        }

        info!(
            "Catalog scan of {}: {} countries, {} datasets ({} other files skipped)",
            base_dir.display(),
            entries.len(),
            entries.values().map(BTreeMap::len).sum::<usize>(),
            skipped
        );

        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            entries,
        })
    }

    /// Finest dataset published for a country
    pub fn highest_level(&self, country_code: &str) -> Result<DatasetSource> {
        self.entries
            .get(country_code)
            .and_then(|levels| levels.iter().next_back())
            .map(|(level, path)| DatasetSource::country(path, country_code, *level))
            .ok_or_else(|| LocateError::DatasetNotFound {
                country: country_code.to_string(),
                level: None,
            })
    }

    /// Dataset for exactly this country and level
    pub fn dataset_for(&self, country_code: &str, level: AdminLevel) -> Result<DatasetSource> {
        self.entries
            .get(country_code)
            .and_then(|levels| levels.get(&level))
            .map(|path| DatasetSource::country(path, country_code, level))
            .ok_or_else(|| LocateError::DatasetNotFound {
                country: country_code.to_string(),
                level: Some(level),
            })
    }

    /// Levels published for a country, ascending
    pub fn levels_for(&self, country_code: &str) -> Vec<AdminLevel> {
        self.entries
            .get(country_code)
            .map(|levels| levels.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn file_pattern(prefix: &str) -> Result<Regex> {
    Regex::new(&format!(
        r"^{}_([A-Za-z0-9]+)_(\d+)\.(?:geo)?json(?:\.gz)?$",
        regex::escape(prefix)
    ))
    .map_err(|e| LocateError::Config(format!("bad file prefix '{}': {}", prefix, e)))
}

/// Extract `(country, level)` from a file name; levels outside 0..=5 don't match
fn parse_file_name(pattern: &Regex, name: &str) -> Option<(String, AdminLevel)> {
    let caps = pattern.captures(name)?;
    let level = caps[2].parse::<i64>().ok()?;
    let level = AdminLevel::new(level).ok()?;
    Some((caps[1].to_string(), level))
}
