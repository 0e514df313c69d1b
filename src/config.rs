use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::AdminLevel;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub regions: Vec<RegionProfile>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            download_dir: default_download_dir(),
        }
    }
}

/// One deployment scope: where its datasets live and how deep they go.
#[derive(Debug, Deserialize, Clone)]
pub struct RegionProfile {
    /// Short identifier, used in URLs
    pub name: String,
    #[serde(default)]
    pub title: String,
    /// Root of the per-country, per-level dataset files
    pub base_dir: PathBuf,
    /// The level-0 file covering every country in the region
    pub global_dataset: PathBuf,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    #[serde(default = "default_max_level")]
    pub max_level: AdminLevel,
}

impl RegionProfile {
    pub fn new(
        name: impl Into<String>,
        base_dir: impl Into<PathBuf>,
        global_dataset: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            title: String::new(),
            base_dir: base_dir.into(),
            global_dataset: global_dataset.into(),
            file_prefix: default_file_prefix(),
            max_level: default_max_level(),
        }
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            &self.name
        } else {
            &self.title
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_file_prefix() -> String {
    "gadm41".to_string()
}

fn default_max_level() -> AdminLevel {
    AdminLevel::FINEST
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.regions.is_empty() {
            anyhow::bail!("Config defines no regions");
        }

        let mut seen = HashSet::new();
        for region in &self.regions {
            if region.name.is_empty() {
                anyhow::bail!("Region with base_dir {} has no name", region.base_dir.display());
            }
            if !seen.insert(region.name.as_str()) {
                anyhow::bail!("Duplicate region name '{}'", region.name);
            }
            if region.file_prefix.is_empty() {
                anyhow::bail!("Region '{}' has an empty file_prefix", region.name);
            }
        }
        Ok(())
    }

    pub fn region(&self, name: &str) -> Option<&RegionProfile> {
        self.regions.iter().find(|r| r.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [[regions]]
            name = "east-africa"
            title = "East Africa Administration Levels"
            base_dir = "data/adm_levels"
            global_dataset = "data/EA_ADM0.geojson"

            [[regions]]
            name = "kenya"
            base_dir = "data/kenya"
            global_dataset = "data/KEN_ADM0.geojson"
            file_prefix = "ken"
            max_level = 3
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        assert_eq!(config.server.listen, "0.0.0.0:8000");
        let ea = config.region("east-africa").unwrap();
        assert_eq!(ea.file_prefix, "gadm41");
        assert_eq!(ea.max_level, AdminLevel::FINEST);
        assert_eq!(ea.display_title(), "East Africa Administration Levels");

        let kenya = config.region("kenya").unwrap();
        assert_eq!(kenya.max_level.get(), 3);
        assert_eq!(kenya.display_title(), "kenya");
    }

    #[test]
    fn test_reject_level_above_five() {
        let res: Result<Config, _> = toml::from_str(
            r#"
            [[regions]]
            name = "x"
            base_dir = "d"
            global_dataset = "g.geojson"
            max_level = 6
            "#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_reject_duplicate_names() {
        let config: Config = toml::from_str(
            r#"
            [[regions]]
            name = "x"
            base_dir = "a"
            global_dataset = "a.geojson"

            [[regions]]
            name = "x"
            base_dir = "b"
            global_dataset = "b.geojson"
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }
}
