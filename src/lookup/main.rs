//! One-shot command line lookups against a configured region.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use admin_locator::config::Config;
use admin_locator::{export, AdminLevel, BoundaryResolver, GeoPoint};

#[derive(Parser, Debug)]
#[command(name = "admin-lookup")]
#[command(about = "Resolve administrative areas for a coordinate")]
struct Args {
    /// TOML config listing the regions
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Region to query (defaults to the first in the config)
    #[arg(short, long)]
    region: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the name hierarchy containing a point
    Locate {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
    },
    /// List levels with data for the point's country
    Levels {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
    },
    /// Write the boundary containing a point to a GeoJSON file
    Export {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        /// `adm_1`, `ADM_3`, `2`, `country`, ...
        #[arg(long)]
        level: AdminLevel,
        /// Output file (defaults to `<LEVEL>_<lat>_<lon>.geojson`)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::load_from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    let profile = match &args.region {
        Some(name) => config
            .region(name)
            .with_context(|| format!("No region named '{}' in config", name))?,
        None => &config.regions[0],
    };
    let resolver = BoundaryResolver::new(profile.clone())
        .with_context(|| format!("Failed to build catalog for region '{}'", profile.name))?;

    match args.command {
        Command::Locate { lat, lon } => {
            let hierarchy = resolver.locate(GeoPoint::new(lat, lon))?;
            println!("{}", serde_json::to_string_pretty(&hierarchy)?);
        }
        Command::Levels { lat, lon } => {
            for level in resolver.available_levels(GeoPoint::new(lat, lon))? {
                println!("{}", level);
            }
        }
        Command::Export {
            lat,
            lon,
            level,
            output,
        } => {
            let feature = resolver.resolve_geometry(GeoPoint::new(lat, lon), level)?;
            let output =
                output.unwrap_or_else(|| PathBuf::from(format!("{}_{}_{}.geojson", level, lat, lon)));
            let written = export::export(&feature, &output)?;
            info!("Wrote {} bytes", written);
            println!("{}", output.display());
        }
    }

    Ok(())
}
