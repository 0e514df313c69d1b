//! Query server for administrative boundary lookups.
//!
//! Exposes each configured region under `/{region}` with locate, download and
//! available-level endpoints. Resolver calls run on the blocking pool since a
//! cold dataset load reads and parses files.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use admin_locator::config::Config;
use admin_locator::pip::DatasetCache;
use admin_locator::{
    export, AdminLevel, BoundaryResolver, ErrorClass, GeoPoint, LocateError, NameHierarchy,
};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "admin-server")]
#[command(about = "Administrative boundary lookup server")]
struct Args {
    /// TOML config listing the regions to serve
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Listen address (overrides the config)
    #[arg(short, long)]
    listen: Option<String>,
}

/// Application state shared across handlers
struct AppState {
    resolvers: HashMap<String, Arc<BoundaryResolver>>,
    download_dir: PathBuf,
}

type ApiError = (StatusCode, String);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load_from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    info!("Admin Locator Server");

    // One cache for every region so shared level-0 files are parsed once
    let cache = Arc::new(DatasetCache::new());
    let mut resolvers = HashMap::new();
    for profile in &config.regions {
        info!(
            "Region '{}' ({}) from {}",
            profile.name,
            profile.display_title(),
            profile.base_dir.display()
        );
        let resolver = BoundaryResolver::with_cache(profile.clone(), Arc::clone(&cache))
            .with_context(|| format!("Failed to build catalog for region '{}'", profile.name))?;
        resolvers.insert(profile.name.clone(), Arc::new(resolver));
    }

    let state = Arc::new(AppState {
        resolvers,
        download_dir: config.server.download_dir.clone(),
    });

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/{region}/locate", post(locate_handler))
        .route("/{region}/download", get(download_handler))
        .route("/{region}/available-levels", get(levels_handler))
        .route("/{region}/refresh", post(refresh_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listen = args.listen.unwrap_or(config.server.listen);
    info!("Starting server on {}", listen);

    let listener = tokio::net::TcpListener::bind(&listen).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let mut regions: Vec<String> = state.resolvers.keys().cloned().collect();
    regions.sort();
    Json(HealthResponse {
        status: "ok",
        regions,
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    regions: Vec<String>,
}

/// Administrative names for a point
async fn locate_handler(
    State(state): State<Arc<AppState>>,
    Path(region): Path<String>,
    Json(coords): Json<Coordinates>,
) -> Result<Json<LocateResponse>, ApiError> {
    let resolver = state.resolver(&region)?;
    let point = coords.point();
    let hierarchy = blocking(move || resolver.locate(point)).await?;

    Ok(Json(LocateResponse {
        latitude: coords.latitude,
        longitude: coords.longitude,
        administrative_levels: hierarchy,
    }))
}

/// Boundary of the unit at the requested level, as a GeoJSON file
async fn download_handler(
    State(state): State<Arc<AppState>>,
    Path(region): Path<String>,
    Query(params): Query<DownloadParams>,
) -> Result<impl IntoResponse, ApiError> {
    let resolver = state.resolver(&region)?;
    let level: AdminLevel = params.level.parse().map_err(error_response)?;
    let point = GeoPoint::new(params.latitude, params.longitude);

    let filename = format!("{}_{}_{}.geojson", level, params.latitude, params.longitude);
    let destination = state.download_dir.join(&region).join(&filename);

    let written = destination.clone();
    blocking(move || {
        let feature = resolver.resolve_geometry(point, level)?;
        export::export(&feature, &written)
    })
    .await?;

    let body = tokio::fs::read(&destination).await.map_err(|e| {
        tracing::error!("Failed to read back {}: {}", destination.display(), e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/geo+json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    ))
}

/// Levels with published data for the point's country
async fn levels_handler(
    State(state): State<Arc<AppState>>,
    Path(region): Path<String>,
    Query(coords): Query<Coordinates>,
) -> Result<Json<LevelsResponse>, ApiError> {
    let resolver = state.resolver(&region)?;
    let point = coords.point();
    let levels = blocking(move || resolver.available_levels(point)).await?;

    Ok(Json(LevelsResponse {
        available_levels: levels.iter().map(ToString::to_string).collect(),
    }))
}

/// Rescan the region's catalog
async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    Path(region): Path<String>,
) -> Result<StatusCode, ApiError> {
    let resolver = state.resolver(&region)?;
    blocking(move || resolver.refresh()).await?;
    info!("Refreshed catalog for region '{}'", region);
    Ok(StatusCode::NO_CONTENT)
}

impl AppState {
    fn resolver(&self, region: &str) -> Result<Arc<BoundaryResolver>, ApiError> {
        self.resolvers.get(region).cloned().ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                format!("Unknown region '{}'", region),
            )
        })
    }
}

/// Run a resolver call off the async workers
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, LocateError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            tracing::error!("Resolver task failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?
        .map_err(error_response)
}

fn error_response(err: LocateError) -> ApiError {
    let status = match err.class() {
        ErrorClass::BadRequest => StatusCode::BAD_REQUEST,
        ErrorClass::NotFound => StatusCode::NOT_FOUND,
        ErrorClass::DataError | ErrorClass::Internal => {
            tracing::error!("Lookup failed: {:#}", anyhow::Error::from(err));
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server data problem".to_string(),
            );
        }
    };
    (status, err.to_string())
}

#[derive(Deserialize)]
struct Coordinates {
    latitude: f64,
    longitude: f64,
}

impl Coordinates {
    fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

#[derive(Deserialize)]
struct DownloadParams {
    latitude: f64,
    longitude: f64,
    /// `adm_1`, `ADM_3`, `2`, `country`, ...
    level: String,
}

#[derive(Serialize)]
struct LocateResponse {
    latitude: f64,
    longitude: f64,
    administrative_levels: NameHierarchy,
}

#[derive(Serialize)]
struct LevelsResponse {
    available_levels: Vec<String>,
}
