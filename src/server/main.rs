//! Geocoding HTTP server.
//!
//! Thin front end over the library pipeline: one endpoint accepting either
//! a single-line query or structured address parts, geocoded through the
//! adapters named in the config file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use banyan::config::GeocoderConfig;
use banyan::models::Candidate;
use banyan::services::CallMetadata;
use banyan::{Geocoder, PlaceQuery, Viewbox};

#[derive(Parser, Debug)]
#[command(name = "serve")]
#[command(about = "Geocoding server")]
struct Args {
    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0:3000")]
    listen: String,

    /// Geocoder configuration file
    #[arg(short, long, default_value = "geocoder.toml")]
    config: PathBuf,
}

/// Application state shared across handlers
struct AppState {
    geocoder: Geocoder,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    info!("Banyan Geocoding Server");
    info!("Loading configuration from {}", args.config.display());

    let config = GeocoderConfig::load_from_file(&args.config)?;
    let geocoder = config.build()?;

    let state = Arc::new(AppState { geocoder });

    // Build router
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/v1/geocode", get(geocode_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("Starting server on {}", args.listen);

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Forward geocoding
async fn geocode_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GeocodeQueryParams>,
) -> Result<Json<GeocodeResponse>, (StatusCode, String)> {
    let viewbox = match parse_viewbox(&params.viewbox) {
        Ok(viewbox) => viewbox,
        Err(e) => return Err((StatusCode::BAD_REQUEST, e)),
    };

    let pq = PlaceQuery {
        query: params.query.unwrap_or_default(),
        address: params.address.unwrap_or_default(),
        neighborhood: params.neighborhood.unwrap_or_default(),
        city: params.city.unwrap_or_default(),
        subregion: params.subregion.unwrap_or_default(),
        state: params.state.unwrap_or_default(),
        postal: params.postal.unwrap_or_default(),
        country: params.country.unwrap_or_default(),
        viewbox,
        bounded: params.bounded.unwrap_or(false),
        ..Default::default()
    }
    .validated()
    .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let result = state
        .geocoder
        .geocode(pq, params.waterfall)
        .await
        .map_err(|e| {
            tracing::error!("Geocode execution failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    Ok(Json(GeocodeResponse {
        candidates: result.candidates,
        upstream_responses: result.upstream_responses,
    }))
}

#[derive(Deserialize)]
struct GeocodeQueryParams {
    /// Single-line query text
    query: Option<String>,
    /// Street address (house number and street)
    address: Option<String>,
    neighborhood: Option<String>,
    city: Option<String>,
    /// County or district
    subregion: Option<String>,
    /// State or province
    state: Option<String>,
    postal: Option<String>,
    /// ISO 3166-1 country code
    country: Option<String>,
    /// Bounding rectangle: "left,top,right,bottom"
    viewbox: Option<String>,
    /// Restrict (rather than bias) results to the viewbox
    bounded: Option<bool>,
    /// Override the configured waterfall flag for this call
    waterfall: Option<bool>,
}

#[derive(Serialize)]
struct GeocodeResponse {
    candidates: Vec<Candidate>,
    upstream_responses: Vec<CallMetadata>,
}

/// Parse viewbox string "left,top,right,bottom"
fn parse_viewbox(viewbox: &Option<String>) -> Result<Option<Viewbox>, String> {
    let Some(s) = viewbox else {
        return Ok(None);
    };
    let parts: Vec<f64> = s.split(',').filter_map(|p| p.trim().parse().ok()).collect();
    if parts.len() != 4 {
        return Err("viewbox must be `left,top,right,bottom`".to_string());
    }
    Viewbox::new(parts[0], parts[1], parts[2], parts[3])
        .map(Some)
        .map_err(|e| e.to_string())
}
