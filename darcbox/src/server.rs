//! Leaflet map server for live parking status.
//!
//! `GET /` serves the embedded map page, `GET /parkings` the GeoJSON
//! snapshot of the store. The decoder itself runs on a plain worker
//! thread (see `main.rs`); this module only reads the shared store.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderValue;
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use log::info;
use tower_http::cors::{Any, CorsLayer};

use crate::store::ParkingStore;

const INDEX_HTML: &str = include_str!("index.html");

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|origin| origin == "*") {
        return CorsLayer::new().allow_origin(Any).allow_methods(Any);
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new().allow_origin(origins).allow_methods(Any)
}

pub fn build_router(store: Arc<ParkingStore>, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/parkings", get(parkings))
        .layer(cors_layer(cors_origins))
        .with_state(store)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn parkings(State(store): State<Arc<ParkingStore>>) -> Json<serde_json::Value> {
    Json(store.to_geojson())
}

/// Bind and serve until the process is stopped.
pub async fn serve(
    store: Arc<ParkingStore>,
    host: &str,
    port: u16,
    cors_origins: &[String],
) -> anyhow::Result<()> {
    let app = build_router(store, cors_origins);
    let addr = format!("{host}:{port}");
    info!("web map on http://{addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
