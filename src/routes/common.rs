//! Common routes: health, version.

use crate::config::Settings;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

async fn version(State(settings): State<Arc<Settings>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": settings.service_name,
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /health, GET /version.
pub fn common_routes(settings: Arc<Settings>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .with_state(settings)
}
