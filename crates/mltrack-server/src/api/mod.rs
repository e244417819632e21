mod artifacts;
mod error;
mod experiments;
mod metrics;

pub use error::ApiError;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "mltrack",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "healthy"}))
}

async fn fallback() -> ApiError {
    ApiError::not_found("Route not found")
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            },
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

pub fn build_router(state: AppState) -> Router {
    let experiment_routes = Router::new()
        .route(
            "/experiments",
            get(experiments::list_experiments).post(experiments::create_experiment),
        )
        .route("/experiments/compare", get(experiments::compare_experiments))
        .route(
            "/experiments/{id}",
            get(experiments::get_experiment).delete(experiments::delete_experiment),
        )
        .route("/experiments/{id}/status", put(experiments::update_status))
        .route("/experiments/{id}/tags", put(experiments::update_tags));

    let metric_routes = Router::new()
        .route(
            "/experiments/{id}/metrics",
            get(metrics::get_metrics).post(metrics::log_metric),
        )
        .route(
            "/experiments/{id}/metrics/batch",
            post(metrics::log_metric_batch),
        )
        .route("/experiments/{id}/metrics/summary", get(metrics::get_summary));

    // The artifact store enforces its own size cap while streaming
    let artifact_routes = Router::new()
        .route(
            "/artifacts/experiments/{id}/upload",
            post(artifacts::upload_artifact).layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/artifacts/experiments/{id}",
            get(artifacts::list_artifacts),
        )
        .route(
            "/artifacts/{id}",
            get(artifacts::get_artifact).delete(artifacts::delete_artifact),
        )
        .route("/artifacts/{id}/download", get(artifacts::download_artifact));

    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(experiment_routes)
        .merge(metric_routes)
        .merge(artifact_routes)
        .fallback(fallback)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
