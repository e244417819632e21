use super::error::ApiError;
use crate::state::AppState;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use mltrack::services::{MetricQuery, NewSample, DEFAULT_METRIC_LIMIT};
use mltrack::wire::{MetricBatch, MetricLogResponse};
use serde::Deserialize;

#[derive(Deserialize)]
pub struct MetricsQuery {
    metric_name: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

pub async fn log_metric(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<NewSample>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(sample) = body?;
    let count = state.metric_service.ingest_one(&id, sample).await?;
    Ok(Json(MetricLogResponse::new(count)))
}

pub async fn log_metric_batch(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<MetricBatch>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(batch) = body?;
    let count = state.metric_service.ingest(&id, &batch.metrics).await?;
    Ok(Json(MetricLogResponse::new(count)))
}

pub async fn get_metrics(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<MetricsQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let query = MetricQuery {
        metric_name: query.metric_name.filter(|name| !name.is_empty()),
        limit: query.limit.unwrap_or(DEFAULT_METRIC_LIMIT),
        offset: query.offset.unwrap_or(0),
    };

    let samples = state.metric_service.query(&id, &query).await?;
    Ok(Json(samples))
}

pub async fn get_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state.metric_service.summarize(&id).await?;
    Ok(Json(summary))
}
