use super::error::ApiError;
use crate::state::AppState;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use mltrack::services::{ExperimentFilters, ExperimentStatus, DEFAULT_EXPERIMENT_PAGE_SIZE};
use mltrack::wire::{CreateExperiment, StatusUpdate, TagsUpdate};
use serde::Deserialize;

#[derive(Deserialize)]
pub struct ListQuery {
    page: Option<usize>,
    size: Option<usize>,
    status: Option<String>,
}

#[derive(Deserialize)]
pub struct CompareQuery {
    ids: Option<String>,
}

pub async fn create_experiment(
    State(state): State<AppState>,
    body: Result<Json<CreateExperiment>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body?;
    let experiment = state
        .experiment_service
        .create(body.name, body.hyperparameters, body.tags)
        .await?;
    Ok((StatusCode::CREATED, Json(experiment)))
}

pub async fn list_experiments(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;

    let status = match query.status.as_deref() {
        Some(s) => Some(
            s.parse::<ExperimentStatus>()
                .map_err(|e| ApiError::unprocessable(e.to_string()))?,
        ),
        None => None,
    };

    let filters = ExperimentFilters {
        page: query.page.unwrap_or(1),
        size: query.size.unwrap_or(DEFAULT_EXPERIMENT_PAGE_SIZE),
        status,
    };

    let experiments = state.experiment_service.list(filters).await?;
    Ok(Json(experiments))
}

pub async fn compare_experiments(
    State(state): State<AppState>,
    query: Result<Query<CompareQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;

    let ids: Vec<String> = query
        .ids
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect();
    if ids.is_empty() {
        return Err(ApiError::bad_request(
            "ids must contain at least one experiment id",
        ));
    }

    let experiments = state.experiment_service.compare(&ids).await?;
    Ok(Json(experiments))
}

pub async fn get_experiment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let experiment = state.experiment_service.require(&id).await?;
    Ok(Json(experiment))
}

pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body?;
    let experiment = state
        .experiment_service
        .update_status(&id, body.status)
        .await?;
    Ok(Json(experiment))
}

pub async fn update_tags(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<TagsUpdate>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body?;
    let experiment = state.experiment_service.update_tags(&id, body.tags).await?;
    Ok(Json(experiment))
}

pub async fn delete_experiment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.experiment_service.delete(&id).await? {
        return Err(ApiError::not_found(format!(
            "Experiment with id {} not found",
            id
        )));
    }

    state.artifact_service.purge_experiment(&id).await;
    Ok(StatusCode::NO_CONTENT)
}
