use super::error::ApiError;
use crate::state::AppState;
use axum::body::{Body, Bytes};
use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::TryStreamExt;
use mltrack::services::DEFAULT_ARTIFACT_LIMIT;
use serde::Deserialize;
use std::io;
use tokio::io::AsyncReadExt;

#[derive(Deserialize)]
pub struct ListQuery {
    skip: Option<usize>,
    limit: Option<usize>,
}

pub async fn upload_artifact(
    State(state): State<AppState>,
    Path(experiment_id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let mut multipart = multipart?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::bad_request("Uploaded file has no filename"))?;

        let reader = Box::pin(field.map_err(io::Error::other)).into_async_read();
        let artifact = state
            .artifact_service
            .store(&experiment_id, &filename, reader)
            .await
            .map_err(ApiError::upload)?;

        return Ok((StatusCode::CREATED, Json(artifact)));
    }

    Err(ApiError::bad_request("Missing multipart field 'file'"))
}

pub async fn list_artifacts(
    State(state): State<AppState>,
    Path(experiment_id): Path<String>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let artifacts = state
        .artifact_service
        .list(
            &experiment_id,
            query.skip.unwrap_or(0),
            query.limit.unwrap_or(DEFAULT_ARTIFACT_LIMIT),
        )
        .await?;
    Ok(Json(artifacts))
}

pub async fn get_artifact(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let artifact = state.artifact_service.get(&id).await?;
    Ok(Json(artifact))
}

pub async fn download_artifact(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let content = state.artifact_service.retrieve_content(&id).await?;
    let chunk_size = state.config.storage.chunk_size.max(1);

    let stream = futures::stream::try_unfold(content.file, move |mut file| async move {
        let mut buf = vec![0u8; chunk_size];
        let n = file.read(&mut buf).await?;
        if n == 0 {
            return Ok::<_, io::Error>(None);
        }
        buf.truncate(n);
        Ok(Some((Bytes::from(buf), file)))
    });

    let disposition = format!("attachment; filename=\"{}\"", content.artifact.filename);
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

pub async fn delete_artifact(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.artifact_service.delete(&id).await? {
        return Err(ApiError::not_found(format!("Artifact {} not found", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}
