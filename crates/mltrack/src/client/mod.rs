//! HTTP client for a running mltrack server.
//!
//! `TrackerClient` maps one method to each endpoint; `Session` wraps a
//! single active experiment for use inside a training loop.

mod session;

pub use session::Session;

use crate::services::validation::{validate_batch, validate_experiment_name};
use crate::services::{
    Artifact, Experiment, ExperimentFilters, ExperimentStatus, MetricQuery, MetricSample,
    MetricSummary, NewSample,
};
use crate::wire::{
    CreateExperiment, ErrorBody, MetricBatch, MetricLogResponse, StatusUpdate, TagsUpdate,
};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::path::Path;
use tokio::io::AsyncWriteExt;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server returned {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// HTTP status of an API error
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Client for the mltrack HTTP API
#[derive(Debug, Clone)]
pub struct TrackerClient {
    base_url: String,
    client: reqwest::Client,
}

impl TrackerClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn create_experiment(
        &self,
        name: &str,
        tags: Vec<String>,
        hyperparameters: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Experiment> {
        validate_experiment_name(name).map_err(|e| ClientError::InvalidInput(e.message()))?;

        let body = CreateExperiment {
            name: name.to_string(),
            hyperparameters,
            tags,
        };
        let response = self
            .client
            .post(self.url("/experiments"))
            .json(&body)
            .send()
            .await?;
        parse_json(response).await
    }

    pub async fn list_experiments(&self, filters: &ExperimentFilters) -> Result<Vec<Experiment>> {
        let mut query = vec![
            ("page", filters.page.to_string()),
            ("size", filters.size.to_string()),
        ];
        if let Some(status) = filters.status {
            query.push(("status", status.to_string()));
        }

        let response = self
            .client
            .get(self.url("/experiments"))
            .query(&query)
            .send()
            .await?;
        parse_json(response).await
    }

    pub async fn get_experiment(&self, id: &str) -> Result<Experiment> {
        let response = self
            .client
            .get(self.url(&format!("/experiments/{}", id)))
            .send()
            .await?;
        parse_json(response).await
    }

    pub async fn compare_experiments(&self, ids: &[String]) -> Result<Vec<Experiment>> {
        let response = self
            .client
            .get(self.url("/experiments/compare"))
            .query(&[("ids", ids.join(","))])
            .send()
            .await?;
        parse_json(response).await
    }

    pub async fn update_status(&self, id: &str, status: ExperimentStatus) -> Result<Experiment> {
        let response = self
            .client
            .put(self.url(&format!("/experiments/{}/status", id)))
            .json(&StatusUpdate { status })
            .send()
            .await?;
        parse_json(response).await
    }

    pub async fn update_tags(&self, id: &str, tags: Vec<String>) -> Result<Experiment> {
        let response = self
            .client
            .put(self.url(&format!("/experiments/{}/tags", id)))
            .json(&TagsUpdate { tags })
            .send()
            .await?;
        parse_json(response).await
    }

    pub async fn delete_experiment(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/experiments/{}", id)))
            .send()
            .await?;
        check_status(response).await.map(|_| ())
    }

    /// Log one sample. Invalid samples are rejected before any request is made.
    pub async fn log_metric(&self, id: &str, sample: &NewSample) -> Result<MetricLogResponse> {
        validate_batch(std::slice::from_ref(sample))
            .map_err(|e| ClientError::InvalidInput(e.message()))?;

        let response = self
            .client
            .post(self.url(&format!("/experiments/{}/metrics", id)))
            .json(sample)
            .send()
            .await?;
        parse_json(response).await
    }

    /// Log a batch of samples in one request
    pub async fn log_metrics(&self, id: &str, samples: Vec<NewSample>) -> Result<MetricLogResponse> {
        validate_batch(&samples).map_err(|e| ClientError::InvalidInput(e.message()))?;

        let response = self
            .client
            .post(self.url(&format!("/experiments/{}/metrics/batch", id)))
            .json(&MetricBatch { metrics: samples })
            .send()
            .await?;
        parse_json(response).await
    }

    pub async fn get_metrics(&self, id: &str, query: &MetricQuery) -> Result<Vec<MetricSample>> {
        let mut params = vec![
            ("limit", query.limit.to_string()),
            ("offset", query.offset.to_string()),
        ];
        if let Some(name) = &query.metric_name {
            params.push(("metric_name", name.clone()));
        }

        let response = self
            .client
            .get(self.url(&format!("/experiments/{}/metrics", id)))
            .query(&params)
            .send()
            .await?;
        parse_json(response).await
    }

    pub async fn summarize_metrics(&self, id: &str) -> Result<Vec<MetricSummary>> {
        let response = self
            .client
            .get(self.url(&format!("/experiments/{}/metrics/summary", id)))
            .send()
            .await?;
        parse_json(response).await
    }

    /// Upload a local file as an artifact, streaming it from disk
    pub async fn upload_artifact(&self, experiment_id: &str, path: &Path) -> Result<Artifact> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                ClientError::InvalidInput(format!("{} has no usable file name", path.display()))
            })?
            .to_string();

        let file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();
        let part = reqwest::multipart::Part::stream_with_length(reqwest::Body::from(file), len)
            .file_name(file_name)
            .mime_str("application/octet-stream")?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(self.url(&format!("/artifacts/experiments/{}/upload", experiment_id)))
            .multipart(form)
            .send()
            .await?;
        parse_json(response).await
    }

    pub async fn list_artifacts(
        &self,
        experiment_id: &str,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Artifact>> {
        let response = self
            .client
            .get(self.url(&format!("/artifacts/experiments/{}", experiment_id)))
            .query(&[("skip", skip), ("limit", limit)])
            .send()
            .await?;
        parse_json(response).await
    }

    pub async fn get_artifact(&self, id: &str) -> Result<Artifact> {
        let response = self
            .client
            .get(self.url(&format!("/artifacts/{}", id)))
            .send()
            .await?;
        parse_json(response).await
    }

    /// Download an artifact to `dest`, returning the number of bytes written.
    ///
    /// A download that fails part way removes `dest` again.
    pub async fn download_artifact(&self, id: &str, dest: &Path) -> Result<u64> {
        let response = self
            .client
            .get(self.url(&format!("/artifacts/{}/download", id)))
            .send()
            .await?;
        let response = check_status(response).await?;

        let file = tokio::fs::File::create(dest).await?;
        match write_body(file, response).await {
            Ok(written) => Ok(written),
            Err(err) => {
                if let Err(remove_err) = tokio::fs::remove_file(dest).await {
                    tracing::warn!(
                        path = %dest.display(),
                        error = %remove_err,
                        "Failed to remove partial download"
                    );
                }
                Err(err)
            },
        }
    }

    pub async fn delete_artifact(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/artifacts/{}", id)))
            .send()
            .await?;
        check_status(response).await.map(|_| ())
    }
}

async fn write_body(mut file: tokio::fs::File, response: reqwest::Response) -> Result<u64> {
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => (body.error.code, body.error.message),
        Err(_) => ("http_error".to_string(), text),
    };
    Err(ClientError::Api {
        status: status.as_u16(),
        code,
        message,
    })
}

async fn parse_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let response = check_status(response).await?;
    Ok(response.json().await?)
}
