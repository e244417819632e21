pub mod artifact;
pub mod config;
pub mod experiment;
pub mod metric;
pub mod types;
pub mod validation;

pub use artifact::{ArtifactContent, ArtifactService};
pub use config::{ConfigService, CONFIG_FILE_NAME, CONFIG_PATH_ENV};
pub use experiment::ExperimentService;
pub use metric::MetricService;
pub use types::{
    generate_id, Artifact, Experiment, ExperimentFilters, ExperimentStatus, MetricQuery,
    MetricSample, MetricSummary, NewSample, ServerConfig, StorageConfig, TrackerConfig,
    DEFAULT_ARTIFACT_LIMIT, DEFAULT_CHUNK_SIZE, DEFAULT_EXPERIMENT_PAGE_SIZE,
    DEFAULT_MAX_ARTIFACT_BYTES, DEFAULT_METRIC_LIMIT, EXPERIMENT_NAME_MAX_LENGTH, MAX_BATCH_SIZE,
    MAX_EXPERIMENT_PAGE_SIZE, MAX_METRIC_LIMIT, METRIC_NAME_MAX_LENGTH,
};
pub use validation::sanitize_filename;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Machine-readable error kind
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "not_found",
            ServiceError::InvalidInput(_) => "invalid_input",
            ServiceError::AlreadyExists(_) => "already_exists",
            ServiceError::PayloadTooLarge(_) => "payload_too_large",
            ServiceError::Internal(_) => "internal_error",
        }
    }

    /// Human-readable message without the kind prefix
    pub fn message(&self) -> String {
        match self {
            ServiceError::NotFound(msg)
            | ServiceError::InvalidInput(msg)
            | ServiceError::AlreadyExists(msg)
            | ServiceError::PayloadTooLarge(msg) => msg.clone(),
            ServiceError::Internal(err) => err.to_string(),
        }
    }

    pub(crate) fn experiment_not_found(id: &str) -> Self {
        ServiceError::NotFound(format!("Experiment with id {} not found", id))
    }

    pub(crate) fn artifact_not_found(id: &str) -> Self {
        ServiceError::NotFound(format!("Artifact {} not found", id))
    }
}
