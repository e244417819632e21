use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Maximum number of samples accepted by a single ingest call
pub const MAX_BATCH_SIZE: usize = 1000;

/// Maximum length of a metric name
pub const METRIC_NAME_MAX_LENGTH: usize = 100;

/// Maximum length of an experiment name
pub const EXPERIMENT_NAME_MAX_LENGTH: usize = 200;

/// Default and maximum page sizes for metric queries
pub const DEFAULT_METRIC_LIMIT: usize = 1000;
pub const MAX_METRIC_LIMIT: usize = 10_000;

/// Default page size for artifact listings
pub const DEFAULT_ARTIFACT_LIMIT: usize = 100;

/// Default and maximum page sizes for experiment listings
pub const DEFAULT_EXPERIMENT_PAGE_SIZE: usize = 50;
pub const MAX_EXPERIMENT_PAGE_SIZE: usize = 100;

/// Default upload cap (500 MiB)
pub const DEFAULT_MAX_ARTIFACT_BYTES: u64 = 500 * 1024 * 1024;

/// Default read chunk for streaming uploads (1 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

const ID_ALPHABET: &[char] = &[
    '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'j', 'k',
    'm', 'n', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

/// Generate a new 10-character ID using a reduced, path-safe alphabet
pub fn generate_id() -> String {
    nanoid::nanoid!(10, ID_ALPHABET)
}

/// Experiment lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExperimentStatus::Running => "running",
            ExperimentStatus::Completed => "completed",
            ExperimentStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ExperimentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "running" => Ok(ExperimentStatus::Running),
            "completed" => Ok(ExperimentStatus::Completed),
            "failed" => Ok(ExperimentStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid experiment status: {}", s)),
        }
    }
}

/// A tracked training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    pub name: String,
    pub status: ExperimentStatus,
    #[serde(default)]
    pub hyperparameters: Map<String, Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Experiment {
    /// Create a new experiment in the running state
    pub fn new(name: String, hyperparameters: Map<String, Value>, tags: Vec<String>) -> Self {
        Self {
            id: generate_id(),
            name,
            status: ExperimentStatus::Running,
            hyperparameters,
            tags,
            created_at: Utc::now(),
        }
    }
}

/// Filters for experiment listings
#[derive(Debug, Clone)]
pub struct ExperimentFilters {
    /// 1-based page number
    pub page: usize,
    pub size: usize,
    pub status: Option<ExperimentStatus>,
}

impl Default for ExperimentFilters {
    fn default() -> Self {
        Self {
            page: 1,
            size: DEFAULT_EXPERIMENT_PAGE_SIZE,
            status: None,
        }
    }
}

impl ExperimentFilters {
    /// Rows skipped before this page, or None when the page lies past
    /// anything a SQL OFFSET can address
    pub fn offset(&self) -> Option<usize> {
        self.page
            .saturating_sub(1)
            .checked_mul(self.size)
            .filter(|offset| i64::try_from(*offset).is_ok())
    }
}

/// A sample as submitted by a caller, before the store assigns id and timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSample {
    pub step: i64,
    pub metric_name: String,
    pub value: f64,
}

impl NewSample {
    pub fn new(metric_name: impl Into<String>, step: i64, value: f64) -> Self {
        Self {
            step,
            metric_name: metric_name.into(),
            value,
        }
    }
}

/// A persisted metric sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub id: i64,
    pub experiment_id: String,
    pub step: i64,
    pub metric_name: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Paging and filtering for metric queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricQuery {
    /// Exact-match metric name filter
    pub metric_name: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for MetricQuery {
    fn default() -> Self {
        Self {
            metric_name: None,
            limit: DEFAULT_METRIC_LIMIT,
            offset: 0,
        }
    }
}

impl MetricQuery {
    pub fn for_metric(name: impl Into<String>) -> Self {
        Self {
            metric_name: Some(name.into()),
            ..Default::default()
        }
    }
}

/// Per-metric aggregate over all samples of one experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub metric_name: String,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Value at the highest step; most recent insert wins on ties
    pub latest: f64,
    pub count: u64,
}

/// An uploaded file associated with an experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub experiment_id: String,
    pub filename: String,
    pub filepath: String,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
}

impl Artifact {
    /// Create a new artifact record for a file that has been fully written
    pub fn new(experiment_id: String, filename: String, filepath: String, size_bytes: u64) -> Self {
        Self {
            id: generate_id(),
            experiment_id,
            filename,
            filepath,
            size_bytes,
            uploaded_at: Utc::now(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:8000".to_string(),
            ],
        }
    }
}

/// Configuration for metadata and artifact storage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// sqlx connection URL, e.g. "sqlite://mltrack.db"
    pub database_url: String,
    /// Root directory for artifact files
    pub artifacts_path: String,
    pub max_artifact_bytes: u64,
    pub chunk_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://mltrack.db".to_string(),
            artifacts_path: "./artifacts".to_string(),
            max_artifact_bytes: DEFAULT_MAX_ARTIFACT_BYTES,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Top-level tracker configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    mod id_generation {
        use super::*;

        const ALPHABET: &str = "23456789abcdefghjkmnpqrstuvwxyz";

        #[test]
        fn id_length_is_10() {
            assert_eq!(generate_id().len(), 10);
        }

        #[test]
        fn id_uses_valid_alphabet() {
            let id = generate_id();
            for ch in id.chars() {
                assert!(
                    ALPHABET.contains(ch),
                    "ID character '{}' is not in the allowed alphabet",
                    ch
                );
            }
        }

        #[test]
        fn ids_are_unique() {
            let ids: HashSet<String> = (0..1000).map(|_| generate_id()).collect();
            assert_eq!(ids.len(), 1000, "Generated duplicate IDs");
        }
    }

    mod experiment_status {
        use super::*;

        #[test]
        fn serializes_lowercase() {
            let statuses = [
                (ExperimentStatus::Running, "\"running\""),
                (ExperimentStatus::Completed, "\"completed\""),
                (ExperimentStatus::Failed, "\"failed\""),
            ];

            for (status, expected) in statuses {
                assert_eq!(serde_json::to_string(&status).unwrap(), expected);
            }
        }

        #[test]
        fn from_str_case_insensitive() {
            assert_eq!(
                "Completed".parse::<ExperimentStatus>().unwrap(),
                ExperimentStatus::Completed
            );
            assert_eq!(
                "FAILED".parse::<ExperimentStatus>().unwrap(),
                ExperimentStatus::Failed
            );
        }

        #[test]
        fn from_str_invalid_returns_error() {
            assert!("paused".parse::<ExperimentStatus>().is_err());
        }
    }

    mod experiment {
        use super::*;

        #[test]
        fn new_starts_running() {
            let experiment = Experiment::new("resnet".to_string(), Map::new(), vec![]);
            assert_eq!(experiment.status, ExperimentStatus::Running);
            assert_eq!(experiment.id.len(), 10);
        }

        #[test]
        fn deserializes_without_optional_fields() {
            let json = r#"{"id":"abc","name":"n","status":"failed","created_at":"2025-11-03T00:00:00Z"}"#;
            let experiment: Experiment = serde_json::from_str(json).unwrap();
            assert!(experiment.tags.is_empty());
            assert!(experiment.hyperparameters.is_empty());
        }
    }

    mod filters {
        use super::*;

        #[test]
        fn experiment_offset_is_zero_based() {
            let filters = ExperimentFilters {
                page: 3,
                size: 20,
                status: None,
            };
            assert_eq!(filters.offset(), Some(40));
            assert_eq!(ExperimentFilters::default().offset(), Some(0));
        }

        #[test]
        fn experiment_offset_out_of_range() {
            let filters = ExperimentFilters {
                page: usize::MAX,
                size: 100,
                status: None,
            };
            assert_eq!(filters.offset(), None);
        }

        #[test]
        fn metric_query_defaults() {
            let query = MetricQuery::default();
            assert_eq!(query.limit, 1000);
            assert_eq!(query.offset, 0);
            assert!(query.metric_name.is_none());
        }
    }

    mod config {
        use super::*;

        #[test]
        fn storage_defaults_match_limits() {
            let config = StorageConfig::default();
            assert_eq!(config.max_artifact_bytes, 524_288_000);
            assert_eq!(config.chunk_size, 1_048_576);
            assert_eq!(config.artifacts_path, "./artifacts");
        }

        #[test]
        fn partial_toml_fills_defaults() {
            let config: TrackerConfig =
                toml::from_str("[server]\nbind = \"127.0.0.1:9000\"\n").unwrap();
            assert_eq!(config.server.bind, "127.0.0.1:9000");
            assert_eq!(config.server.cors_origins.len(), 2);
            assert_eq!(config.storage.database_url, "sqlite://mltrack.db");
        }
    }
}
