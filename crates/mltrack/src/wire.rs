//! Request and response bodies shared by the HTTP server and client.

use crate::services::{ExperimentStatus, NewSample};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateExperiment {
    pub name: String,
    #[serde(default)]
    pub hyperparameters: Map<String, Value>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: ExperimentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagsUpdate {
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricBatch {
    pub metrics: Vec<NewSample>,
}

/// Acknowledgement for logged metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricLogResponse {
    pub count: usize,
    pub message: String,
}

impl MetricLogResponse {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            message: format!("Successfully logged {} metric(s)", count),
        }
    }
}

/// Error envelope: `{"error": {"code": ..., "message": ...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_experiment_defaults_optional_fields() {
        let body: CreateExperiment = serde_json::from_str(r#"{"name":"baseline"}"#).unwrap();
        assert_eq!(body.name, "baseline");
        assert!(body.hyperparameters.is_empty());
        assert!(body.tags.is_empty());
    }

    #[test]
    fn status_update_rejects_unknown_status() {
        assert!(serde_json::from_str::<StatusUpdate>(r#"{"status":"paused"}"#).is_err());
        let ok: StatusUpdate = serde_json::from_str(r#"{"status":"failed"}"#).unwrap();
        assert_eq!(ok.status, ExperimentStatus::Failed);
    }

    #[test]
    fn log_response_message() {
        assert_eq!(
            MetricLogResponse::new(3).message,
            "Successfully logged 3 metric(s)"
        );
    }
}
