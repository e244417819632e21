pub mod schema;
pub mod sqlite;

use crate::services::{
    Artifact, Experiment, ExperimentFilters, MetricQuery, MetricSample, MetricSummary, NewSample,
};
use anyhow::Result;

/// Database trait for experiment, metric and artifact metadata
#[async_trait::async_trait]
pub trait Database: Send + Sync {
    /// Insert a new experiment
    async fn insert_experiment(&self, experiment: &Experiment) -> Result<()>;

    /// Get an experiment by ID
    async fn get_experiment(&self, id: &str) -> Result<Option<Experiment>>;

    /// Check whether an experiment exists
    async fn experiment_exists(&self, id: &str) -> Result<bool>;

    /// List experiments, newest first
    async fn list_experiments(&self, filters: &ExperimentFilters) -> Result<Vec<Experiment>>;

    /// Get every experiment whose ID is in `ids`
    async fn get_experiments(&self, ids: &[String]) -> Result<Vec<Experiment>>;

    /// Overwrite status, tags and hyperparameters of an existing experiment.
    /// Returns false if no such experiment exists.
    async fn update_experiment(&self, experiment: &Experiment) -> Result<bool>;

    /// Delete an experiment together with its samples and artifact records
    async fn delete_experiment(&self, id: &str) -> Result<bool>;

    /// Append samples in one atomic bulk write, returning the number written
    async fn insert_samples(&self, experiment_id: &str, samples: &[NewSample]) -> Result<usize>;

    /// Samples ordered by ascending step, then insertion order
    async fn query_samples(
        &self,
        experiment_id: &str,
        query: &MetricQuery,
    ) -> Result<Vec<MetricSample>>;

    /// One aggregate row per metric name, ordered by name
    async fn summarize_samples(&self, experiment_id: &str) -> Result<Vec<MetricSummary>>;

    /// Insert an artifact record. Returns false if the experiment already has
    /// an artifact with the same filename.
    async fn insert_artifact(&self, artifact: &Artifact) -> Result<bool>;

    /// Get an artifact by ID
    async fn get_artifact(&self, id: &str) -> Result<Option<Artifact>>;

    /// Artifacts of an experiment, most recently uploaded first
    async fn list_artifacts(
        &self,
        experiment_id: &str,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Artifact>>;

    /// Delete an artifact record
    async fn delete_artifact(&self, id: &str) -> Result<bool>;
}
