use super::types::{MetricQuery, MetricSample, MetricSummary, NewSample};
use super::validation::{validate_batch, validate_metric_query};
use super::ServiceError;
use crate::db::Database;
use anyhow::Context;
use std::sync::Arc;

/// Service for appending and reading metric time series
pub struct MetricService {
    db: Arc<dyn Database>,
}

impl MetricService {
    /// Create a new metric service
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Append a batch of samples to an experiment.
    ///
    /// The whole batch is validated before anything is written, and the
    /// write itself is all-or-nothing. Returns the number of samples stored.
    pub async fn ingest(
        &self,
        experiment_id: &str,
        samples: &[NewSample],
    ) -> Result<usize, ServiceError> {
        validate_batch(samples)?;
        self.ensure_experiment(experiment_id).await?;

        let count = self
            .db
            .insert_samples(experiment_id, samples)
            .await
            .context("Failed to store metrics")?;

        tracing::debug!(experiment_id = %experiment_id, count, "Logged metrics");
        Ok(count)
    }

    /// Append a single sample
    pub async fn ingest_one(
        &self,
        experiment_id: &str,
        sample: NewSample,
    ) -> Result<usize, ServiceError> {
        self.ingest(experiment_id, std::slice::from_ref(&sample))
            .await
    }

    /// Read samples ordered by ascending step, ties in insertion order
    pub async fn query(
        &self,
        experiment_id: &str,
        query: &MetricQuery,
    ) -> Result<Vec<MetricSample>, ServiceError> {
        validate_metric_query(query)?;
        self.ensure_experiment(experiment_id).await?;

        Ok(self
            .db
            .query_samples(experiment_id, query)
            .await
            .context("Failed to query metrics")?)
    }

    /// Per-metric aggregates, one entry per distinct metric name
    pub async fn summarize(&self, experiment_id: &str) -> Result<Vec<MetricSummary>, ServiceError> {
        self.ensure_experiment(experiment_id).await?;

        Ok(self
            .db
            .summarize_samples(experiment_id)
            .await
            .context("Failed to summarize metrics")?)
    }

    async fn ensure_experiment(&self, experiment_id: &str) -> Result<(), ServiceError> {
        let exists = self
            .db
            .experiment_exists(experiment_id)
            .await
            .context("Failed to look up experiment")?;

        if !exists {
            return Err(ServiceError::experiment_not_found(experiment_id));
        }
        Ok(())
    }
}
