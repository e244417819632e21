use super::types::{Experiment, ExperimentFilters, ExperimentStatus};
use super::validation::{validate_experiment_filters, validate_experiment_name};
use super::ServiceError;
use crate::db::Database;
use anyhow::Context;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Service for experiment records
pub struct ExperimentService {
    db: Arc<dyn Database>,
}

impl ExperimentService {
    /// Create a new experiment service
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Create an experiment in the running state
    pub async fn create(
        &self,
        name: String,
        hyperparameters: Map<String, Value>,
        tags: Vec<String>,
    ) -> Result<Experiment, ServiceError> {
        validate_experiment_name(&name)?;

        let experiment = Experiment::new(name, hyperparameters, tags);
        self.db
            .insert_experiment(&experiment)
            .await
            .context("Failed to insert experiment")?;

        tracing::info!(experiment_id = %experiment.id, name = %experiment.name, "Created experiment");
        Ok(experiment)
    }

    /// Get experiment by ID
    pub async fn get(&self, id: &str) -> Result<Option<Experiment>, ServiceError> {
        Ok(self
            .db
            .get_experiment(id)
            .await
            .context("Failed to get experiment")?)
    }

    /// Get experiment by ID, failing with NotFound when absent
    pub async fn require(&self, id: &str) -> Result<Experiment, ServiceError> {
        self.get(id)
            .await?
            .ok_or_else(|| ServiceError::experiment_not_found(id))
    }

    /// List experiments with paging and an optional status filter
    pub async fn list(&self, filters: ExperimentFilters) -> Result<Vec<Experiment>, ServiceError> {
        validate_experiment_filters(&filters)?;
        Ok(self
            .db
            .list_experiments(&filters)
            .await
            .context("Failed to list experiments")?)
    }

    /// Fetch several experiments for side-by-side comparison.
    ///
    /// Fails with NotFound only when none of the IDs match.
    pub async fn compare(&self, ids: &[String]) -> Result<Vec<Experiment>, ServiceError> {
        if ids.is_empty() {
            return Err(ServiceError::InvalidInput(
                "At least one experiment id is required".to_string(),
            ));
        }

        let experiments = self
            .db
            .get_experiments(ids)
            .await
            .context("Failed to get experiments")?;

        if experiments.is_empty() {
            return Err(ServiceError::NotFound(
                "No experiments found with the provided IDs".to_string(),
            ));
        }
        Ok(experiments)
    }

    /// Set the lifecycle status
    pub async fn update_status(
        &self,
        id: &str,
        status: ExperimentStatus,
    ) -> Result<Experiment, ServiceError> {
        let mut experiment = self.require(id).await?;
        experiment.status = status;
        self.save(&experiment).await?;

        tracing::info!(experiment_id = %id, %status, "Updated experiment status");
        Ok(experiment)
    }

    /// Replace the tag list
    pub async fn update_tags(&self, id: &str, tags: Vec<String>) -> Result<Experiment, ServiceError> {
        let mut experiment = self.require(id).await?;
        experiment.tags = tags;
        self.save(&experiment).await?;
        Ok(experiment)
    }

    /// Delete an experiment; its samples and artifact records go with it
    pub async fn delete(&self, id: &str) -> Result<bool, ServiceError> {
        let deleted = self
            .db
            .delete_experiment(id)
            .await
            .context("Failed to delete experiment")?;

        if deleted {
            tracing::info!(experiment_id = %id, "Deleted experiment");
        }
        Ok(deleted)
    }

    async fn save(&self, experiment: &Experiment) -> Result<(), ServiceError> {
        let updated = self
            .db
            .update_experiment(experiment)
            .await
            .context("Failed to update experiment")?;

        if !updated {
            return Err(ServiceError::experiment_not_found(&experiment.id));
        }
        Ok(())
    }
}
