//! Test utilities for the mltrack crate
//!
//! Provides an in-memory `Database` implementation that mirrors the ordering
//! and cascade rules of the SQLite backend, plus switches for injecting
//! failures into artifact and sample writes.

use crate::db::Database;
use crate::services::{
    Artifact, Experiment, ExperimentFilters, MetricQuery, MetricSample, MetricSummary, NewSample,
};
use anyhow::Result;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct State {
    experiments: Vec<Experiment>,
    samples: Vec<MetricSample>,
    artifacts: Vec<Artifact>,
    next_sample_id: i64,
}

/// In-memory database implementation for testing.
///
/// Thread-safe via Mutex, suitable for unit tests.
#[derive(Default)]
pub struct TestDatabase {
    state: Mutex<State>,
    fail_artifact_inserts: AtomicBool,
    fail_sample_inserts: AtomicBool,
}

impl TestDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `insert_artifact` call fail
    pub fn fail_artifact_inserts(&self, fail: bool) {
        self.fail_artifact_inserts.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `insert_samples` call fail
    pub fn fail_sample_inserts(&self, fail: bool) {
        self.fail_sample_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn sample_count(&self) -> usize {
        self.state.lock().unwrap().samples.len()
    }

    pub fn artifact_count(&self) -> usize {
        self.state.lock().unwrap().artifacts.len()
    }
}

#[async_trait::async_trait]
impl Database for TestDatabase {
    async fn insert_experiment(&self, experiment: &Experiment) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .experiments
            .push(experiment.clone());
        Ok(())
    }

    async fn get_experiment(&self, id: &str) -> Result<Option<Experiment>> {
        let state = self.state.lock().unwrap();
        Ok(state.experiments.iter().find(|e| e.id == id).cloned())
    }

    async fn experiment_exists(&self, id: &str) -> Result<bool> {
        let state = self.state.lock().unwrap();
        Ok(state.experiments.iter().any(|e| e.id == id))
    }

    async fn list_experiments(&self, filters: &ExperimentFilters) -> Result<Vec<Experiment>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .experiments
            .iter()
            .rev()
            .filter(|e| filters.status.is_none_or(|s| e.status == s))
            .skip(filters.offset().unwrap_or(usize::MAX))
            .take(filters.size)
            .cloned()
            .collect())
    }

    async fn get_experiments(&self, ids: &[String]) -> Result<Vec<Experiment>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .experiments
            .iter()
            .filter(|e| ids.contains(&e.id))
            .cloned()
            .collect())
    }

    async fn update_experiment(&self, experiment: &Experiment) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        match state.experiments.iter_mut().find(|e| e.id == experiment.id) {
            Some(existing) => {
                *existing = experiment.clone();
                Ok(true)
            },
            None => Ok(false),
        }
    }

    async fn delete_experiment(&self, id: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let before = state.experiments.len();
        state.experiments.retain(|e| e.id != id);
        if state.experiments.len() == before {
            return Ok(false);
        }
        state.samples.retain(|s| s.experiment_id != id);
        state.artifacts.retain(|a| a.experiment_id != id);
        Ok(true)
    }

    async fn insert_samples(&self, experiment_id: &str, samples: &[NewSample]) -> Result<usize> {
        if self.fail_sample_inserts.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("injected sample insert failure"));
        }

        let mut state = self.state.lock().unwrap();
        if !state.experiments.iter().any(|e| e.id == experiment_id) {
            return Err(anyhow::anyhow!("FOREIGN KEY constraint failed"));
        }

        let timestamp = Utc::now();
        for sample in samples {
            state.next_sample_id += 1;
            let id = state.next_sample_id;
            state.samples.push(MetricSample {
                id,
                experiment_id: experiment_id.to_string(),
                step: sample.step,
                metric_name: sample.metric_name.clone(),
                value: sample.value,
                timestamp,
            });
        }
        Ok(samples.len())
    }

    async fn query_samples(
        &self,
        experiment_id: &str,
        query: &MetricQuery,
    ) -> Result<Vec<MetricSample>> {
        let state = self.state.lock().unwrap();
        let mut matching: Vec<MetricSample> = state
            .samples
            .iter()
            .filter(|s| s.experiment_id == experiment_id)
            .filter(|s| query.metric_name.as_ref().is_none_or(|n| s.metric_name == *n))
            .cloned()
            .collect();
        matching.sort_by_key(|s| (s.step, s.id));

        Ok(matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }

    async fn summarize_samples(&self, experiment_id: &str) -> Result<Vec<MetricSummary>> {
        let state = self.state.lock().unwrap();
        let mut grouped: BTreeMap<&str, Vec<&MetricSample>> = BTreeMap::new();
        for sample in state
            .samples
            .iter()
            .filter(|s| s.experiment_id == experiment_id)
        {
            grouped
                .entry(sample.metric_name.as_str())
                .or_default()
                .push(sample);
        }

        Ok(grouped
            .into_iter()
            .map(|(name, samples)| {
                let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
                let latest = samples
                    .iter()
                    .max_by_key(|s| (s.step, s.id))
                    .map(|s| s.value)
                    .unwrap_or_default();
                MetricSummary {
                    metric_name: name.to_string(),
                    min: values.iter().copied().fold(f64::INFINITY, f64::min),
                    max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    mean: values.iter().sum::<f64>() / values.len() as f64,
                    latest,
                    count: values.len() as u64,
                }
            })
            .collect())
    }

    async fn insert_artifact(&self, artifact: &Artifact) -> Result<bool> {
        if self.fail_artifact_inserts.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("injected artifact insert failure"));
        }

        let mut state = self.state.lock().unwrap();
        let duplicate = state
            .artifacts
            .iter()
            .any(|a| a.experiment_id == artifact.experiment_id && a.filename == artifact.filename);
        if duplicate {
            return Ok(false);
        }
        state.artifacts.push(artifact.clone());
        Ok(true)
    }

    async fn get_artifact(&self, id: &str) -> Result<Option<Artifact>> {
        let state = self.state.lock().unwrap();
        Ok(state.artifacts.iter().find(|a| a.id == id).cloned())
    }

    async fn list_artifacts(
        &self,
        experiment_id: &str,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Artifact>> {
        let state = self.state.lock().unwrap();
        // Reverse insertion order first so equal timestamps list newest first
        let mut matching: Vec<Artifact> = state
            .artifacts
            .iter()
            .rev()
            .filter(|a| a.experiment_id == experiment_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));

        Ok(matching.into_iter().skip(skip).take(limit).collect())
    }

    async fn delete_artifact(&self, id: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let before = state.artifacts.len();
        state.artifacts.retain(|a| a.id != id);
        Ok(state.artifacts.len() < before)
    }
}
