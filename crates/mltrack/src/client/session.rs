use super::{ClientError, Result, TrackerClient};
use crate::services::{Artifact, Experiment, ExperimentStatus, NewSample};
use crate::wire::MetricLogResponse;
use serde_json::{Map, Value};
use std::future::Future;
use std::path::Path;

/// One active experiment, from `start` to `finish`.
///
/// ```no_run
/// # async fn train() -> mltrack::client::Result<()> {
/// use mltrack::client::{Session, TrackerClient};
/// use mltrack::services::ExperimentStatus;
///
/// let client = TrackerClient::new("http://localhost:8000");
/// let session = Session::start(client, "resnet-baseline", vec![], Default::default()).await?;
/// for epoch in 0..10 {
///     session.log("loss", 1.0 / (epoch + 1) as f64, epoch).await?;
/// }
/// session.finish(ExperimentStatus::Completed).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Session {
    client: TrackerClient,
    experiment: Experiment,
}

impl Session {
    /// Create a new experiment and track it
    pub async fn start(
        client: TrackerClient,
        name: &str,
        tags: Vec<String>,
        hyperparameters: Map<String, Value>,
    ) -> Result<Self> {
        let experiment = client
            .create_experiment(name, tags, hyperparameters)
            .await?;
        tracing::info!(experiment_id = %experiment.id, name = %name, "Started experiment");
        Ok(Self { client, experiment })
    }

    /// Run `train` inside a new experiment.
    ///
    /// The experiment is finished as completed when `train` returns `Ok` and
    /// as failed when it returns `Err`, in which case the training error is
    /// returned unchanged.
    ///
    /// ```no_run
    /// # async fn train() -> anyhow::Result<()> {
    /// use mltrack::client::{Session, TrackerClient};
    ///
    /// let client = TrackerClient::new("http://localhost:8000");
    /// let best = Session::run(client, "sweep-3", vec![], Default::default(), |session| async move {
    ///     session.log("loss", 0.12, 0).await?;
    ///     Ok::<_, anyhow::Error>(0.12)
    /// })
    /// .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run<F, Fut, T, E>(
        client: TrackerClient,
        name: &str,
        tags: Vec<String>,
        hyperparameters: Map<String, Value>,
        train: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<ClientError>,
    {
        let session = Self::start(client, name, tags, hyperparameters).await?;

        match train(session.clone()).await {
            Ok(value) => {
                session.finish(ExperimentStatus::Completed).await?;
                Ok(value)
            },
            Err(err) => {
                let experiment_id = session.id().to_string();
                if let Err(finish_err) = session.finish(ExperimentStatus::Failed).await {
                    tracing::warn!(
                        experiment_id = %experiment_id,
                        error = %finish_err,
                        "Failed to mark experiment as failed"
                    );
                }
                Err(err)
            },
        }
    }

    /// Attach to an experiment that already exists
    pub async fn resume(client: TrackerClient, experiment_id: &str) -> Result<Self> {
        let experiment = client.get_experiment(experiment_id).await?;
        Ok(Self { client, experiment })
    }

    pub fn id(&self) -> &str {
        &self.experiment.id
    }

    pub fn experiment(&self) -> &Experiment {
        &self.experiment
    }

    /// Log a single metric value
    pub async fn log(&self, metric_name: &str, value: f64, step: i64) -> Result<()> {
        self.client
            .log_metric(self.id(), &NewSample::new(metric_name, step, value))
            .await?;
        Ok(())
    }

    /// Log several metrics at the same step in one request
    pub async fn log_many<I, K>(&self, metrics: I, step: i64) -> Result<MetricLogResponse>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let samples = metrics
            .into_iter()
            .map(|(name, value)| NewSample::new(name, step, value))
            .collect();
        self.client.log_metrics(self.id(), samples).await
    }

    /// Upload a local file as an artifact of this experiment
    pub async fn save_artifact(&self, path: impl AsRef<Path>) -> Result<Artifact> {
        self.client.upload_artifact(self.id(), path.as_ref()).await
    }

    /// Add tags, keeping the ones already present
    pub async fn add_tags<I, T>(&mut self, tags: I) -> Result<&Experiment>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let current = self.client.get_experiment(self.id()).await?;
        let merged = merge_tags(current.tags, tags);
        self.experiment = self.client.update_tags(self.id(), merged).await?;
        Ok(&self.experiment)
    }

    /// Mark the experiment finished and end the session
    pub async fn finish(self, status: ExperimentStatus) -> Result<Experiment> {
        let experiment = self.client.update_status(self.id(), status).await?;
        tracing::info!(experiment_id = %experiment.id, %status, "Finished experiment");
        Ok(experiment)
    }
}

fn merge_tags<I, T>(mut current: Vec<String>, extra: I) -> Vec<String>
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    for tag in extra {
        let tag = tag.into();
        if !current.contains(&tag) {
            current.push(tag);
        }
    }
    current
}
