use anyhow::Result;
use mltrack::db::sqlite::SqliteDatabase;
use mltrack::db::Database;
use mltrack::services::{
    ArtifactService, ConfigService, ExperimentService, MetricService, TrackerConfig,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub experiment_service: Arc<ExperimentService>,
    pub metric_service: Arc<MetricService>,
    pub artifact_service: Arc<ArtifactService>,
    pub config: TrackerConfig,
}

impl AppState {
    /// Load config (defaults, `mltrack.toml`, `MLTRACK_` env) and open storage
    pub async fn from_env() -> Result<Self> {
        let config = ConfigService::from_env().load()?;
        Self::from_config(config).await
    }

    pub async fn from_config(config: TrackerConfig) -> Result<Self> {
        let sqlite = SqliteDatabase::new(&config.storage.database_url).await?;
        sqlite.init().await?;

        tracing::info!(
            database_url = %config.storage.database_url,
            artifacts_path = %config.storage.artifacts_path,
            "Opened storage"
        );

        Ok(Self::with_database(Arc::new(sqlite), config))
    }

    pub fn with_database(db: Arc<dyn Database>, config: TrackerConfig) -> Self {
        let experiment_service = Arc::new(ExperimentService::new(db.clone()));
        let metric_service = Arc::new(MetricService::new(db.clone()));
        let artifact_service = Arc::new(ArtifactService::from_config(db, &config.storage));

        Self {
            experiment_service,
            metric_service,
            artifact_service,
            config,
        }
    }
}
