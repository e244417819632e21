use super::{schema, Database};
use crate::services::{
    Artifact, Experiment, ExperimentFilters, MetricQuery, MetricSample, MetricSummary, NewSample,
};
use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::str::FromStr;

/// SQLite implementation backed by a sqlx connection pool
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Open (or create) a database from a sqlx URL such as
    /// `sqlite://mltrack.db` or `sqlite::memory:`
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid database URL")?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let in_memory = database_url.contains(":memory:");
        if !in_memory {
            if let Some(parent) = options.get_filename().parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .context("Failed to create database directory")?;
                }
            }
        }

        // Every in-memory connection is its own database, so keep one.
        let max_connections = if in_memory { 1 } else { 10 };

        let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections);
        if in_memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite")?;

        Ok(Self { pool })
    }

    /// Open a private in-memory database with the schema applied
    pub async fn in_memory() -> Result<Self> {
        let db = Self::new("sqlite::memory:").await?;
        db.init().await?;
        Ok(db)
    }

    /// Apply schema migrations
    pub async fn init(&self) -> Result<()> {
        for statement in schema::MIGRATIONS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to apply schema migration")?;
        }
        Ok(())
    }

    fn experiment_from_row(row: &SqliteRow) -> Result<Experiment> {
        let status: String = row.try_get("status")?;
        let hyperparameters: String = row.try_get("hyperparameters")?;
        let tags: String = row.try_get("tags")?;

        Ok(Experiment {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            status: status.parse()?,
            hyperparameters: serde_json::from_str(&hyperparameters)
                .context("Invalid hyperparameters column")?,
            tags: serde_json::from_str(&tags).context("Invalid tags column")?,
            created_at: millis_to_datetime(row.try_get("created_at")?)?,
        })
    }

    fn sample_from_row(row: &SqliteRow) -> Result<MetricSample> {
        Ok(MetricSample {
            id: row.try_get("id")?,
            experiment_id: row.try_get("experiment_id")?,
            step: row.try_get("step")?,
            metric_name: row.try_get("metric_name")?,
            value: row.try_get("value")?,
            timestamp: millis_to_datetime(row.try_get("timestamp")?)?,
        })
    }

    fn artifact_from_row(row: &SqliteRow) -> Result<Artifact> {
        let size_bytes: i64 = row.try_get("size_bytes")?;

        Ok(Artifact {
            id: row.try_get("id")?,
            experiment_id: row.try_get("experiment_id")?,
            filename: row.try_get("filename")?,
            filepath: row.try_get("filepath")?,
            size_bytes: u64::try_from(size_bytes).context("Negative artifact size")?,
            uploaded_at: millis_to_datetime(row.try_get("uploaded_at")?)?,
        })
    }
}

fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| anyhow::anyhow!("Invalid timestamp: {}", millis))
}

#[async_trait::async_trait]
impl Database for SqliteDatabase {
    async fn insert_experiment(&self, experiment: &Experiment) -> Result<()> {
        let hyperparameters = serde_json::to_string(&experiment.hyperparameters)
            .context("Failed to serialize hyperparameters")?;
        let tags = serde_json::to_string(&experiment.tags).context("Failed to serialize tags")?;

        sqlx::query(
            "INSERT INTO experiments (id, name, status, hyperparameters, tags, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&experiment.id)
        .bind(&experiment.name)
        .bind(experiment.status.to_string())
        .bind(hyperparameters)
        .bind(tags)
        .bind(experiment.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to insert experiment")?;

        Ok(())
    }

    async fn get_experiment(&self, id: &str) -> Result<Option<Experiment>> {
        let row = sqlx::query("SELECT * FROM experiments WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get experiment")?;

        row.as_ref().map(Self::experiment_from_row).transpose()
    }

    async fn experiment_exists(&self, id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM experiments WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up experiment")?;

        Ok(row.is_some())
    }

    async fn list_experiments(&self, filters: &ExperimentFilters) -> Result<Vec<Experiment>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM experiments");
        if let Some(status) = filters.status {
            qb.push(" WHERE status = ");
            qb.push_bind(status.to_string());
        }
        qb.push(" ORDER BY created_at DESC, rowid DESC LIMIT ");
        qb.push_bind(sql_count(filters.size));
        qb.push(" OFFSET ");
        qb.push_bind(sql_count(filters.offset().unwrap_or(usize::MAX)));

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list experiments")?;

        rows.iter().map(Self::experiment_from_row).collect()
    }

    async fn get_experiments(&self, ids: &[String]) -> Result<Vec<Experiment>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM experiments WHERE id IN (");
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(id.clone());
        }
        separated.push_unseparated(") ORDER BY created_at ASC, rowid ASC");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to get experiments")?;

        rows.iter().map(Self::experiment_from_row).collect()
    }

    async fn update_experiment(&self, experiment: &Experiment) -> Result<bool> {
        let hyperparameters = serde_json::to_string(&experiment.hyperparameters)
            .context("Failed to serialize hyperparameters")?;
        let tags = serde_json::to_string(&experiment.tags).context("Failed to serialize tags")?;

        let result = sqlx::query(
            "UPDATE experiments SET name = ?1, status = ?2, hyperparameters = ?3, tags = ?4
             WHERE id = ?5",
        )
        .bind(&experiment.name)
        .bind(experiment.status.to_string())
        .bind(hyperparameters)
        .bind(tags)
        .bind(&experiment.id)
        .execute(&self.pool)
        .await
        .context("Failed to update experiment")?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_experiment(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM experiments WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete experiment")?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_samples(&self, experiment_id: &str, samples: &[NewSample]) -> Result<usize> {
        if samples.is_empty() {
            return Ok(0);
        }

        let timestamp = Utc::now().timestamp_millis();

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin metrics transaction")?;

        let mut qb = QueryBuilder::<Sqlite>::new(
            "INSERT INTO metrics (experiment_id, step, metric_name, value, timestamp) ",
        );
        qb.push_values(samples, |mut row, sample| {
            row.push_bind(experiment_id.to_string())
                .push_bind(sample.step)
                .push_bind(sample.metric_name.clone())
                .push_bind(sample.value)
                .push_bind(timestamp);
        });

        let result = qb
            .build()
            .execute(&mut *tx)
            .await
            .context("Failed to insert metrics")?;

        tx.commit()
            .await
            .context("Failed to commit metrics transaction")?;

        Ok(result.rows_affected() as usize)
    }

    async fn query_samples(
        &self,
        experiment_id: &str,
        query: &MetricQuery,
    ) -> Result<Vec<MetricSample>> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, experiment_id, step, metric_name, value, timestamp
             FROM metrics WHERE experiment_id = ",
        );
        qb.push_bind(experiment_id.to_string());
        if let Some(name) = &query.metric_name {
            qb.push(" AND metric_name = ");
            qb.push_bind(name.clone());
        }
        qb.push(" ORDER BY step ASC, id ASC LIMIT ");
        qb.push_bind(sql_count(query.limit));
        qb.push(" OFFSET ");
        qb.push_bind(sql_count(query.offset));

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to query metrics")?;

        rows.iter().map(Self::sample_from_row).collect()
    }

    async fn summarize_samples(&self, experiment_id: &str) -> Result<Vec<MetricSummary>> {
        let rows = sqlx::query(
            "SELECT m.metric_name AS metric_name,
                    MIN(m.value) AS min_value,
                    MAX(m.value) AS max_value,
                    AVG(m.value) AS mean_value,
                    COUNT(*) AS sample_count,
                    (SELECT l.value FROM metrics l
                      WHERE l.experiment_id = ?1 AND l.metric_name = m.metric_name
                      ORDER BY l.step DESC, l.id DESC
                      LIMIT 1) AS latest_value
             FROM metrics m
             WHERE m.experiment_id = ?1
             GROUP BY m.metric_name
             ORDER BY m.metric_name",
        )
        .bind(experiment_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to summarize metrics")?;

        rows.iter()
            .map(|row| {
                let count: i64 = row.try_get("sample_count")?;
                Ok(MetricSummary {
                    metric_name: row.try_get("metric_name")?,
                    min: row.try_get("min_value")?,
                    max: row.try_get("max_value")?,
                    mean: row.try_get("mean_value")?,
                    latest: row.try_get("latest_value")?,
                    count: u64::try_from(count).context("Negative sample count")?,
                })
            })
            .collect()
    }

    async fn insert_artifact(&self, artifact: &Artifact) -> Result<bool> {
        let size_bytes = i64::try_from(artifact.size_bytes).context("Artifact size overflow")?;

        let result = sqlx::query(
            "INSERT INTO artifacts (id, experiment_id, filename, filepath, size_bytes, uploaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (experiment_id, filename) DO NOTHING",
        )
        .bind(&artifact.id)
        .bind(&artifact.experiment_id)
        .bind(&artifact.filename)
        .bind(&artifact.filepath)
        .bind(size_bytes)
        .bind(artifact.uploaded_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to insert artifact")?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_artifact(&self, id: &str) -> Result<Option<Artifact>> {
        let row = sqlx::query("SELECT * FROM artifacts WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get artifact")?;

        row.as_ref().map(Self::artifact_from_row).transpose()
    }

    async fn list_artifacts(
        &self,
        experiment_id: &str,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Artifact>> {
        let rows = sqlx::query(
            "SELECT * FROM artifacts WHERE experiment_id = ?1
             ORDER BY uploaded_at DESC, rowid DESC
             LIMIT ?2 OFFSET ?3",
        )
        .bind(experiment_id)
        .bind(sql_count(limit))
        .bind(sql_count(skip))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list artifacts")?;

        rows.iter().map(Self::artifact_from_row).collect()
    }

    async fn delete_artifact(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM artifacts WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete artifact")?;

        Ok(result.rows_affected() > 0)
    }
}

/// LIMIT/OFFSET bind value. SQLite reads a negative OFFSET as zero, so
/// counts beyond `i64::MAX` saturate instead of wrapping.
fn sql_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
