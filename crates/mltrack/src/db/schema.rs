//! SQLite schema for experiment tracking metadata.
//!
//! Timestamps are stored as Unix milliseconds so ordering is numeric.
//! `metrics` and `artifacts` cascade from `experiments`.

pub const EXPERIMENTS_TABLE: &str = "experiments";
pub const METRICS_TABLE: &str = "metrics";
pub const ARTIFACTS_TABLE: &str = "artifacts";

/// Statements applied in order on startup; each is idempotent.
pub const MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS experiments (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'running',
        hyperparameters TEXT NOT NULL DEFAULT '{}',
        tags TEXT NOT NULL DEFAULT '[]',
        created_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_experiments_status_created
        ON experiments (status, created_at)",
    "CREATE TABLE IF NOT EXISTS metrics (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        experiment_id TEXT NOT NULL REFERENCES experiments (id) ON DELETE CASCADE,
        step INTEGER NOT NULL CHECK (step >= 0),
        metric_name TEXT NOT NULL,
        value REAL NOT NULL,
        timestamp INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_metrics_experiment_step
        ON metrics (experiment_id, step, id)",
    "CREATE INDEX IF NOT EXISTS idx_metrics_experiment_name_step
        ON metrics (experiment_id, metric_name, step, id)",
    "CREATE TABLE IF NOT EXISTS artifacts (
        id TEXT PRIMARY KEY NOT NULL,
        experiment_id TEXT NOT NULL REFERENCES experiments (id) ON DELETE CASCADE,
        filename TEXT NOT NULL,
        filepath TEXT NOT NULL,
        size_bytes INTEGER NOT NULL CHECK (size_bytes >= 0),
        uploaded_at INTEGER NOT NULL,
        UNIQUE (experiment_id, filename)
    )",
    "CREATE INDEX IF NOT EXISTS idx_artifacts_experiment_uploaded
        ON artifacts (experiment_id, uploaded_at)",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_table_is_created() {
        for table in [EXPERIMENTS_TABLE, METRICS_TABLE, ARTIFACTS_TABLE] {
            let needle = format!("CREATE TABLE IF NOT EXISTS {} (", table);
            assert!(
                MIGRATIONS.iter().any(|m| m.contains(&needle)),
                "missing table {}",
                table
            );
        }
    }

    #[test]
    fn child_tables_cascade() {
        let cascading = MIGRATIONS
            .iter()
            .filter(|m| m.contains("ON DELETE CASCADE"))
            .count();
        assert_eq!(cascading, 2);
    }
}
