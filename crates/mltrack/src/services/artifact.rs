use super::types::{Artifact, StorageConfig, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_ARTIFACT_BYTES};
use super::validation::sanitize_filename;
use super::ServiceError;
use crate::db::Database;
use anyhow::Context;
use futures::io::{AsyncRead, AsyncReadExt};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

const MIB: u64 = 1024 * 1024;

/// An artifact record together with an open handle on its file
#[derive(Debug)]
pub struct ArtifactContent {
    pub artifact: Artifact,
    pub file: File,
}

/// Service for storing uploaded files and their records.
///
/// Files live at `<root>/<experiment_id>/<sanitized filename>`. The file is
/// always written before its record is inserted and removed before its
/// record is deleted; a failure between the two steps is compensated by
/// removing the file.
pub struct ArtifactService {
    db: Arc<dyn Database>,
    root: PathBuf,
    max_bytes: u64,
    chunk_size: usize,
}

impl ArtifactService {
    /// Create a new artifact service rooted at `root` with default limits
    pub fn new(db: Arc<dyn Database>, root: impl Into<PathBuf>) -> Self {
        Self {
            db,
            root: root.into(),
            max_bytes: DEFAULT_MAX_ARTIFACT_BYTES,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Create an artifact service from storage configuration
    pub fn from_config(db: Arc<dyn Database>, config: &StorageConfig) -> Self {
        Self::new(db, &config.artifacts_path).with_limits(config.max_artifact_bytes, config.chunk_size)
    }

    /// Override the size cap and the read chunk size
    pub fn with_limits(mut self, max_bytes: u64, chunk_size: usize) -> Self {
        self.max_bytes = max_bytes;
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stream `content` into a new artifact file and record it.
    ///
    /// Fails with AlreadyExists if the experiment already has an artifact
    /// with the same sanitized name, and with PayloadTooLarge once more than
    /// the configured cap has been read. Any failure after the file was
    /// created removes it, including the future being dropped mid-write.
    pub async fn store<R>(
        &self,
        experiment_id: &str,
        filename: &str,
        mut content: R,
    ) -> Result<Artifact, ServiceError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let exists = self
            .db
            .experiment_exists(experiment_id)
            .await
            .context("Failed to look up experiment")?;
        if !exists {
            return Err(ServiceError::experiment_not_found(experiment_id));
        }

        let filename = sanitize_filename(filename)?;
        let dir = self.experiment_dir(experiment_id).ok_or_else(|| {
            ServiceError::InvalidInput(format!("Invalid experiment id '{}'", experiment_id))
        })?;

        tokio::fs::create_dir_all(&dir)
            .await
            .context("Failed to create artifact directory")?;

        let path = dir.join(&filename);
        let file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(duplicate_name(experiment_id, &filename));
            },
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context("Failed to create artifact file")
                    .into());
            },
        };

        let partial = PartialFile::new(path.clone());
        let size_bytes = match self.write_content(file, &mut content).await {
            Ok(size) => size,
            Err(err) => {
                partial.discard().await;
                return Err(err);
            },
        };

        let artifact = Artifact::new(
            experiment_id.to_string(),
            filename,
            path.to_string_lossy().into_owned(),
            size_bytes,
        );

        match self.db.insert_artifact(&artifact).await {
            Ok(true) => partial.keep(),
            Ok(false) => {
                partial.discard().await;
                return Err(duplicate_name(experiment_id, &artifact.filename));
            },
            Err(err) => {
                partial.discard().await;
                return Err(err.context("Failed to record artifact").into());
            },
        }

        tracing::info!(
            artifact_id = %artifact.id,
            experiment_id = %experiment_id,
            filename = %artifact.filename,
            size_bytes,
            "Stored artifact"
        );
        Ok(artifact)
    }

    /// Get artifact by ID
    pub async fn get(&self, id: &str) -> Result<Artifact, ServiceError> {
        self.db
            .get_artifact(id)
            .await
            .context("Failed to get artifact")?
            .ok_or_else(|| ServiceError::artifact_not_found(id))
    }

    /// Artifacts of an experiment, most recently uploaded first.
    ///
    /// An unknown experiment simply has no artifacts.
    pub async fn list(
        &self,
        experiment_id: &str,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Artifact>, ServiceError> {
        Ok(self
            .db
            .list_artifacts(experiment_id, skip, limit)
            .await
            .context("Failed to list artifacts")?)
    }

    /// Open an artifact's file for reading
    pub async fn retrieve_content(&self, id: &str) -> Result<ArtifactContent, ServiceError> {
        let artifact = self.get(id).await?;

        let file = match File::open(&artifact.filepath).await {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ServiceError::NotFound(
                    "Artifact file not found on disk".to_string(),
                ));
            },
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context("Failed to open artifact file")
                    .into());
            },
        };

        Ok(ArtifactContent { artifact, file })
    }

    /// Delete an artifact's file and record.
    ///
    /// A file that cannot be removed is logged and otherwise ignored.
    pub async fn delete(&self, id: &str) -> Result<bool, ServiceError> {
        let artifact = self.get(id).await?;

        remove_file_logged(Path::new(&artifact.filepath)).await;

        let deleted = self
            .db
            .delete_artifact(id)
            .await
            .context("Failed to delete artifact record")?;

        if deleted {
            tracing::info!(artifact_id = %id, experiment_id = %artifact.experiment_id, "Deleted artifact");
        }
        Ok(deleted)
    }

    /// Remove an experiment's artifact directory.
    ///
    /// Called after the experiment itself has been deleted; the records are
    /// already gone by then, so failures are only logged.
    pub async fn purge_experiment(&self, experiment_id: &str) {
        let Some(dir) = self.experiment_dir(experiment_id) else {
            tracing::warn!(experiment_id = %experiment_id, "Refusing to purge artifacts for unsafe experiment id");
            return;
        };

        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                tracing::info!(experiment_id = %experiment_id, "Purged artifact directory");
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => {},
            Err(err) => {
                tracing::warn!(
                    experiment_id = %experiment_id,
                    error = %err,
                    "Failed to purge artifact directory"
                );
            },
        }
    }

    async fn write_content<R>(&self, mut file: File, content: &mut R) -> Result<u64, ServiceError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut buf = vec![0u8; self.chunk_size];
        let mut total: u64 = 0;

        loop {
            let n = content
                .read(&mut buf)
                .await
                .context("Failed to read upload")?;
            if n == 0 {
                break;
            }

            total += n as u64;
            if total > self.max_bytes {
                return Err(ServiceError::PayloadTooLarge(format!(
                    "File size exceeds {} limit",
                    format_limit(self.max_bytes)
                )));
            }

            file.write_all(&buf[..n])
                .await
                .context("Failed to write artifact file")?;
        }

        file.flush().await.context("Failed to write artifact file")?;
        file.sync_all()
            .await
            .context("Failed to write artifact file")?;
        Ok(total)
    }

    /// Directory for an experiment's files, if the id is a single plain
    /// path component.
    fn experiment_dir(&self, experiment_id: &str) -> Option<PathBuf> {
        let mut components = Path::new(experiment_id).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => Some(self.root.join(name)),
            _ => None,
        }
    }
}

fn duplicate_name(experiment_id: &str, filename: &str) -> ServiceError {
    ServiceError::AlreadyExists(format!(
        "Artifact '{}' already exists for experiment {}",
        filename, experiment_id
    ))
}

fn format_limit(bytes: u64) -> String {
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{} MB", bytes / MIB)
    } else {
        format!("{} bytes", bytes)
    }
}

async fn remove_file_logged(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {},
        Err(err) if err.kind() == io::ErrorKind::NotFound => {},
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Failed to remove artifact file");
        },
    }
}

/// A file that is removed unless explicitly kept.
///
/// `discard` removes it asynchronously on error paths; `Drop` covers the
/// case where the owning future is dropped before finishing.
struct PartialFile {
    path: Option<PathBuf>,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn keep(mut self) {
        self.path = None;
    }

    async fn discard(mut self) {
        if let Some(path) = self.path.take() {
            remove_file_logged(&path).await;
        }
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(err) = std::fs::remove_file(&path) {
                if err.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %err, "Failed to remove partial artifact file");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::Experiment;
    use crate::testing::TestDatabase;
    use futures::stream::{self, StreamExt, TryStreamExt};
    use serde_json::Map;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        db: Arc<TestDatabase>,
        service: ArtifactService,
        experiment_id: String,
        _dir: TempDir,
    }

    async fn setup() -> Fixture {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(TestDatabase::new());
        let experiment = Experiment::new("exp".to_string(), Map::new(), vec![]);
        db.insert_experiment(&experiment).await.unwrap();
        let service = ArtifactService::new(db.clone(), dir.path().join("artifacts"));

        Fixture {
            db,
            service,
            experiment_id: experiment.id,
            _dir: dir,
        }
    }

    fn files_in(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    mod store {
        use super::*;

        #[tokio::test]
        async fn writes_file_and_record() {
            let fx = setup().await;
            let artifact = fx
                .service
                .store(&fx.experiment_id, "model.pt", &b"weights"[..])
                .await
                .unwrap();

            assert_eq!(artifact.filename, "model.pt");
            assert_eq!(artifact.size_bytes, 7);
            assert_eq!(
                PathBuf::from(&artifact.filepath),
                fx.service.root().join(&fx.experiment_id).join("model.pt")
            );
            assert_eq!(tokio::fs::read(&artifact.filepath).await.unwrap(), b"weights");
            assert_eq!(fx.db.artifact_count(), 1);
        }

        #[tokio::test]
        async fn streams_in_small_chunks() {
            let fx = setup().await;
            let service = ArtifactService::new(fx.db.clone(), fx.service.root()).with_limits(1024, 3);
            let body: Vec<u8> = (0..=255u8).collect();

            let artifact = service
                .store(&fx.experiment_id, "bytes.bin", futures::io::Cursor::new(body.clone()))
                .await
                .unwrap();

            assert_eq!(artifact.size_bytes, 256);
            assert_eq!(tokio::fs::read(&artifact.filepath).await.unwrap(), body);
        }

        #[tokio::test]
        async fn traversal_lands_inside_experiment_dir() {
            let fx = setup().await;
            let artifact = fx
                .service
                .store(&fx.experiment_id, "../../../etc/passwd", &b"x"[..])
                .await
                .unwrap();

            assert_eq!(artifact.filename, "passwd");
            assert!(Path::new(&artifact.filepath).starts_with(fx.service.root().join(&fx.experiment_id)));
        }

        #[tokio::test]
        async fn unknown_experiment_touches_nothing() {
            let fx = setup().await;
            let err = fx
                .service
                .store("missing", "model.pt", &b"x"[..])
                .await
                .unwrap_err();

            assert!(matches!(err, ServiceError::NotFound(_)));
            assert!(!fx.service.root().exists());
        }

        #[tokio::test]
        async fn invalid_filename_rejected_before_write() {
            let fx = setup().await;
            let err = fx
                .service
                .store(&fx.experiment_id, "...", &b"x"[..])
                .await
                .unwrap_err();

            assert!(matches!(err, ServiceError::InvalidInput(_)));
            assert!(!fx.service.root().exists());
        }

        #[tokio::test]
        async fn duplicate_name_keeps_first_upload() {
            let fx = setup().await;
            fx.service
                .store(&fx.experiment_id, "model.pt", &b"first"[..])
                .await
                .unwrap();

            let err = fx
                .service
                .store(&fx.experiment_id, "model.pt", &b"second"[..])
                .await
                .unwrap_err();

            assert!(matches!(err, ServiceError::AlreadyExists(_)));
            assert_eq!(fx.db.artifact_count(), 1);
            let path = fx.service.root().join(&fx.experiment_id).join("model.pt");
            assert_eq!(tokio::fs::read(path).await.unwrap(), b"first");
        }

        #[tokio::test]
        async fn record_collision_removes_new_file() {
            let fx = setup().await;
            let existing = Artifact::new(
                fx.experiment_id.clone(),
                "model.pt".to_string(),
                "/elsewhere/model.pt".to_string(),
                1,
            );
            fx.db.insert_artifact(&existing).await.unwrap();

            let err = fx
                .service
                .store(&fx.experiment_id, "model.pt", &b"data"[..])
                .await
                .unwrap_err();

            assert!(matches!(err, ServiceError::AlreadyExists(_)));
            assert_eq!(files_in(&fx.service.root().join(&fx.experiment_id)), 0);
        }

        #[tokio::test]
        async fn oversize_upload_leaves_nothing() {
            let fx = setup().await;
            let service = ArtifactService::new(fx.db.clone(), fx.service.root()).with_limits(16, 4);

            let err = service
                .store(&fx.experiment_id, "big.bin", &[0u8; 17][..])
                .await
                .unwrap_err();

            assert!(matches!(err, ServiceError::PayloadTooLarge(_)));
            assert_eq!(files_in(&service.root().join(&fx.experiment_id)), 0);
            assert_eq!(fx.db.artifact_count(), 0);

            let artifact = service
                .store(&fx.experiment_id, "exact.bin", &[0u8; 16][..])
                .await
                .unwrap();
            assert_eq!(artifact.size_bytes, 16);
        }

        #[tokio::test]
        async fn oversize_message_names_limit_in_megabytes() {
            let fx = setup().await;
            let service = ArtifactService::new(fx.db.clone(), fx.service.root()).with_limits(MIB, 4096);
            let body = vec![0u8; MIB as usize + 1];

            let err = service
                .store(&fx.experiment_id, "big.bin", &body[..])
                .await
                .unwrap_err();
            assert_eq!(err.message(), "File size exceeds 1 MB limit");
        }

        #[tokio::test]
        async fn read_failure_removes_partial_file() {
            let fx = setup().await;
            let chunks: Vec<io::Result<Vec<u8>>> = vec![
                Ok(b"partial".to_vec()),
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")),
            ];
            let reader = stream::iter(chunks).into_async_read();

            let err = fx
                .service
                .store(&fx.experiment_id, "model.pt", reader)
                .await
                .unwrap_err();

            assert!(matches!(err, ServiceError::Internal(_)));
            assert_eq!(err.message(), "Failed to read upload");
            assert_eq!(files_in(&fx.service.root().join(&fx.experiment_id)), 0);
            assert_eq!(fx.db.artifact_count(), 0);
        }

        #[tokio::test]
        async fn record_failure_removes_file() {
            let fx = setup().await;
            fx.db.fail_artifact_inserts(true);

            let err = fx
                .service
                .store(&fx.experiment_id, "model.pt", &b"weights"[..])
                .await
                .unwrap_err();

            assert!(matches!(err, ServiceError::Internal(_)));
            assert_eq!(files_in(&fx.service.root().join(&fx.experiment_id)), 0);
        }

        #[tokio::test]
        async fn dropped_upload_removes_partial_file() {
            let fx = setup().await;
            let first: Vec<io::Result<Vec<u8>>> = vec![Ok(b"partial".to_vec())];
            let reader = stream::iter(first)
                .chain(stream::pending())
                .into_async_read();

            let result = tokio::time::timeout(
                Duration::from_millis(100),
                fx.service.store(&fx.experiment_id, "model.pt", reader),
            )
            .await;

            assert!(result.is_err());
            assert_eq!(files_in(&fx.service.root().join(&fx.experiment_id)), 0);
            assert_eq!(fx.db.artifact_count(), 0);
        }
    }

    mod read {
        use super::*;
        use tokio::io::AsyncReadExt as _;

        #[tokio::test]
        async fn get_and_list() {
            let fx = setup().await;
            for name in ["a.txt", "b.txt", "c.txt"] {
                fx.service
                    .store(&fx.experiment_id, name, &b"x"[..])
                    .await
                    .unwrap();
            }

            let listed = fx.service.list(&fx.experiment_id, 0, 100).await.unwrap();
            let names: Vec<&str> = listed.iter().map(|a| a.filename.as_str()).collect();
            assert_eq!(names, vec!["c.txt", "b.txt", "a.txt"]);

            let paged = fx.service.list(&fx.experiment_id, 1, 1).await.unwrap();
            assert_eq!(paged[0].filename, "b.txt");

            let fetched = fx.service.get(&listed[0].id).await.unwrap();
            assert_eq!(fetched, listed[0]);
        }

        #[tokio::test]
        async fn list_of_unknown_experiment_is_empty() {
            let fx = setup().await;
            assert!(fx.service.list("missing", 0, 100).await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn get_missing_is_not_found() {
            let fx = setup().await;
            assert!(matches!(
                fx.service.get("missing").await.unwrap_err(),
                ServiceError::NotFound(_)
            ));
        }

        #[tokio::test]
        async fn retrieve_content_reads_file() {
            let fx = setup().await;
            let stored = fx
                .service
                .store(&fx.experiment_id, "notes.txt", &b"hello"[..])
                .await
                .unwrap();

            let mut content = fx.service.retrieve_content(&stored.id).await.unwrap();
            let mut body = Vec::new();
            content.file.read_to_end(&mut body).await.unwrap();

            assert_eq!(content.artifact, stored);
            assert_eq!(body, b"hello");
        }

        #[tokio::test]
        async fn retrieve_content_with_missing_file() {
            let fx = setup().await;
            let stored = fx
                .service
                .store(&fx.experiment_id, "notes.txt", &b"hello"[..])
                .await
                .unwrap();
            std::fs::remove_file(&stored.filepath).unwrap();

            let err = fx.service.retrieve_content(&stored.id).await.unwrap_err();
            assert!(matches!(err, ServiceError::NotFound(_)));
            assert_eq!(err.message(), "Artifact file not found on disk");
        }
    }

    mod delete {
        use super::*;

        #[tokio::test]
        async fn removes_file_and_record() {
            let fx = setup().await;
            let stored = fx
                .service
                .store(&fx.experiment_id, "model.pt", &b"weights"[..])
                .await
                .unwrap();

            assert!(fx.service.delete(&stored.id).await.unwrap());
            assert!(!Path::new(&stored.filepath).exists());
            assert_eq!(fx.db.artifact_count(), 0);
            assert!(matches!(
                fx.service.retrieve_content(&stored.id).await.unwrap_err(),
                ServiceError::NotFound(_)
            ));
        }

        #[tokio::test]
        async fn missing_file_still_deletes_record() {
            let fx = setup().await;
            let stored = fx
                .service
                .store(&fx.experiment_id, "model.pt", &b"weights"[..])
                .await
                .unwrap();
            std::fs::remove_file(&stored.filepath).unwrap();

            assert!(fx.service.delete(&stored.id).await.unwrap());
            assert_eq!(fx.db.artifact_count(), 0);
        }

        #[tokio::test]
        async fn missing_record_is_not_found() {
            let fx = setup().await;
            assert!(matches!(
                fx.service.delete("missing").await.unwrap_err(),
                ServiceError::NotFound(_)
            ));
        }

        #[tokio::test]
        async fn purge_removes_experiment_directory() {
            let fx = setup().await;
            fx.service
                .store(&fx.experiment_id, "model.pt", &b"weights"[..])
                .await
                .unwrap();
            let dir = fx.service.root().join(&fx.experiment_id);
            assert!(dir.exists());

            fx.service.purge_experiment(&fx.experiment_id).await;
            assert!(!dir.exists());

            // Already gone is fine
            fx.service.purge_experiment(&fx.experiment_id).await;
        }

        #[tokio::test]
        async fn purge_refuses_unsafe_ids() {
            let fx = setup().await;
            fx.service
                .store(&fx.experiment_id, "model.pt", &b"weights"[..])
                .await
                .unwrap();

            fx.service.purge_experiment("..").await;
            fx.service.purge_experiment("").await;
            fx.service
                .purge_experiment(&format!("{}/..", fx.experiment_id))
                .await;

            assert!(fx.service.root().join(&fx.experiment_id).join("model.pt").exists());
        }
    }

    #[test]
    fn limit_formatting() {
        assert_eq!(format_limit(500 * MIB), "500 MB");
        assert_eq!(format_limit(16), "16 bytes");
    }
}
