//! JSON-lines history journal on the local filesystem.
//!
//! One run per line, oldest first. Appends rewrite the file through a
//! temporary file and a rename so a crash never leaves a torn journal.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{HistoryError, Result};

use super::store::HistoryStore;
use super::types::RunRecord;

/// Journal location under the user's local data directory.
const HISTORY_SUBPATH: &str = "homestack/history.jsonl";

/// Default number of runs kept.
const DEFAULT_KEEP: usize = 200;

/// Local JSON-lines history store.
#[derive(Debug)]
pub struct LocalHistoryStore {
    /// Journal file.
    path: PathBuf,
    /// Number of runs kept after each append.
    keep: usize,
}

impl LocalHistoryStore {
    /// Creates a store at the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the local data directory cannot be determined.
    pub fn new() -> Result<Self> {
        let path = Self::default_path()
            .ok_or_else(|| HistoryError::io("Cannot determine the local data directory"))?;
        Ok(Self::with_path(path))
    }

    /// Creates a store backed by `path`.
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            keep: DEFAULT_KEEP,
        }
    }

    /// Sets the number of runs kept.
    #[must_use]
    pub const fn with_keep(mut self, keep: usize) -> Self {
        self.keep = keep;
        self
    }

    /// Default journal path.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join(HISTORY_SUBPATH))
    }

    /// Returns the journal path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every run, oldest first. Unparseable lines are skipped.
    async fn read_all(&self) -> Result<Vec<RunRecord>> {
        if !self.path.exists() {
            debug!("History journal does not exist: {}", self.path.display());
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| HistoryError::io(format!("Failed to read {}: {e}", self.path.display())))?;

        let mut records = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RunRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping history line {}: {e}", index + 1),
            }
        }

        Ok(records)
    }

    /// Rewrites the journal with `records`.
    async fn write_all(&self, records: &[RunRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| HistoryError::io(format!("Failed to create {}: {e}", parent.display())))?;
        }

        let mut content = String::new();
        for record in records {
            let line = serde_json::to_string(record)
                .map_err(|e| HistoryError::serialization(e.to_string()))?;
            content.push_str(&line);
            content.push('\n');
        }

        let temp_path = self.path.with_extension("jsonl.tmp");
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| HistoryError::io(format!("Failed to create temp journal: {e}")))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| HistoryError::io(format!("Failed to write journal: {e}")))?;
        file.sync_all()
            .await
            .map_err(|e| HistoryError::io(format!("Failed to sync journal: {e}")))?;

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| HistoryError::io(format!("Failed to replace journal: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl HistoryStore for LocalHistoryStore {
    async fn append(&self, record: &RunRecord) -> Result<()> {
        let mut records = self.read_all().await?;
        records.push(record.clone());

        if records.len() > self.keep {
            let excess = records.len() - self.keep;
            records.drain(..excess);
        }

        self.write_all(&records).await?;
        debug!("Recorded run {} in {}", record.run_id, self.path.display());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let mut records = self.read_all().await?;
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::ServiceRecord;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> LocalHistoryStore {
        LocalHistoryStore::with_path(temp.path().join("nested/history.jsonl"))
    }

    fn record(command: &str, service: &str, hash: &str) -> RunRecord {
        let mut record = RunRecord::begin(command);
        record.services.push(ServiceRecord {
            service: service.to_string(),
            outcome: String::from("restarted"),
            declaration_hash: Some(hash.to_string()),
            pull_failures: Vec::new(),
            elapsed_ms: 1200,
        });
        record
    }

    #[tokio::test]
    async fn test_recent_on_missing_journal() {
        let temp = TempDir::new().unwrap();
        assert!(store(&temp).recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_and_recent_newest_first() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        store.append(&record("deploy", "media/plex", "aaa")).await.unwrap();
        store.append(&record("deploy-all", "media/plex", "bbb")).await.unwrap();

        let runs = store.recent(10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].command, "deploy-all");

        let last = store.last_service_record("media/plex").await.unwrap().unwrap();
        assert_eq!(last.declaration_hash.as_deref(), Some("bbb"));
        assert!(store.last_service_record("media/sonarr").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_append_trims_to_keep() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp).with_keep(3);

        for i in 0..5 {
            store.append(&record(&format!("run-{i}"), "a/b", "h")).await.unwrap();
        }

        let runs = store.recent(10).await.unwrap();
        let commands: Vec<&str> = runs.iter().map(|r| r.command.as_str()).collect();
        assert_eq!(commands, vec!["run-4", "run-3", "run-2"]);
    }

    #[tokio::test]
    async fn test_corrupt_lines_are_skipped() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.append(&record("deploy", "a/b", "h")).await.unwrap();

        let mut content = std::fs::read_to_string(store.path()).unwrap();
        content.push_str("{not json\n");
        std::fs::write(store.path(), content).unwrap();

        assert_eq!(store.recent(10).await.unwrap().len(), 1);
    }
}
