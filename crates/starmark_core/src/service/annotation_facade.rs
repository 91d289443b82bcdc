//! Single entry point for annotation reads and writes.
//!
//! # Responsibility
//! - Pick the backend once, at startup, from `StoreMode`.
//! - Turn read failures into empty values so the view never breaks.
//! - Hand write outcomes back to the caller as awaitable results.
//!
//! # Invariants
//! - Nothing outside this module branches on backend identity.
//! - The selected backend never changes for the facade's lifetime.

use crate::config::{AppConfig, StoreMode};
use crate::model::annotation::{normalize_notes, normalize_tags, AnnotationExport, AnnotationMap};
use crate::model::repository::RepoId;
use crate::store::{
    AnnotationStore, ImportSummary, LocalAnnotationStore, SqliteAnnotationStore, StoreResult,
};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Backend-agnostic annotation API used by the catalog and the CLI.
#[derive(Clone)]
pub struct AnnotationFacade {
    mode: StoreMode,
    store: Arc<dyn AnnotationStore>,
}

impl AnnotationFacade {
    /// Builds the backend selected by `config.remote_store`.
    ///
    /// # Errors
    /// - The SQLite file cannot be opened or migrated (remote mode only).
    pub fn open(config: &AppConfig) -> StoreResult<Self> {
        let mode = config.store_mode();
        let store: Arc<dyn AnnotationStore> = match mode {
            StoreMode::Local => Arc::new(LocalAnnotationStore::open(
                &config.local_store_file,
                config.local_quota_bytes,
            )),
            StoreMode::Remote => Arc::new(SqliteAnnotationStore::open(&config.sqlite_file)?),
        };
        info!(
            "event=facade_init module=service status=ok backend={}",
            mode.as_str()
        );
        Ok(Self { mode, store })
    }

    /// Wraps an existing backend.
    pub fn with_store(mode: StoreMode, store: Arc<dyn AnnotationStore>) -> Self {
        Self { mode, store }
    }

    pub fn mode(&self) -> StoreMode {
        self.mode
    }

    /// Tags for one repository; `[]` when the backend fails.
    pub async fn tags(&self, repo_id: RepoId) -> Vec<String> {
        self.store.get_tags(repo_id).await.unwrap_or_else(|err| {
            warn!("event=annotation_read module=service status=error kind=tags repo_id={repo_id} error={err}");
            Vec::new()
        })
    }

    /// Notes for one repository; `""` when missing or the backend fails.
    pub async fn notes(&self, repo_id: RepoId) -> String {
        self.store.get_notes(repo_id).await.unwrap_or_else(|err| {
            warn!("event=annotation_read module=service status=error kind=notes repo_id={repo_id} error={err}");
            String::new()
        })
    }

    /// Full snapshot; empty when the backend fails.
    pub async fn all_annotations(&self) -> AnnotationMap {
        self.store.get_all_annotations().await.unwrap_or_else(|err| {
            warn!("event=annotation_read module=service status=error kind=all error={err}");
            AnnotationMap::new()
        })
    }

    /// Sorted distinct tags; empty when the backend fails.
    pub async fn unique_tags(&self) -> Vec<String> {
        self.store.get_all_unique_tags().await.unwrap_or_else(|err| {
            warn!("event=annotation_read module=service status=error kind=unique_tags error={err}");
            Vec::new()
        })
    }

    /// Replaces the tag list and returns the normalized list that was stored.
    pub async fn set_tags(&self, repo_id: RepoId, tags: &[String]) -> StoreResult<Vec<String>> {
        let result = self.store.set_tags(repo_id, tags).await;
        log_write("set_tags", repo_id, &result);
        result.map(|()| normalize_tags(tags))
    }

    /// Adds one tag and returns the resulting list.
    pub async fn add_tag(&self, repo_id: RepoId, tag: &str) -> StoreResult<Vec<String>> {
        let result = self.store.add_tag(repo_id, tag).await;
        log_write("add_tag", repo_id, &result);
        result
    }

    /// Removes one tag and returns the resulting list.
    pub async fn remove_tag(&self, repo_id: RepoId, tag: &str) -> StoreResult<Vec<String>> {
        let result = self.store.remove_tag(repo_id, tag).await;
        log_write("remove_tag", repo_id, &result);
        result
    }

    /// Stores notes and returns the normalized text (`""` means deleted).
    pub async fn set_notes(&self, repo_id: RepoId, notes: &str) -> StoreResult<String> {
        let result = self.store.set_notes(repo_id, notes).await;
        log_write("set_notes", repo_id, &result);
        result.map(|()| normalize_notes(notes))
    }

    pub async fn export(&self) -> StoreResult<AnnotationExport> {
        self.store.export_all().await
    }

    /// Export document rendered as pretty JSON.
    pub async fn export_json(&self) -> StoreResult<String> {
        let document = self.export().await?;
        Ok(serde_json::to_string_pretty(&document)?)
    }

    /// Writes the export document into `dir` and returns the file path.
    pub async fn export_to_dir(&self, dir: impl AsRef<Path>) -> StoreResult<PathBuf> {
        let payload = self.export_json().await?;
        let path = dir.as_ref().join(export_file_name(chrono::Utc::now()));
        tokio::fs::write(&path, payload).await?;
        info!(
            "event=annotation_export module=service status=ok path={}",
            path.display()
        );
        Ok(path)
    }

    pub async fn import(&self, document: &AnnotationExport) -> StoreResult<ImportSummary> {
        self.store.import_all(document).await
    }

    /// Parses, validates and applies an import payload.
    ///
    /// # Errors
    /// - `StoreError::Import` for malformed payloads; nothing is written.
    pub async fn import_json(&self, raw: &str) -> StoreResult<ImportSummary> {
        let document = AnnotationExport::parse(raw)?;
        self.import(&document).await
    }

    pub async fn clear(&self) -> StoreResult<()> {
        let result = self.store.clear_all().await;
        match &result {
            Ok(()) => info!("event=annotation_clear module=service status=ok"),
            Err(err) => warn!("event=annotation_clear module=service status=error error={err}"),
        }
        result
    }
}

/// Download-style file name for an export taken at `at`.
pub fn export_file_name(at: chrono::DateTime<chrono::Utc>) -> String {
    format!("starmark-annotations-{}.json", at.format("%Y-%m-%d"))
}

fn log_write<T>(operation: &str, repo_id: RepoId, result: &StoreResult<T>) {
    match result {
        Ok(_) => info!(
            "event=annotation_write module=service status=ok op={operation} repo_id={repo_id}"
        ),
        Err(err) if err.is_quota_exceeded() => warn!(
            "event=annotation_write module=service status=error op={operation} repo_id={repo_id} error_code=quota_exceeded"
        ),
        Err(err) => warn!(
            "event=annotation_write module=service status=error op={operation} repo_id={repo_id} error={err}"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::export_file_name;
    use chrono::TimeZone;

    #[test]
    fn export_file_name_uses_utc_date() {
        let at = chrono::Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 0).unwrap();
        assert_eq!(export_file_name(at), "starmark-annotations-2024-03-09.json");
    }
}
