//! Annotation store contract and backend implementations.
//!
//! # Responsibility
//! - Define the capability set every annotation backend provides.
//! - Keep key-value and SQL details behind one async trait.
//!
//! # Invariants
//! - Backends persist normalized tags only (trimmed, lowercase, unique).
//! - Blank notes are never stored; writing them deletes the entry.
//! - Reading notes for an unknown repository yields `""`, not an error.
//! - Import validates the whole document before the first write.

use crate::db::DbError;
use crate::model::annotation::{normalize_tag, AnnotationExport, AnnotationMap, ImportError};
use crate::model::repository::RepoId;
use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod local;
pub mod sqlite;

pub use local::LocalAnnotationStore;
pub use sqlite::SqliteAnnotationStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure reported by an annotation backend.
#[derive(Debug)]
pub enum StoreError {
    /// SQLite transport or schema failure.
    Db(DbError),
    /// Local store file could not be written.
    Io(std::io::Error),
    Serialization(serde_json::Error),
    /// Write would grow the local store past its capacity. Nothing was written.
    QuotaExceeded { required_bytes: usize, quota_bytes: usize },
    /// Tag input is blank after trimming.
    InvalidTag(String),
    /// Import payload failed validation. Nothing was written.
    Import(ImportError),
    /// Backend state is unusable (for example a poisoned lock).
    Unavailable(&'static str),
}

impl StoreError {
    /// Whether the failure should be shown to the user as a capacity warning.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "annotation store io error: {err}"),
            Self::Serialization(err) => write!(f, "annotation serialization error: {err}"),
            Self::QuotaExceeded {
                required_bytes,
                quota_bytes,
            } => write!(
                f,
                "storage quota exceeded: {required_bytes} bytes needed, {quota_bytes} available"
            ),
            Self::InvalidTag(value) => write!(f, "invalid tag: `{value}`"),
            Self::Import(err) => write!(f, "{err}"),
            Self::Unavailable(details) => write!(f, "annotation store unavailable: {details}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::Import(err) => Some(err),
            Self::QuotaExceeded { .. } | Self::InvalidTag(_) | Self::Unavailable(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

impl From<ImportError> for StoreError {
    fn from(value: ImportError) -> Self {
        Self::Import(value)
    }
}

/// Counts reported after a successful import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub tagged_repositories: usize,
    pub notes: usize,
}

/// Capability set shared by the local and table-backed stores.
///
/// `set_tags` is a full replace; `add_tag`/`remove_tag` default to
/// read-modify-write on top of it and may be specialized by a backend.
#[async_trait]
pub trait AnnotationStore: Send + Sync {
    /// Backend identity written into export documents.
    fn source_name(&self) -> &'static str;

    /// Returns the repository's tags in insertion order.
    async fn get_tags(&self, repo_id: RepoId) -> StoreResult<Vec<String>>;

    /// Replaces the full tag list. An empty list removes every tag.
    async fn set_tags(&self, repo_id: RepoId, tags: &[String]) -> StoreResult<()>;

    /// Returns notes text, or `""` when none are stored.
    async fn get_notes(&self, repo_id: RepoId) -> StoreResult<String>;

    /// Stores trimmed notes, deleting the entry when they are blank.
    async fn set_notes(&self, repo_id: RepoId, notes: &str) -> StoreResult<()>;

    /// Every repository that has at least one tag or notes.
    async fn get_all_annotations(&self) -> StoreResult<AnnotationMap>;

    /// Distinct tags across all repositories, sorted.
    async fn get_all_unique_tags(&self) -> StoreResult<Vec<String>>;

    /// Applies an import document as an upsert over existing data.
    async fn import_all(&self, document: &AnnotationExport) -> StoreResult<ImportSummary>;

    /// Removes every stored annotation.
    async fn clear_all(&self) -> StoreResult<()>;

    /// Snapshot of all annotations in the portable export shape.
    async fn export_all(&self) -> StoreResult<AnnotationExport> {
        let annotations = self.get_all_annotations().await?;
        Ok(AnnotationExport::from_annotations(
            &annotations,
            self.source_name(),
            chrono::Utc::now().to_rfc3339(),
        ))
    }

    /// Appends one tag. Already-present tags are a successful no-op.
    async fn add_tag(&self, repo_id: RepoId, tag: &str) -> StoreResult<Vec<String>> {
        let tag = normalize_tag(tag).ok_or_else(|| StoreError::InvalidTag(tag.to_string()))?;
        let mut tags = self.get_tags(repo_id).await?;
        if !tags.contains(&tag) {
            tags.push(tag);
            self.set_tags(repo_id, &tags).await?;
        }
        Ok(tags)
    }

    /// Removes one tag. Absent tags are a successful no-op.
    async fn remove_tag(&self, repo_id: RepoId, tag: &str) -> StoreResult<Vec<String>> {
        let mut tags = self.get_tags(repo_id).await?;
        let Some(tag) = normalize_tag(tag) else {
            return Ok(tags);
        };
        let before = tags.len();
        tags.retain(|existing| existing != &tag);
        if tags.len() != before {
            self.set_tags(repo_id, &tags).await?;
        }
        Ok(tags)
    }
}
