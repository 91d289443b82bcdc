//! Starred repository records and their annotated projection.
//!
//! # Responsibility
//! - Mirror the shape written by the scheduled sync job into the data file.
//! - Carry user annotations next to the read-only GitHub fields.
//!
//! # Invariants
//! - `id` is unique within one data file.
//! - `custom_tags` and `notes` on `EnrichedRepository` are already normalized.

use serde::{Deserialize, Serialize};

/// Stable GitHub repository identifier.
pub type RepoId = i64;

/// Repository owner as exported by the GitHub API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub login: String,
    #[serde(default)]
    pub avatar_url: String,
}

/// One starred repository, read-only to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: RepoId,
    pub name: String,
    pub full_name: String,
    pub owner: Owner,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    /// Missing `topics` in the data file deserializes to an empty list.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub topics: Vec<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: Option<u64>,
    #[serde(default)]
    pub archived: bool,
    /// RFC 3339 timestamp text, parsed lazily by the sort step.
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub starred_at: Option<String>,
    pub html_url: String,
}

/// Data-file header written by the sync job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataMetadata {
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub version: Option<String>,
}

/// Parsed data file. `metadata` is `None` for the empty fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StarsData {
    pub metadata: Option<DataMetadata>,
    pub repositories: Vec<Repository>,
}

impl StarsData {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Repository record merged with the user's tags and notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichedRepository {
    #[serde(flatten)]
    pub repository: Repository,
    pub custom_tags: Vec<String>,
    /// Empty string means "no notes".
    pub notes: String,
}

impl EnrichedRepository {
    pub fn new(repository: Repository, custom_tags: Vec<String>, notes: String) -> Self {
        Self {
            repository,
            custom_tags,
            notes,
        }
    }

    pub fn id(&self) -> RepoId {
        self.repository.id
    }

    pub fn has_notes(&self) -> bool {
        !self.notes.is_empty()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Vec<String>>::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}
