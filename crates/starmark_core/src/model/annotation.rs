//! User annotations: tags, notes and the export document.
//!
//! # Responsibility
//! - Own tag/notes normalization used by every store backend.
//! - Define the JSON export/import document shape.
//!
//! # Invariants
//! - Normalized tags are trimmed, lowercase and unique per repository.
//! - Normalized notes are trimmed; empty means "absent".
//! - Tag order is first-insertion order.

use crate::model::repository::RepoId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Tags and notes attached to one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotation {
    pub tags: Vec<String>,
    pub notes: String,
}

impl Annotation {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.notes.is_empty()
    }
}

/// Every stored annotation keyed by repository id.
pub type AnnotationMap = BTreeMap<RepoId, Annotation>;

/// Portable backup of all annotations.
///
/// Serialized as `{ tags, notes, exportedAt, source }`. Map keys are
/// repository ids written as JSON object keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationExport {
    #[serde(default)]
    pub tags: Option<BTreeMap<RepoId, Vec<String>>>,
    #[serde(default)]
    pub notes: Option<BTreeMap<RepoId, String>>,
    #[serde(default)]
    pub exported_at: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl AnnotationExport {
    /// Builds an export document from a full annotation snapshot.
    pub fn from_annotations(annotations: &AnnotationMap, source: &str, exported_at: String) -> Self {
        let mut tags = BTreeMap::new();
        let mut notes = BTreeMap::new();
        for (repo_id, annotation) in annotations {
            if !annotation.tags.is_empty() {
                tags.insert(*repo_id, annotation.tags.clone());
            }
            if !annotation.notes.is_empty() {
                notes.insert(*repo_id, annotation.notes.clone());
            }
        }

        Self {
            tags: Some(tags),
            notes: Some(notes),
            exported_at: Some(exported_at),
            source: Some(source.to_string()),
        }
    }

    /// Parses and validates an import payload.
    ///
    /// # Errors
    /// - `ImportError::Malformed` when the text is not a JSON object of the
    ///   export shape.
    /// - `ImportError::MissingSections` when neither `tags` nor `notes` exist.
    pub fn parse(raw: &str) -> Result<Self, ImportError> {
        let document: Self =
            serde_json::from_str(raw).map_err(|err| ImportError::Malformed(err.to_string()))?;
        document.validate()?;
        Ok(document)
    }

    /// Rejects documents that carry no annotation sections at all.
    pub fn validate(&self) -> Result<(), ImportError> {
        if self.tags.is_none() && self.notes.is_none() {
            return Err(ImportError::MissingSections);
        }
        Ok(())
    }

    /// Returns the normalized per-repository changes this document applies.
    ///
    /// Tag lists are normalized and notes trimmed; repositories whose tags
    /// normalize to nothing and whose notes are blank are left out so the
    /// import never erases existing data.
    pub fn normalized_entries(&self) -> BTreeMap<RepoId, ImportEntry> {
        let mut entries: BTreeMap<RepoId, ImportEntry> = BTreeMap::new();
        if let Some(tags) = &self.tags {
            for (repo_id, values) in tags {
                let normalized = normalize_tags(values);
                if !normalized.is_empty() {
                    entries.entry(*repo_id).or_default().tags = Some(normalized);
                }
            }
        }
        if let Some(notes) = &self.notes {
            for (repo_id, text) in notes {
                let normalized = normalize_notes(text);
                if !normalized.is_empty() {
                    entries.entry(*repo_id).or_default().notes = Some(normalized);
                }
            }
        }
        entries
    }

    pub fn tag_count(&self) -> usize {
        self.tags.as_ref().map_or(0, BTreeMap::len)
    }

    pub fn notes_count(&self) -> usize {
        self.notes.as_ref().map_or(0, BTreeMap::len)
    }
}

/// One repository's worth of import changes. `None` leaves the field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportEntry {
    pub tags: Option<Vec<String>>,
    pub notes: Option<String>,
}

/// Rejected import payload. Nothing is written when this is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    Malformed(String),
    MissingSections,
}

impl Display for ImportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(details) => write!(f, "invalid annotation import payload: {details}"),
            Self::MissingSections => {
                write!(f, "invalid annotation import payload: expected `tags` or `notes`")
            }
        }
    }
}

impl Error for ImportError {}

/// Normalizes one tag value. Blank input yields `None`.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let trimmed = tag.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Normalizes and deduplicates tag values, keeping first-seen order.
pub fn normalize_tags<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(tags.len());
    for tag in tags {
        if let Some(value) = normalize_tag(tag.as_ref()) {
            if seen.insert(value.clone()) {
                unique.push(value);
            }
        }
    }
    unique
}

/// Trims notes text. An empty result means the notes entry is deleted.
pub fn normalize_notes(notes: &str) -> String {
    notes.trim().to_string()
}
