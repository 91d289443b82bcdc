//! Key-value annotation backend persisted to a local JSON file.
//!
//! # Responsibility
//! - Store one entry per repository per kind under `<prefix><repo_id>`.
//! - Enforce a byte quota the way browser storage does. Deletions and other
//!   writes that shrink usage are always accepted.
//!
//! # Invariants
//! - Every write is staged on a copy of the map; the live map and the file
//!   change only when the staged map fits the quota and was persisted.
//! - Tags are stored as a JSON list, notes as raw text.
//! - Keys with a known prefix but an unparsable id or payload are skipped.
//! - A store file that cannot be read or parsed is moved aside to
//!   `<file>.corrupt-<timestamp>` before the store starts empty, so the next
//!   write never overwrites it.

use crate::config::{NOTES_KEY_PREFIX, TAGS_KEY_PREFIX};
use crate::model::annotation::{normalize_notes, normalize_tags, AnnotationExport, AnnotationMap};
use crate::model::repository::RepoId;
use crate::store::{AnnotationStore, ImportSummary, StoreError, StoreResult};
use async_trait::async_trait;
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

static ANNOTATION_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        "^(?:({})|({}))(-?[0-9]+)$",
        regex::escape(TAGS_KEY_PREFIX),
        regex::escape(NOTES_KEY_PREFIX)
    ))
    .expect("valid annotation key regex")
});

type Entries = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyKind {
    Tags,
    Notes,
}

/// Local key-value annotation store.
///
/// `path = None` keeps everything in memory, which tests use.
pub struct LocalAnnotationStore {
    path: Option<PathBuf>,
    quota_bytes: usize,
    entries: Mutex<Entries>,
}

impl LocalAnnotationStore {
    /// Opens the store file, starting empty when it is missing or unreadable.
    pub fn open(path: impl AsRef<Path>, quota_bytes: usize) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = load_entries(&path);
        info!(
            "event=store_open module=store status=ok backend=local entries={} path={}",
            entries.len(),
            path.display()
        );
        Self {
            path: Some(path),
            quota_bytes,
            entries: Mutex::new(entries),
        }
    }

    /// Creates a store that never touches the filesystem.
    pub fn in_memory(quota_bytes: usize) -> Self {
        Self {
            path: None,
            quota_bytes,
            entries: Mutex::new(Entries::new()),
        }
    }

    /// Bytes currently used by keys and values.
    pub fn used_bytes(&self) -> StoreResult<usize> {
        Ok(used_bytes(&*self.lock()?))
    }

    /// Raw stored value for one key. Mirrors the storage API for inspection.
    pub fn raw_get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    /// Every stored key, sorted.
    pub fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Entries>> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("local store lock poisoned"))
    }

    /// Runs `mutate` on a staged copy and commits it only if it fits the
    /// quota (or does not grow usage) and persists cleanly.
    fn write<F>(&self, mutate: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Entries) -> StoreResult<()>,
    {
        let mut live = self.lock()?;
        let mut staged = live.clone();
        mutate(&mut staged)?;

        let current_bytes = used_bytes(&live);
        let required_bytes = used_bytes(&staged);
        // Over quota, only writes that do not grow usage are accepted.
        if required_bytes > self.quota_bytes && required_bytes > current_bytes {
            warn!(
                "event=store_write module=store status=error backend=local error_code=quota_exceeded required_bytes={} quota_bytes={}",
                required_bytes, self.quota_bytes
            );
            return Err(StoreError::QuotaExceeded {
                required_bytes,
                quota_bytes: self.quota_bytes,
            });
        }

        if let Some(path) = &self.path {
            persist_entries(path, &staged)?;
        }
        *live = staged;
        Ok(())
    }
}

#[async_trait]
impl AnnotationStore for LocalAnnotationStore {
    fn source_name(&self) -> &'static str {
        "local"
    }

    async fn get_tags(&self, repo_id: RepoId) -> StoreResult<Vec<String>> {
        let entries = self.lock()?;
        Ok(entries
            .get(&tags_key(repo_id))
            .and_then(|raw| decode_tags(repo_id, raw))
            .unwrap_or_default())
    }

    async fn set_tags(&self, repo_id: RepoId, tags: &[String]) -> StoreResult<()> {
        let normalized = normalize_tags(tags);
        self.write(|entries| put_tags(entries, repo_id, &normalized))
    }

    async fn get_notes(&self, repo_id: RepoId) -> StoreResult<String> {
        let entries = self.lock()?;
        Ok(entries.get(&notes_key(repo_id)).cloned().unwrap_or_default())
    }

    async fn set_notes(&self, repo_id: RepoId, notes: &str) -> StoreResult<()> {
        let normalized = normalize_notes(notes);
        self.write(|entries| {
            put_notes(entries, repo_id, &normalized);
            Ok(())
        })
    }

    async fn get_all_annotations(&self) -> StoreResult<AnnotationMap> {
        let entries = self.lock()?;
        let mut annotations = AnnotationMap::new();
        for (key, raw) in entries.iter() {
            let Some((kind, repo_id)) = parse_key(key) else {
                continue;
            };
            match kind {
                KeyKind::Tags => {
                    if let Some(tags) = decode_tags(repo_id, raw).filter(|tags| !tags.is_empty()) {
                        annotations.entry(repo_id).or_default().tags = tags;
                    }
                }
                KeyKind::Notes => {
                    if !raw.is_empty() {
                        annotations.entry(repo_id).or_default().notes = raw.clone();
                    }
                }
            }
        }
        Ok(annotations)
    }

    async fn get_all_unique_tags(&self) -> StoreResult<Vec<String>> {
        let entries = self.lock()?;
        let mut unique = BTreeSet::new();
        for (key, raw) in entries.iter() {
            if let Some((KeyKind::Tags, repo_id)) = parse_key(key) {
                unique.extend(decode_tags(repo_id, raw).unwrap_or_default());
            }
        }
        Ok(unique.into_iter().collect())
    }

    async fn import_all(&self, document: &AnnotationExport) -> StoreResult<ImportSummary> {
        document.validate()?;
        let changes = document.normalized_entries();
        let mut summary = ImportSummary::default();
        self.write(|entries| {
            for (repo_id, change) in &changes {
                if let Some(tags) = &change.tags {
                    put_tags(entries, *repo_id, tags)?;
                    summary.tagged_repositories += 1;
                }
                if let Some(notes) = &change.notes {
                    put_notes(entries, *repo_id, notes);
                    summary.notes += 1;
                }
            }
            Ok(())
        })?;
        info!(
            "event=store_import module=store status=ok backend=local tagged_repositories={} notes={}",
            summary.tagged_repositories, summary.notes
        );
        Ok(summary)
    }

    async fn clear_all(&self) -> StoreResult<()> {
        self.write(|entries| {
            entries.retain(|key, _| {
                !key.starts_with(TAGS_KEY_PREFIX) && !key.starts_with(NOTES_KEY_PREFIX)
            });
            Ok(())
        })
    }
}

fn tags_key(repo_id: RepoId) -> String {
    format!("{TAGS_KEY_PREFIX}{repo_id}")
}

fn notes_key(repo_id: RepoId) -> String {
    format!("{NOTES_KEY_PREFIX}{repo_id}")
}

fn parse_key(key: &str) -> Option<(KeyKind, RepoId)> {
    let captures = ANNOTATION_KEY_RE.captures(key)?;
    let kind = if captures.get(1).is_some() {
        KeyKind::Tags
    } else {
        KeyKind::Notes
    };
    let repo_id = captures.get(3)?.as_str().parse().ok()?;
    Some((kind, repo_id))
}

fn decode_tags(repo_id: RepoId, raw: &str) -> Option<Vec<String>> {
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(tags) => Some(normalize_tags(&tags)),
        Err(err) => {
            warn!(
                "event=store_read module=store status=error backend=local repo_id={repo_id} error_code=corrupt_tags error={err}"
            );
            None
        }
    }
}

fn put_tags(entries: &mut Entries, repo_id: RepoId, tags: &[String]) -> StoreResult<()> {
    let key = tags_key(repo_id);
    if tags.is_empty() {
        entries.remove(&key);
    } else {
        entries.insert(key, serde_json::to_string(tags)?);
    }
    Ok(())
}

fn put_notes(entries: &mut Entries, repo_id: RepoId, notes: &str) {
    let key = notes_key(repo_id);
    if notes.is_empty() {
        entries.remove(&key);
    } else {
        entries.insert(key, notes.to_string());
    }
}

fn used_bytes(entries: &Entries) -> usize {
    entries
        .iter()
        .map(|(key, value)| key.len() + value.len())
        .sum()
}

fn load_entries(path: &Path) -> Entries {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Entries::new(),
        Err(err) => {
            warn!(
                "event=store_open module=store status=error backend=local error_code=read_failed path={} error={err}",
                path.display()
            );
            quarantine(path);
            return Entries::new();
        }
    };

    serde_json::from_str(&raw).unwrap_or_else(|err| {
        warn!(
            "event=store_open module=store status=error backend=local error_code=corrupt_file path={} error={err}",
            path.display()
        );
        quarantine(path);
        Entries::new()
    })
}

/// Renames an unusable store file so its bytes survive the next write.
fn quarantine(path: &Path) {
    let backup = quarantine_path(path, chrono::Utc::now());
    match std::fs::rename(path, &backup) {
        Ok(()) => warn!(
            "event=store_quarantine module=store status=ok backend=local path={} backup={}",
            path.display(),
            backup.display()
        ),
        Err(err) => warn!(
            "event=store_quarantine module=store status=error backend=local path={} error={err}",
            path.display()
        ),
    }
}

fn quarantine_path(path: &Path, at: chrono::DateTime<chrono::Utc>) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".corrupt-{}", at.format("%Y%m%dT%H%M%S%.3fZ")));
    path.with_file_name(name)
}

fn persist_entries(path: &Path, entries: &Entries) -> StoreResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let payload = serde_json::to_vec_pretty(entries)?;
    let staging = path.with_extension("json.tmp");
    std::fs::write(&staging, payload)?;
    std::fs::rename(&staging, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{parse_key, quarantine_path, KeyKind};
    use chrono::TimeZone;
    use std::path::{Path, PathBuf};

    #[test]
    fn parse_key_recognizes_both_prefixes() {
        assert_eq!(parse_key("starmark_tags_42"), Some((KeyKind::Tags, 42)));
        assert_eq!(parse_key("starmark_notes_7"), Some((KeyKind::Notes, 7)));
    }

    #[test]
    fn parse_key_ignores_foreign_and_malformed_keys() {
        assert_eq!(parse_key("theme"), None);
        assert_eq!(parse_key("starmark_tags_"), None);
        assert_eq!(parse_key("starmark_tags_12abc"), None);
    }

    #[test]
    fn quarantine_path_keeps_file_name_and_adds_timestamp() {
        let at = chrono::Utc.with_ymd_and_hms(2024, 3, 9, 8, 5, 1).unwrap();
        assert_eq!(
            quarantine_path(Path::new("/data/annotations.json"), at),
            PathBuf::from("/data/annotations.json.corrupt-20240309T080501.000Z")
        );
    }
}
