//! Two-table annotation backend on SQLite.
//!
//! # Responsibility
//! - Persist `(repo_id, tag)` pairs in `repo_tags` and one notes row per
//!   repository in `repo_notes`.
//! - Keep SQL inside the store boundary.
//!
//! # Invariants
//! - `(repo_id, tag)` is unique; duplicate inserts are ignored, not errors.
//! - `set_tags` deletes and re-inserts inside one immediate transaction, so a
//!   failure never leaves a repository with a half-written tag set.
//! - Notes rows are upserted; blank notes delete the row.
//! - Tag order is insertion order (`repo_tags.id`).

use crate::db::{open_db, open_db_in_memory};
use crate::model::annotation::{
    normalize_notes, normalize_tag, normalize_tags, AnnotationExport, AnnotationMap,
};
use crate::model::repository::RepoId;
use crate::store::{AnnotationStore, ImportSummary, StoreError, StoreResult};
use async_trait::async_trait;
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::Path;
use tokio::sync::Mutex;

/// SQLite-backed annotation store.
pub struct SqliteAnnotationStore {
    conn: Mutex<Connection>,
}

impl SqliteAnnotationStore {
    /// Wraps an already migrated connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Opens (or creates) the database file and applies migrations.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    /// Private in-memory database with the full schema.
    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }
}

#[async_trait]
impl AnnotationStore for SqliteAnnotationStore {
    fn source_name(&self) -> &'static str {
        "remote"
    }

    async fn get_tags(&self, repo_id: RepoId) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock().await;
        load_tags(&conn, repo_id)
    }

    async fn set_tags(&self, repo_id: RepoId, tags: &[String]) -> StoreResult<()> {
        let normalized = normalize_tags(tags);
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        replace_tags_in_tx(&tx, repo_id, &normalized)?;
        tx.commit()?;
        Ok(())
    }

    async fn add_tag(&self, repo_id: RepoId, tag: &str) -> StoreResult<Vec<String>> {
        let normalized = normalize_tag(tag).ok_or_else(|| StoreError::InvalidTag(tag.to_string()))?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO repo_tags (repo_id, tag) VALUES (?1, ?2);",
            params![repo_id, normalized],
        )?;
        load_tags(&conn, repo_id)
    }

    async fn remove_tag(&self, repo_id: RepoId, tag: &str) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock().await;
        if let Some(normalized) = normalize_tag(tag) {
            conn.execute(
                "DELETE FROM repo_tags WHERE repo_id = ?1 AND tag = ?2;",
                params![repo_id, normalized],
            )?;
        }
        load_tags(&conn, repo_id)
    }

    async fn get_notes(&self, repo_id: RepoId) -> StoreResult<String> {
        let conn = self.conn.lock().await;
        let content: Option<String> = conn
            .query_row(
                "SELECT content FROM repo_notes WHERE repo_id = ?1;",
                [repo_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(content.unwrap_or_default())
    }

    async fn set_notes(&self, repo_id: RepoId, notes: &str) -> StoreResult<()> {
        let normalized = normalize_notes(notes);
        let conn = self.conn.lock().await;
        upsert_notes(&conn, repo_id, &normalized)
    }

    async fn get_all_annotations(&self) -> StoreResult<AnnotationMap> {
        let conn = self.conn.lock().await;
        let mut annotations = AnnotationMap::new();

        let mut stmt = conn.prepare("SELECT repo_id, tag FROM repo_tags ORDER BY repo_id, id;")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let repo_id: RepoId = row.get("repo_id")?;
            let tag: String = row.get("tag")?;
            annotations.entry(repo_id).or_default().tags.push(tag);
        }

        let mut stmt = conn.prepare("SELECT repo_id, content FROM repo_notes ORDER BY repo_id;")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let repo_id: RepoId = row.get("repo_id")?;
            let content: String = row.get("content")?;
            if !content.is_empty() {
                annotations.entry(repo_id).or_default().notes = content;
            }
        }

        Ok(annotations)
    }

    async fn get_all_unique_tags(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT DISTINCT tag FROM repo_tags ORDER BY tag ASC;")?;
        let mut rows = stmt.query([])?;
        let mut tags = Vec::new();
        while let Some(row) = rows.next()? {
            tags.push(row.get(0)?);
        }
        Ok(tags)
    }

    async fn import_all(&self, document: &AnnotationExport) -> StoreResult<ImportSummary> {
        document.validate()?;
        let changes = document.normalized_entries();
        let mut summary = ImportSummary::default();

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        for (repo_id, change) in &changes {
            if let Some(tags) = &change.tags {
                replace_tags_in_tx(&tx, *repo_id, tags)?;
                summary.tagged_repositories += 1;
            }
            if let Some(notes) = &change.notes {
                upsert_notes(&tx, *repo_id, notes)?;
                summary.notes += 1;
            }
        }
        tx.commit()?;

        info!(
            "event=store_import module=store status=ok backend=remote tagged_repositories={} notes={}",
            summary.tagged_repositories, summary.notes
        );
        Ok(summary)
    }

    async fn clear_all(&self) -> StoreResult<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM repo_tags;", [])?;
        tx.execute("DELETE FROM repo_notes;", [])?;
        tx.commit()?;
        Ok(())
    }
}

fn load_tags(conn: &Connection, repo_id: RepoId) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT tag FROM repo_tags WHERE repo_id = ?1 ORDER BY id ASC;")?;
    let mut rows = stmt.query([repo_id])?;
    let mut tags = Vec::new();
    while let Some(row) = rows.next()? {
        tags.push(row.get(0)?);
    }
    Ok(tags)
}

fn replace_tags_in_tx(tx: &Transaction<'_>, repo_id: RepoId, tags: &[String]) -> StoreResult<()> {
    tx.execute("DELETE FROM repo_tags WHERE repo_id = ?1;", [repo_id])?;
    for tag in tags {
        tx.execute(
            "INSERT OR IGNORE INTO repo_tags (repo_id, tag) VALUES (?1, ?2);",
            params![repo_id, tag],
        )?;
    }
    Ok(())
}

fn upsert_notes(conn: &Connection, repo_id: RepoId, notes: &str) -> StoreResult<()> {
    if notes.is_empty() {
        conn.execute("DELETE FROM repo_notes WHERE repo_id = ?1;", [repo_id])?;
        return Ok(());
    }

    conn.execute(
        "INSERT INTO repo_notes (repo_id, content, updated_at)
         VALUES (?1, ?2, strftime('%s', 'now') * 1000)
         ON CONFLICT (repo_id) DO UPDATE SET
            content = excluded.content,
            updated_at = excluded.updated_at;",
        params![repo_id, notes],
    )?;
    Ok(())
}
