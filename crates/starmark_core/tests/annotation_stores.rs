use rusqlite::Connection;
use starmark_core::db::open_db_in_memory;
use starmark_core::{
    AnnotationExport, AnnotationStore, LocalAnnotationStore, SqliteAnnotationStore, StoreError,
};

const QUOTA: usize = 1024 * 1024;

fn backends() -> Vec<Box<dyn AnnotationStore>> {
    vec![
        Box::new(LocalAnnotationStore::in_memory(QUOTA)),
        Box::new(SqliteAnnotationStore::open_in_memory().unwrap()),
    ]
}

fn tags(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[tokio::test]
async fn adding_same_normalized_tag_twice_keeps_one_entry() {
    for store in backends() {
        let first = store.add_tag(1, "cool").await.unwrap();
        assert_eq!(first, tags(&["cool"]), "backend {}", store.source_name());

        let second = store.add_tag(1, "Cool ").await.unwrap();
        assert_eq!(second, tags(&["cool"]), "backend {}", store.source_name());
        assert_eq!(store.get_tags(1).await.unwrap(), tags(&["cool"]));
    }
}

#[tokio::test]
async fn removing_absent_tag_is_a_noop() {
    for store in backends() {
        store.set_tags(5, &tags(&["cli", "rust"])).await.unwrap();
        let after = store.remove_tag(5, "python").await.unwrap();
        assert_eq!(after, tags(&["cli", "rust"]), "backend {}", store.source_name());

        let after = store.remove_tag(6, "anything").await.unwrap();
        assert!(after.is_empty());
    }
}

#[tokio::test]
async fn set_tags_replaces_full_list_with_normalization() {
    for store in backends() {
        store
            .set_tags(2, &tags(&["Web", " CLI ", "web", "  "]))
            .await
            .unwrap();
        assert_eq!(store.get_tags(2).await.unwrap(), tags(&["web", "cli"]));

        store.set_tags(2, &tags(&["tui"])).await.unwrap();
        assert_eq!(store.get_tags(2).await.unwrap(), tags(&["tui"]));

        store.set_tags(2, &[]).await.unwrap();
        assert!(store.get_tags(2).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn blank_tag_is_rejected_by_add() {
    for store in backends() {
        let err = store.add_tag(1, "   ").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTag(_)));
    }
}

#[tokio::test]
async fn whitespace_notes_delete_the_entry() {
    for store in backends() {
        store.set_notes(3, "  remember this  ").await.unwrap();
        assert_eq!(store.get_notes(3).await.unwrap(), "remember this");

        store.set_notes(3, "   ").await.unwrap();
        assert_eq!(store.get_notes(3).await.unwrap(), "");
        assert!(store.get_all_annotations().await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn unknown_repository_reads_as_empty() {
    for store in backends() {
        assert_eq!(store.get_notes(404).await.unwrap(), "");
        assert!(store.get_tags(404).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn all_annotations_and_unique_tags_cover_every_repository() {
    for store in backends() {
        store.set_tags(1, &tags(&["rust", "cli"])).await.unwrap();
        store.set_tags(2, &tags(&["web", "rust"])).await.unwrap();
        store.set_notes(3, "notes only").await.unwrap();

        let all = store.get_all_annotations().await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[&1].tags, tags(&["rust", "cli"]));
        assert_eq!(all[&3].notes, "notes only");
        assert!(all[&3].tags.is_empty());

        assert_eq!(
            store.get_all_unique_tags().await.unwrap(),
            tags(&["cli", "rust", "web"])
        );
    }
}

#[tokio::test]
async fn export_then_import_into_fresh_store_round_trips() {
    for source in backends() {
        source.set_tags(10, &tags(&["alpha", "beta"])).await.unwrap();
        source.set_tags(11, &tags(&["gamma"])).await.unwrap();
        source.set_notes(10, "first").await.unwrap();
        source.set_notes(12, "only notes").await.unwrap();

        let exported = source.export_all().await.unwrap();
        assert_eq!(exported.source.as_deref(), Some(source.source_name()));
        let payload = serde_json::to_string(&exported).unwrap();

        for target in backends() {
            let document = AnnotationExport::parse(&payload).unwrap();
            let summary = target.import_all(&document).await.unwrap();
            assert_eq!(summary.tagged_repositories, 2);
            assert_eq!(summary.notes, 2);
            assert_eq!(
                target.get_all_annotations().await.unwrap(),
                source.get_all_annotations().await.unwrap()
            );
        }
    }
}

#[tokio::test]
async fn import_upserts_and_leaves_missing_keys_untouched() {
    for store in backends() {
        store.set_tags(1, &tags(&["keep"])).await.unwrap();
        store.set_tags(2, &tags(&["old"])).await.unwrap();
        store.set_notes(1, "keep notes").await.unwrap();

        let document =
            AnnotationExport::parse(r#"{"tags":{"2":["New"]},"notes":{"3":"added"}}"#).unwrap();
        store.import_all(&document).await.unwrap();

        assert_eq!(store.get_tags(1).await.unwrap(), tags(&["keep"]));
        assert_eq!(store.get_tags(2).await.unwrap(), tags(&["new"]));
        assert_eq!(store.get_notes(1).await.unwrap(), "keep notes");
        assert_eq!(store.get_notes(3).await.unwrap(), "added");
    }
}

#[tokio::test]
async fn clear_all_removes_every_annotation() {
    for store in backends() {
        store.set_tags(1, &tags(&["a"])).await.unwrap();
        store.set_notes(2, "b").await.unwrap();
        store.clear_all().await.unwrap();
        assert!(store.get_all_annotations().await.unwrap().is_empty());
        assert!(store.get_all_unique_tags().await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn local_store_uses_prefixed_keys_and_drops_blank_notes() {
    let store = LocalAnnotationStore::in_memory(QUOTA);
    store.set_tags(42, &tags(&["cool"])).await.unwrap();
    store.set_notes(42, "text").await.unwrap();

    assert_eq!(
        store.raw_get("starmark_tags_42").unwrap().as_deref(),
        Some(r#"["cool"]"#)
    );
    assert_eq!(store.raw_get("starmark_notes_42").unwrap().as_deref(), Some("text"));

    store.set_notes(42, "   ").await.unwrap();
    assert_eq!(store.raw_get("starmark_notes_42").unwrap(), None);
    assert_eq!(store.keys().unwrap(), vec!["starmark_tags_42".to_string()]);
}

#[tokio::test]
async fn local_store_rejects_writes_past_quota_without_partial_write() {
    let store = LocalAnnotationStore::in_memory(64);
    store.set_notes(1, "short").await.unwrap();
    let used_before = store.used_bytes().unwrap();

    let err = store.set_notes(2, &"x".repeat(200)).await.unwrap_err();
    assert!(err.is_quota_exceeded());
    assert_eq!(store.used_bytes().unwrap(), used_before);
    assert_eq!(store.get_notes(2).await.unwrap(), "");

    let big_import = format!(r#"{{"notes":{{"3":"ok","4":"{}"}}}}"#, "y".repeat(200));
    let document = AnnotationExport::parse(&big_import).unwrap();
    let err = store.import_all(&document).await.unwrap_err();
    assert!(err.is_quota_exceeded());
    assert_eq!(store.get_notes(3).await.unwrap(), "");
}

#[tokio::test]
async fn local_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("annotations.json");

    {
        let store = LocalAnnotationStore::open(&path, QUOTA);
        store.set_tags(7, &tags(&["saved"])).await.unwrap();
        store.set_notes(7, "persisted").await.unwrap();
    }

    let reopened = LocalAnnotationStore::open(&path, QUOTA);
    assert_eq!(reopened.get_tags(7).await.unwrap(), tags(&["saved"]));
    assert_eq!(reopened.get_notes(7).await.unwrap(), "persisted");
}

#[tokio::test]
async fn local_store_skips_corrupt_entries_and_foreign_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("annotations.json");
    std::fs::write(
        &path,
        r#"{"theme":"dark","starmark_tags_1":"not json","starmark_tags_2":"[\"ok\"]","starmark_tags_x":"[\"bad\"]"}"#,
    )
    .unwrap();

    let store = LocalAnnotationStore::open(&path, QUOTA);
    assert!(store.get_tags(1).await.unwrap().is_empty());
    let all = store.get_all_annotations().await.unwrap();
    assert_eq!(all.keys().copied().collect::<Vec<_>>(), vec![2]);

    store.clear_all().await.unwrap();
    assert_eq!(store.keys().unwrap(), vec!["theme".to_string()]);
}

#[tokio::test]
async fn local_store_starts_empty_on_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("annotations.json");
    std::fs::write(&path, "{{{").unwrap();

    let store = LocalAnnotationStore::open(&path, QUOTA);
    assert!(store.get_all_annotations().await.unwrap().is_empty());
}

#[tokio::test]
async fn sqlite_store_keeps_one_row_per_pair_and_deletes_blank_notes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("annotations.sqlite3");
    let store = SqliteAnnotationStore::open(&path).unwrap();

    store.add_tag(1, "cool").await.unwrap();
    store.add_tag(1, "COOL").await.unwrap();
    store.set_notes(1, "hello").await.unwrap();
    store.set_notes(1, "updated").await.unwrap();
    store.set_notes(2, "   ").await.unwrap();

    let conn = Connection::open(&path).unwrap();
    let tag_rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM repo_tags WHERE repo_id = 1;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(tag_rows, 1);
    let notes: Vec<(i64, String)> = conn
        .prepare("SELECT repo_id, content FROM repo_notes ORDER BY repo_id;")
        .unwrap()
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(notes, vec![(1, "updated".to_string())]);
}

#[tokio::test]
async fn sqlite_store_wraps_existing_connection() {
    let conn = open_db_in_memory().unwrap();
    conn.execute("INSERT INTO repo_tags (repo_id, tag) VALUES (9, 'seeded');", [])
        .unwrap();

    let store = SqliteAnnotationStore::new(conn);
    assert_eq!(store.get_tags(9).await.unwrap(), tags(&["seeded"]));
}

#[tokio::test]
async fn local_store_moves_corrupt_file_aside_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("annotations.json");
    let original = r#"{"starmark_tags_1":"[\"keep\"]","starmark_notes_1":"precious", }"#;
    std::fs::write(&path, original).unwrap();

    let store = LocalAnnotationStore::open(&path, QUOTA);
    store.add_tag(2, "new").await.unwrap();

    let backups: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|entry| {
            entry
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("annotations.json.corrupt-")
        })
        .collect();
    assert_eq!(backups.len(), 1);
    assert_eq!(std::fs::read_to_string(&backups[0]).unwrap(), original);

    let reopened = LocalAnnotationStore::open(&path, QUOTA);
    assert_eq!(reopened.get_tags(2).await.unwrap(), tags(&["new"]));
}

#[tokio::test]
async fn local_store_over_quota_still_accepts_deletions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("annotations.json");
    {
        let store = LocalAnnotationStore::open(&path, QUOTA);
        store.set_notes(1, &"a".repeat(300)).await.unwrap();
        store.set_tags(2, &tags(&["keep", "drop"])).await.unwrap();
        store.set_notes(2, &"b".repeat(300)).await.unwrap();
    }

    let store = LocalAnnotationStore::open(&path, 100);
    assert!(store.used_bytes().unwrap() > 100);

    store.set_notes(1, "   ").await.unwrap();
    store.remove_tag(2, "drop").await.unwrap();
    assert_eq!(store.get_notes(1).await.unwrap(), "");
    assert_eq!(store.get_tags(2).await.unwrap(), tags(&["keep"]));

    let err = store.add_tag(2, "grow").await.unwrap_err();
    assert!(err.is_quota_exceeded());

    store.set_tags(2, &[]).await.unwrap();
    store.clear_all().await.unwrap();
    assert_eq!(store.used_bytes().unwrap(), 0);
}
