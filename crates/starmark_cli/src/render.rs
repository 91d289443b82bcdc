//! Plain-text rendering of the visible set.

use starmark_core::{Catalog, EnrichedRepository, Facet, FilterEngine, VisibleSet};
use std::fmt::Write;

const NOTES_PREVIEW_CHARS: usize = 60;

pub fn listing(catalog: &Catalog) -> String {
    let engine = catalog.engine();
    let mut out = String::new();

    if let Some(metadata) = catalog.metadata() {
        let _ = writeln!(
            out,
            "starred by {}, last updated {}",
            metadata.username.as_deref().unwrap_or("unknown user"),
            metadata.last_updated.as_deref().unwrap_or("never")
        );
    }

    match engine.view() {
        VisibleSet::Empty if engine.stats().total == 0 => {
            out.push_str("No starred repositories loaded.\n");
        }
        VisibleSet::Empty => {
            out.push_str("No repositories match the current filters.\n");
        }
        VisibleSet::Repositories(items) => {
            for repo in items {
                write_repository(&mut out, repo);
            }
        }
    }

    let stats = engine.stats();
    let query = engine.state().to_query();
    let _ = write!(out, "showing {} of {}", stats.visible, stats.total);
    if !query.is_empty() {
        let _ = write!(out, " (?{query})");
    }
    out.push('\n');
    out
}

fn write_repository(out: &mut String, repo: &EnrichedRepository) {
    let record = &repo.repository;
    let _ = write!(out, "{:>7}  {}", record.stargazers_count, record.full_name);
    if let Some(language) = &record.language {
        let _ = write!(out, "  [{language}]");
    }
    if record.archived {
        out.push_str("  (archived)");
    }
    let _ = writeln!(out, "  #{}", record.id);

    if let Some(description) = record.description.as_deref().filter(|d| !d.is_empty()) {
        let _ = writeln!(out, "         {description}");
    }
    if !record.topics.is_empty() {
        let _ = writeln!(out, "         topics: {}", record.topics.join(", "));
    }
    if !repo.custom_tags.is_empty() {
        let _ = writeln!(out, "         tags: {}", tag_list(&repo.custom_tags));
    }
    if repo.has_notes() {
        let _ = writeln!(out, "         notes: {}", preview(&repo.notes));
    }
}

pub fn tag_list(tags: &[String]) -> String {
    if tags.is_empty() {
        "(no tags)".to_string()
    } else {
        tags.join(", ")
    }
}

pub fn facets(engine: &FilterEngine) -> String {
    let mut out = String::from("languages:\n");
    write_facets(&mut out, &engine.language_facets());
    out.push_str("topics:\n");
    write_facets(&mut out, &engine.topic_facets());
    out.push_str("tags:\n");
    for tag in engine.unique_tags() {
        let _ = writeln!(out, "  {tag}");
    }
    out
}

fn write_facets(out: &mut String, facets: &[Facet]) {
    for facet in facets {
        let _ = writeln!(out, "  {:<24} {}", facet.value, facet.count);
    }
}

pub fn visible_json(engine: &FilterEngine) -> serde_json::Result<String> {
    let records: Vec<&EnrichedRepository> = match engine.view() {
        VisibleSet::Empty => Vec::new(),
        VisibleSet::Repositories(items) => items,
    };
    serde_json::to_string_pretty(&records)
}

/// First line of the notes, capped for list display.
fn preview(notes: &str) -> String {
    let first_line = notes.lines().next().unwrap_or_default();
    let mut shown: String = first_line.chars().take(NOTES_PREVIEW_CHARS).collect();
    if shown.len() < notes.len() {
        shown.push_str("...");
    }
    shown
}

#[cfg(test)]
mod tests {
    use super::{preview, tag_list};

    #[test]
    fn preview_marks_truncated_notes() {
        assert_eq!(preview("short"), "short");
        assert_eq!(preview("line one\nline two"), "line one...");
    }

    #[test]
    fn empty_tag_list_has_placeholder() {
        assert_eq!(tag_list(&[]), "(no tags)");
        assert_eq!(tag_list(&["a".to_string(), "b".to_string()]), "a, b");
    }
}
