//! Reactive filter/sort engine over the enriched repository list.
//!
//! # Responsibility
//! - Own the enriched list and the current `FilterState`.
//! - Recompute the visible subset synchronously after every mutation.
//!
//! # Invariants
//! - Filters are conjunctive: search, language, topics, tags.
//! - Same list + same state always yields the same visible order.
//! - Sorting is stable; ties keep data-file order.

use crate::filter::state::{FilterPatch, FilterState, SortKey};
use crate::model::repository::{EnrichedRepository, RepoId};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

/// Result handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibleSet<'a> {
    /// Nothing matches; show the empty state instead of a list.
    Empty,
    Repositories(Vec<&'a EnrichedRepository>),
}

impl VisibleSet<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Repositories(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// One selectable value with the number of repositories carrying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Facet {
    pub value: String,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub total: usize,
    pub visible: usize,
}

/// Holds the full list, the filter state and the computed visible indices.
#[derive(Debug, Clone, Default)]
pub struct FilterEngine {
    repositories: Vec<EnrichedRepository>,
    state: FilterState,
    visible: Vec<usize>,
}

impl FilterEngine {
    /// Creates an engine with default filters (stars descending).
    pub fn new(repositories: Vec<EnrichedRepository>) -> Self {
        Self::with_state(repositories, FilterState::default())
    }

    /// Creates an engine with an initial state, typically from the URL query.
    pub fn with_state(repositories: Vec<EnrichedRepository>, state: FilterState) -> Self {
        let mut engine = Self {
            repositories,
            state,
            visible: Vec::new(),
        };
        engine.recompute();
        engine
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    pub fn repositories(&self) -> &[EnrichedRepository] {
        &self.repositories
    }

    pub fn repository(&self, repo_id: RepoId) -> Option<&EnrichedRepository> {
        self.repositories.iter().find(|repo| repo.id() == repo_id)
    }

    /// Merges a partial update into the state and recomputes.
    pub fn set_filter(&mut self, patch: FilterPatch) {
        self.state.merge(patch);
        self.recompute();
    }

    /// Resets every filter to its default and recomputes.
    pub fn clear_filters(&mut self) {
        self.state = FilterState::default();
        self.recompute();
    }

    /// Adds the topic to the selection, or removes it when already selected.
    pub fn toggle_topic(&mut self, topic: &str) {
        let mut topics = self.state.topics.clone();
        if !topics.remove(topic) {
            topics.insert(topic.to_string());
        }
        self.set_filter(FilterPatch::default().topics(topics));
    }

    /// Adds the tag to the selection, or removes it when already selected.
    pub fn toggle_tag(&mut self, tag: &str) {
        let normalized = tag.trim().to_lowercase();
        let mut tags = self.state.tags.clone();
        if !tags.remove(&normalized) {
            tags.insert(normalized);
        }
        self.set_filter(FilterPatch::default().tags(tags));
    }

    /// Swaps in a freshly loaded list, keeping the current filters.
    pub fn replace_repositories(&mut self, repositories: Vec<EnrichedRepository>) {
        self.repositories = repositories;
        self.recompute();
    }

    /// Updates one record's annotations in place after a durable write.
    ///
    /// Returns `false` when the repository is not in the list.
    pub fn update_annotations(
        &mut self,
        repo_id: RepoId,
        tags: Option<Vec<String>>,
        notes: Option<String>,
    ) -> bool {
        let Some(record) = self.repositories.iter_mut().find(|repo| repo.id() == repo_id) else {
            return false;
        };
        if let Some(tags) = tags {
            record.custom_tags = tags;
        }
        if let Some(notes) = notes {
            record.notes = notes;
        }
        self.recompute();
        true
    }

    /// Current visible records, or `VisibleSet::Empty`.
    pub fn view(&self) -> VisibleSet<'_> {
        if self.visible.is_empty() {
            return VisibleSet::Empty;
        }
        VisibleSet::Repositories(self.visible_records().collect())
    }

    pub fn visible_ids(&self) -> Vec<RepoId> {
        self.visible_records().map(EnrichedRepository::id).collect()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            total: self.repositories.len(),
            visible: self.visible.len(),
        }
    }

    /// Languages across the whole list, most common first.
    pub fn language_facets(&self) -> Vec<Facet> {
        count_facets(
            self.repositories
                .iter()
                .filter_map(|repo| repo.repository.language.as_deref()),
        )
    }

    /// Topics across the whole list, most common first.
    pub fn topic_facets(&self) -> Vec<Facet> {
        count_facets(
            self.repositories
                .iter()
                .flat_map(|repo| repo.repository.topics.iter().map(String::as_str)),
        )
    }

    /// Distinct custom tags present on the in-memory records, sorted.
    pub fn unique_tags(&self) -> Vec<String> {
        self.repositories
            .iter()
            .flat_map(|repo| repo.custom_tags.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn visible_records(&self) -> impl Iterator<Item = &EnrichedRepository> + '_ {
        self.visible.iter().map(|&index| &self.repositories[index])
    }

    fn recompute(&mut self) {
        let state = &self.state;
        let mut visible: Vec<usize> = self
            .repositories
            .iter()
            .enumerate()
            .filter(|(_, repo)| matches_search(repo, &state.search))
            .filter(|(_, repo)| matches_language(repo, state.language.as_deref()))
            .filter(|(_, repo)| matches_topics(repo, &state.topics))
            .filter(|(_, repo)| matches_tags(repo, &state.tags))
            .map(|(index, _)| index)
            .collect();
        sort_indices(&self.repositories, &mut visible, state.sort);
        self.visible = visible;
    }
}

fn matches_search(repo: &EnrichedRepository, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    let record = &repo.repository;
    [
        Some(record.name.as_str()),
        record.description.as_deref(),
        Some(record.full_name.as_str()),
        Some(record.owner.login.as_str()),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(needle))
}

fn matches_language(repo: &EnrichedRepository, language: Option<&str>) -> bool {
    match language {
        Some(wanted) => repo.repository.language.as_deref() == Some(wanted),
        None => true,
    }
}

fn matches_topics(repo: &EnrichedRepository, topics: &BTreeSet<String>) -> bool {
    topics
        .iter()
        .all(|topic| repo.repository.topics.iter().any(|own| own == topic))
}

fn matches_tags(repo: &EnrichedRepository, tags: &BTreeSet<String>) -> bool {
    tags.iter().all(|tag| repo.custom_tags.iter().any(|own| own == tag))
}

fn sort_indices(repositories: &[EnrichedRepository], indices: &mut [usize], key: SortKey) {
    let record = |index: usize| &repositories[index].repository;
    match key {
        SortKey::StarsDesc => indices.sort_by_key(|&i| Reverse(record(i).stargazers_count)),
        SortKey::StarsAsc => indices.sort_by_key(|&i| record(i).stargazers_count),
        SortKey::NameAsc => indices.sort_by_cached_key(|&i| name_key(&record(i).name)),
        SortKey::NameDesc => indices.sort_by_cached_key(|&i| Reverse(name_key(&record(i).name))),
        SortKey::UpdatedDesc => {
            indices.sort_by_cached_key(|&i| Reverse(timestamp_millis(&record(i).updated_at)))
        }
        SortKey::UpdatedAsc => {
            indices.sort_by_cached_key(|&i| timestamp_millis(&record(i).updated_at))
        }
    }
}

/// Case-insensitive first; among case variants lowercase sorts first, as
/// locale collation does.
fn name_key(name: &str) -> (String, Reverse<String>) {
    (name.to_lowercase(), Reverse(name.to_string()))
}

/// RFC 3339 timestamp in epoch milliseconds; unparsable text sorts as 0.
pub(crate) fn timestamp_millis(value: &str) -> i64 {
    chrono::DateTime::parse_from_rfc3339(value.trim())
        .map(|parsed| parsed.timestamp_millis())
        .unwrap_or(0)
}

fn count_facets<'a>(values: impl Iterator<Item = &'a str>) -> Vec<Facet> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for value in values {
        *counts.entry(value).or_default() += 1;
    }
    let mut facets: Vec<Facet> = counts
        .into_iter()
        .map(|(value, count)| Facet {
            value: value.to_string(),
            count,
        })
        .collect();
    facets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    facets
}
