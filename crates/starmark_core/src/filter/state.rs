//! Filter state, partial updates and URL query round-tripping.
//!
//! # Invariants
//! - `search` is always trimmed and lowercase.
//! - Tag filters hold normalized tags; topic filters hold trimmed topics.
//! - `to_query()` writes only values that differ from the defaults.

use crate::model::annotation::normalize_tag;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b',');

/// Ordering applied as the last recompute step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SortKey {
    #[default]
    StarsDesc,
    StarsAsc,
    NameAsc,
    NameDesc,
    UpdatedDesc,
    UpdatedAsc,
}

impl SortKey {
    pub const ALL: [SortKey; 6] = [
        SortKey::StarsDesc,
        SortKey::StarsAsc,
        SortKey::NameAsc,
        SortKey::NameDesc,
        SortKey::UpdatedDesc,
        SortKey::UpdatedAsc,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::StarsDesc => "stars-desc",
            Self::StarsAsc => "stars-asc",
            Self::NameAsc => "name-asc",
            Self::NameDesc => "name-desc",
            Self::UpdatedDesc => "updated-desc",
            Self::UpdatedAsc => "updated-asc",
        }
    }

    /// Parses a sort key, falling back to `StarsDesc` for unknown input.
    pub fn parse_or_default(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl Display for SortKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized sort key text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSortKey(pub String);

impl Display for UnknownSortKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown sort key `{}`", self.0)
    }
}

impl std::error::Error for UnknownSortKey {}

impl FromStr for SortKey {
    type Err = UnknownSortKey;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == normalized)
            .ok_or_else(|| UnknownSortKey(value.to_string()))
    }
}

/// Current filter selection owned by `FilterEngine`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    pub search: String,
    pub language: Option<String>,
    pub topics: BTreeSet<String>,
    pub tags: BTreeSet<String>,
    pub sort: SortKey,
}

impl FilterState {
    pub fn is_default(&self) -> bool {
        self == &Self::default()
    }

    /// Applies a partial update, normalizing every provided field.
    pub fn merge(&mut self, patch: FilterPatch) {
        if let Some(search) = patch.search {
            self.search = normalize_search(&search);
        }
        if let Some(language) = patch.language {
            self.language = language
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty());
        }
        if let Some(topics) = patch.topics {
            self.topics = topics.iter().filter_map(|t| normalize_topic(t)).collect();
        }
        if let Some(tags) = patch.tags {
            self.tags = tags.iter().filter_map(|t| normalize_tag(t)).collect();
        }
        if let Some(sort) = patch.sort {
            self.sort = sort;
        }
    }

    /// Builds state from a URL query string such as
    /// `?search=cli&language=Rust&topic=tui,terminal&sort=name-asc`.
    ///
    /// Unknown parameters are ignored; an unknown `sort` falls back to the
    /// default key.
    pub fn from_query(query: &str) -> Self {
        let mut patch = FilterPatch::default();
        let query = query.trim().trim_start_matches('?');
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let value = decode_component(value);
            match key {
                "search" => patch.search = Some(value),
                "language" => patch.language = Some(Some(value)),
                "topic" => patch.topics = Some(split_list(&value)),
                "tag" => patch.tags = Some(split_list(&value)),
                "sort" => patch.sort = Some(SortKey::parse_or_default(&value)),
                _ => {}
            }
        }

        let mut state = Self::default();
        state.merge(patch);
        state
    }

    /// Serializes non-default values as a query string without leading `?`.
    pub fn to_query(&self) -> String {
        let mut pairs = Vec::new();
        if !self.search.is_empty() {
            pairs.push(format!("search={}", encode_component(&self.search)));
        }
        if let Some(language) = &self.language {
            pairs.push(format!("language={}", encode_component(language)));
        }
        if !self.topics.is_empty() {
            pairs.push(format!("topic={}", encode_list(&self.topics)));
        }
        if !self.tags.is_empty() {
            pairs.push(format!("tag={}", encode_list(&self.tags)));
        }
        if self.sort != SortKey::default() {
            pairs.push(format!("sort={}", self.sort.as_str()));
        }
        pairs.join("&")
    }
}

/// Partial filter update. `None` leaves a field unchanged.
///
/// `language: Some(None)` clears the language filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterPatch {
    pub search: Option<String>,
    pub language: Option<Option<String>>,
    pub topics: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub sort: Option<SortKey>,
}

impl FilterPatch {
    pub fn search(mut self, value: impl Into<String>) -> Self {
        self.search = Some(value.into());
        self
    }

    pub fn language(mut self, value: Option<&str>) -> Self {
        self.language = Some(value.map(str::to_string));
        self
    }

    pub fn topics<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn tags<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn sort(mut self, key: SortKey) -> Self {
        self.sort = Some(key);
        self
    }
}

pub(crate) fn normalize_search(value: &str) -> String {
    value.trim().to_lowercase()
}

pub(crate) fn normalize_topic(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(str::to_string).collect()
}

fn decode_component(value: &str) -> String {
    let spaced = value.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, QUERY_VALUE).to_string()
}

fn encode_list(values: &BTreeSet<String>) -> String {
    values
        .iter()
        .map(|value| encode_component(value))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::{FilterPatch, FilterState, SortKey};

    #[test]
    fn unknown_sort_key_falls_back_to_stars_desc() {
        assert_eq!(SortKey::parse_or_default("popularity"), SortKey::StarsDesc);
        assert_eq!(SortKey::parse_or_default(" NAME-ASC "), SortKey::NameAsc);
    }

    #[test]
    fn merge_normalizes_search_and_clears_blank_language() {
        let mut state = FilterState::default();
        state.merge(FilterPatch::default().search("  TUI Apps ").language(Some("Rust")));
        assert_eq!(state.search, "tui apps");
        assert_eq!(state.language.as_deref(), Some("Rust"));

        state.merge(FilterPatch::default().language(Some("  ")));
        assert_eq!(state.language, None);
    }

    #[test]
    fn query_round_trip_keeps_non_default_values() {
        let query = "?search=hello%20world&language=C%2B%2B&topic=cli,tui&tag=Cool&sort=updated-asc";
        let state = FilterState::from_query(query);
        assert_eq!(state.search, "hello world");
        assert_eq!(state.language.as_deref(), Some("C++"));
        assert_eq!(state.topics.len(), 2);
        assert!(state.tags.contains("cool"));
        assert_eq!(state.sort, SortKey::UpdatedAsc);

        let reparsed = FilterState::from_query(&state.to_query());
        assert_eq!(reparsed, state);
    }

    #[test]
    fn default_state_serializes_to_empty_query() {
        assert_eq!(FilterState::default().to_query(), "");
        assert_eq!(FilterState::from_query(""), FilterState::default());
    }

    #[test]
    fn plus_in_query_decodes_to_space() {
        let state = FilterState::from_query("search=static+site");
        assert_eq!(state.search, "static site");
    }
}
