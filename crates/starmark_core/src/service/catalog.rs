//! Load → merge → filter pipeline and the annotation edit path.
//!
//! # Responsibility
//! - Merge repository records with stored annotations once per load.
//! - Route tag/notes edits through the facade, then patch the in-memory
//!   record so no reload is needed.
//!
//! # Invariants
//! - An in-memory record changes only after its backend write succeeded.
//! - A failed write is returned to the caller and leaves memory untouched.

use crate::config::AppConfig;
use crate::filter::{FilterEngine, FilterState};
use crate::loader::load_data_file;
use crate::model::annotation::AnnotationMap;
use crate::model::repository::{DataMetadata, EnrichedRepository, RepoId, Repository, StarsData};
use crate::service::annotation_facade::AnnotationFacade;
use crate::store::{ImportSummary, StoreResult};
use log::info;

/// Merges records with a snapshot of stored annotations.
pub async fn enrich(
    repositories: Vec<Repository>,
    facade: &AnnotationFacade,
) -> Vec<EnrichedRepository> {
    let annotations = facade.all_annotations().await;
    merge_annotations(repositories, &annotations)
}

/// Pure merge step; repositories without annotations get empty values.
pub fn merge_annotations(
    repositories: Vec<Repository>,
    annotations: &AnnotationMap,
) -> Vec<EnrichedRepository> {
    repositories
        .into_iter()
        .map(|repository| {
            let annotation = annotations.get(&repository.id).cloned().unwrap_or_default();
            EnrichedRepository::new(repository, annotation.tags, annotation.notes)
        })
        .collect()
}

/// Enriched repository list plus the facade that persists edits to it.
pub struct Catalog {
    facade: AnnotationFacade,
    engine: FilterEngine,
    metadata: Option<DataMetadata>,
}

impl Catalog {
    /// Reads the configured data file and builds the enriched view.
    pub async fn load(config: &AppConfig, facade: AnnotationFacade, state: FilterState) -> Self {
        let data = load_data_file(&config.data_file).await;
        Self::from_data(data, facade, state).await
    }

    /// Builds the enriched view from already-loaded data.
    pub async fn from_data(data: StarsData, facade: AnnotationFacade, state: FilterState) -> Self {
        let repositories = enrich(data.repositories, &facade).await;
        info!(
            "event=catalog_ready module=service status=ok repositories={} backend={}",
            repositories.len(),
            facade.mode().as_str()
        );
        Self {
            facade,
            engine: FilterEngine::with_state(repositories, state),
            metadata: data.metadata,
        }
    }

    pub fn engine(&self) -> &FilterEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut FilterEngine {
        &mut self.engine
    }

    pub fn facade(&self) -> &AnnotationFacade {
        &self.facade
    }

    /// `None` when the data file could not be loaded.
    pub fn metadata(&self) -> Option<&DataMetadata> {
        self.metadata.as_ref()
    }

    pub async fn set_tags(&mut self, repo_id: RepoId, tags: &[String]) -> StoreResult<Vec<String>> {
        let stored = self.facade.set_tags(repo_id, tags).await?;
        self.engine.update_annotations(repo_id, Some(stored.clone()), None);
        Ok(stored)
    }

    pub async fn add_tag(&mut self, repo_id: RepoId, tag: &str) -> StoreResult<Vec<String>> {
        let stored = self.facade.add_tag(repo_id, tag).await?;
        self.engine.update_annotations(repo_id, Some(stored.clone()), None);
        Ok(stored)
    }

    pub async fn remove_tag(&mut self, repo_id: RepoId, tag: &str) -> StoreResult<Vec<String>> {
        let stored = self.facade.remove_tag(repo_id, tag).await?;
        self.engine.update_annotations(repo_id, Some(stored.clone()), None);
        Ok(stored)
    }

    pub async fn set_notes(&mut self, repo_id: RepoId, notes: &str) -> StoreResult<String> {
        let stored = self.facade.set_notes(repo_id, notes).await?;
        self.engine.update_annotations(repo_id, None, Some(stored.clone()));
        Ok(stored)
    }

    /// Imports a JSON payload and re-merges annotations into memory.
    pub async fn import_json(&mut self, raw: &str) -> StoreResult<ImportSummary> {
        let summary = self.facade.import_json(raw).await?;
        self.refresh_annotations().await;
        Ok(summary)
    }

    /// Clears every annotation and re-merges (all records become bare).
    pub async fn clear_annotations(&mut self) -> StoreResult<()> {
        self.facade.clear().await?;
        self.refresh_annotations().await;
        Ok(())
    }

    /// Re-reads annotations for the current list, keeping filters.
    pub async fn refresh_annotations(&mut self) {
        let annotations = self.facade.all_annotations().await;
        let repositories = self
            .engine
            .repositories()
            .iter()
            .map(|record| record.repository.clone())
            .collect();
        self.engine.replace_repositories(merge_annotations(repositories, &annotations));
    }
}
