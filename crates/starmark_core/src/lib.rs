//! Core library for Starmark: starred repositories with personal tags and notes.
//! This crate owns annotation invariants and the filter/sort pipeline.

pub mod config;
pub mod db;
pub mod debounce;
pub mod filter;
pub mod loader;
pub mod logging;
pub mod model;
pub mod service;
pub mod store;

pub use config::{AppConfig, ConfigError, StoreMode};
pub use debounce::Debouncer;
pub use filter::{EngineStats, Facet, FilterEngine, FilterPatch, FilterState, SortKey, VisibleSet};
pub use loader::{load_data_file, parse_stars_data, LoadError};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::annotation::{
    normalize_notes, normalize_tag, normalize_tags, Annotation, AnnotationExport, AnnotationMap,
    ImportError,
};
pub use model::repository::{
    DataMetadata, EnrichedRepository, Owner, RepoId, Repository, StarsData,
};
pub use service::annotation_facade::{export_file_name, AnnotationFacade};
pub use service::catalog::{enrich, merge_annotations, Catalog};
pub use store::{
    AnnotationStore, ImportSummary, LocalAnnotationStore, SqliteAnnotationStore, StoreError,
    StoreResult,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
