//! Filter/sort pipeline over enriched repositories.
//!
//! # Responsibility
//! - Hold filter state and derive the visible subset from it.
//! - Translate filter state to and from URL query parameters.

pub mod engine;
pub mod state;

pub use engine::{EngineStats, Facet, FilterEngine, VisibleSet};
pub use state::{FilterPatch, FilterState, SortKey, UnknownSortKey};
