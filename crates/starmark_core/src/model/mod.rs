//! Domain model for starred repositories and user annotations.
//!
//! # Responsibility
//! - Define the data-file record shapes and the enriched projection.
//! - Own annotation normalization shared by both store backends.
//!
//! # Invariants
//! - Repository records are read-only; only annotations are user-owned.

pub mod annotation;
pub mod repository;
