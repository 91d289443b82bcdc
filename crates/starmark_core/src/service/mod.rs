//! Use-case services on top of the annotation stores.
//!
//! # Responsibility
//! - Hide backend choice behind `AnnotationFacade`.
//! - Drive the load → merge → filter pipeline and the edit path.

pub mod annotation_facade;
pub mod catalog;
