//! Static data-file loading with an empty fallback.
//!
//! # Responsibility
//! - Read the JSON file written by the scheduled sync job.
//! - Validate its top-level shape before handing records to the pipeline.
//!
//! # Invariants
//! - `load_data_file` never returns an error; any failure yields
//!   `StarsData::empty()` (no repositories, `metadata = None`).
//! - Individual records that do not match the repository shape are skipped.

use crate::model::repository::{DataMetadata, Repository, StarsData};
use log::{info, warn};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Instant;

/// Why a data file could not be used.
#[derive(Debug)]
pub enum LoadError {
    Io(std::io::Error),
    Json(serde_json::Error),
    /// Valid JSON, wrong shape.
    InvalidShape(&'static str),
}

impl Display for LoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read data file: {err}"),
            Self::Json(err) => write!(f, "data file is not valid JSON: {err}"),
            Self::InvalidShape(details) => write!(f, "invalid data file shape: {details}"),
        }
    }
}

impl Error for LoadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::InvalidShape(_) => None,
        }
    }
}

/// Loads the data file, falling back to an empty structure on any failure.
pub async fn load_data_file(path: impl AsRef<Path>) -> StarsData {
    let path = path.as_ref();
    let started_at = Instant::now();

    let result = match tokio::fs::read_to_string(path).await {
        Ok(raw) => parse_stars_data(&raw),
        Err(err) => Err(LoadError::Io(err)),
    };

    match result {
        Ok(data) => {
            info!(
                "event=data_load module=loader status=ok repositories={} duration_ms={}",
                data.repositories.len(),
                started_at.elapsed().as_millis()
            );
            data
        }
        Err(err) => {
            warn!(
                "event=data_load module=loader status=error path={} error={err}",
                path.display()
            );
            StarsData::empty()
        }
    }
}

/// Parses and validates data-file text.
///
/// # Errors
/// - `LoadError::Json` for invalid JSON.
/// - `LoadError::InvalidShape` when the root is not an object or
///   `repositories` is missing or not an array.
pub fn parse_stars_data(raw: &str) -> Result<StarsData, LoadError> {
    let root: Value = serde_json::from_str(raw).map_err(LoadError::Json)?;
    let Value::Object(mut root) = root else {
        return Err(LoadError::InvalidShape("root must be an object"));
    };

    let Some(Value::Array(records)) = root.remove("repositories") else {
        return Err(LoadError::InvalidShape("`repositories` must be an array"));
    };

    let metadata = match root.remove("metadata") {
        Some(value @ Value::Object(_)) => match serde_json::from_value::<DataMetadata>(value) {
            Ok(metadata) => Some(metadata),
            Err(err) => {
                warn!("event=data_load module=loader status=warn error_code=bad_metadata error={err}");
                None
            }
        },
        _ => None,
    };

    let total = records.len();
    let mut repositories = Vec::with_capacity(total);
    for (index, record) in records.into_iter().enumerate() {
        match serde_json::from_value::<Repository>(record) {
            Ok(repository) => repositories.push(repository),
            Err(err) => warn!(
                "event=data_load module=loader status=warn error_code=bad_record index={index} error={err}"
            ),
        }
    }

    if repositories.len() != total {
        warn!(
            "event=data_load module=loader status=warn skipped={}",
            total - repositories.len()
        );
    }

    Ok(StarsData {
        metadata,
        repositories,
    })
}
