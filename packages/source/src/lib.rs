#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Station and navigation unit loaders feeding the chart map.
//!
//! Each dataset provider implements the [`AnnotationSource`] trait. A
//! source delivers its whole dataset at once as [`RawRecord`]s; the map
//! session converts and indexes them. Network-backed providers live
//! outside this workspace; the implementations here read local JSON files
//! or serve fixed records.

pub mod file;

use async_trait::async_trait;
use chart_map_annotation_models::{DatasetKind, RawRecord};

pub use file::JsonFileSource;

/// Errors that can occur while loading a dataset.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// I/O error (file read).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The provider could not produce a dataset.
    #[error("Source unavailable: {message}")]
    Unavailable {
        /// Description of what went wrong.
        message: String,
    },
}

/// Trait that every dataset loader implements.
///
/// Delivery is at most once per call to [`fetch`](Self::fetch); the map
/// never paginates or requests partial data.
#[async_trait]
pub trait AnnotationSource: Send + Sync {
    /// Which dataset this source provides.
    fn dataset(&self) -> DatasetKind;

    /// Human-readable label for logs and progress output.
    fn label(&self) -> &str;

    /// Loads the full dataset.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the dataset cannot be loaded.
    async fn fetch(&self) -> Result<Vec<RawRecord>, SourceError>;
}

/// A source that serves a fixed list of records.
#[derive(Debug, Clone)]
pub struct StaticSource {
    dataset: DatasetKind,
    records: Vec<RawRecord>,
}

impl StaticSource {
    /// Creates a source that always returns `records`.
    #[must_use]
    pub const fn new(dataset: DatasetKind, records: Vec<RawRecord>) -> Self {
        Self { dataset, records }
    }
}

#[async_trait]
impl AnnotationSource for StaticSource {
    fn dataset(&self) -> DatasetKind {
        self.dataset
    }

    fn label(&self) -> &str {
        self.dataset.label()
    }

    async fn fetch(&self) -> Result<Vec<RawRecord>, SourceError> {
        Ok(self.records.clone())
    }
}
