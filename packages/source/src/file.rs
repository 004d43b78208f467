//! JSON file loader.
//!
//! Accepts either a bare array of records or an object wrapping the array
//! under `records`:
//!
//! ```json
//! [{"id": "9414290", "name": "San Francisco", "latitude": 37.806, "longitude": -122.465}]
//! ```
//!
//! ```json
//! {"records": [{"id": "SFB1201", "name": "Golden Gate", "latitude": 37.81, "longitude": -122.47, "currentBin": 1}]}
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chart_map_annotation_models::{DatasetKind, RawRecord};
use serde::Deserialize;

use crate::{AnnotationSource, SourceError};

#[derive(Deserialize)]
#[serde(untagged)]
enum RecordFile {
    Bare(Vec<RawRecord>),
    Wrapped { records: Vec<RawRecord> },
}

impl RecordFile {
    fn into_records(self) -> Vec<RawRecord> {
        match self {
            Self::Bare(records) | Self::Wrapped { records } => records,
        }
    }
}

/// Loads a dataset from a JSON file on disk.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    dataset: DatasetKind,
    path: PathBuf,
    label: String,
}

impl JsonFileSource {
    /// Creates a loader for `dataset` reading `path`.
    #[must_use]
    pub fn new(dataset: DatasetKind, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = format!("{} ({})", dataset.label(), path.display());
        Self {
            dataset,
            path,
            label,
        }
    }

    /// Path of the JSON file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AnnotationSource for JsonFileSource {
    fn dataset(&self) -> DatasetKind {
        self.dataset
    }

    fn label(&self) -> &str {
        &self.label
    }

    async fn fetch(&self) -> Result<Vec<RawRecord>, SourceError> {
        let bytes = tokio::fs::read(&self.path).await?;
        let records = serde_json::from_slice::<RecordFile>(&bytes)?.into_records();
        log::info!("Read {} records from {}", records.len(), self.path.display());
        Ok(records)
    }
}
