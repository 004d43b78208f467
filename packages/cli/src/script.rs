//! Pan scripts: a timed sequence of viewport changes to replay.
//!
//! ```json
//! [
//!   { "afterMs": 0,   "region": { "center": { "latitude": 37.80, "longitude": -122.41 },
//!                                 "span": { "latitudeDelta": 0.1, "longitudeDelta": 0.1 } } },
//!   { "afterMs": 120, "region": { ... } }
//! ]
//! ```
//!
//! `afterMs` is the delay since the previous step.

use std::path::Path;
use std::time::Duration;

use chart_map_annotation_models::MapRegion;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptStep {
    #[serde(default)]
    pub after_ms: u64,
    pub region: MapRegion,
}

impl ScriptStep {
    pub const fn delay(&self) -> Duration {
        Duration::from_millis(self.after_ms)
    }
}

pub fn parse(contents: &str) -> Result<Vec<ScriptStep>, ScriptError> {
    Ok(serde_json::from_str(contents)?)
}

pub fn load(path: &Path) -> Result<Vec<ScriptStep>, ScriptError> {
    let contents = std::fs::read_to_string(path)?;
    let steps = parse(&contents)?;
    log::debug!("Loaded {} script steps from {}", steps.len(), path.display());
    Ok(steps)
}
