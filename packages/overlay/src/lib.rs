#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Chart tile overlay preferences.
//!
//! Each logical map view remembers whether the nautical chart overlay is
//! on and which chart layers are selected. Layer `0` (the base chart) is
//! always part of the selection while the overlay is enabled.
//!
//! Building tile URLs from the selection is the tile provider's job; this
//! crate only owns the state and its persistence.

pub mod store;

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use store::{MemoryPreferenceStore, OverlayPreferenceStore, TomlPreferenceStore};

/// The base chart layer, forced on whenever the overlay is enabled.
pub const BASE_LAYER: u32 = 0;

/// Errors that can occur while loading or saving overlay preferences.
#[derive(Debug, Error)]
pub enum OverlayError {
    /// Preference file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Preference file is not valid TOML.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Preferences could not be serialized.
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Overlay state for one map view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayState {
    /// Whether the chart overlay is drawn.
    pub enabled: bool,
    /// Selected chart layer IDs.
    #[serde(default)]
    pub layers: BTreeSet<u32>,
}

impl OverlayState {
    /// Creates a state, applying the base-layer rule.
    #[must_use]
    pub fn new(enabled: bool, layers: impl IntoIterator<Item = u32>) -> Self {
        Self {
            enabled,
            layers: layers.into_iter().collect(),
        }
        .normalized()
    }

    /// Adds [`BASE_LAYER`] if the overlay is enabled.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.enabled {
            self.layers.insert(BASE_LAYER);
        }
        self
    }
}

/// Overlay controller for a single map view.
///
/// Every change is normalised and written through to the preference store.
/// If the write fails the in-memory state still reflects the change and
/// the error is returned.
pub struct ChartOverlay {
    view_id: String,
    store: Arc<dyn OverlayPreferenceStore>,
    state: OverlayState,
}

impl std::fmt::Debug for ChartOverlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChartOverlay")
            .field("view_id", &self.view_id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ChartOverlay {
    /// Restores the saved state for `view_id`, or starts disabled if there
    /// is none or it cannot be read.
    #[must_use]
    pub fn restore(view_id: impl Into<String>, store: Arc<dyn OverlayPreferenceStore>) -> Self {
        let view_id = view_id.into();
        let state = match store.load(&view_id) {
            Ok(Some(state)) => state.normalized(),
            Ok(None) => OverlayState::default(),
            Err(e) => {
                log::warn!("Failed to load overlay preferences for {view_id}: {e}");
                OverlayState::default()
            }
        };

        Self {
            view_id,
            store,
            state,
        }
    }

    /// The view these preferences belong to.
    #[must_use]
    pub fn view_id(&self) -> &str {
        &self.view_id
    }

    /// Current overlay state.
    #[must_use]
    pub const fn state(&self) -> &OverlayState {
        &self.state
    }

    /// Turns the overlay on or off.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError`] if the preferences cannot be saved.
    pub fn set_enabled(&mut self, enabled: bool) -> Result<&OverlayState, OverlayError> {
        self.state.enabled = enabled;
        self.commit()
    }

    /// Flips the overlay on/off.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError`] if the preferences cannot be saved.
    pub fn toggle(&mut self) -> Result<&OverlayState, OverlayError> {
        self.set_enabled(!self.state.enabled)
    }

    /// Replaces the layer selection.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError`] if the preferences cannot be saved.
    pub fn set_layers(
        &mut self,
        layers: impl IntoIterator<Item = u32>,
    ) -> Result<&OverlayState, OverlayError> {
        self.state.layers = layers.into_iter().collect();
        self.commit()
    }

    /// Adds `layer` if absent, removes it if present. The base layer cannot
    /// be removed while the overlay is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError`] if the preferences cannot be saved.
    pub fn toggle_layer(&mut self, layer: u32) -> Result<&OverlayState, OverlayError> {
        if !self.state.layers.remove(&layer) {
            self.state.layers.insert(layer);
        }
        self.commit()
    }

    fn commit(&mut self) -> Result<&OverlayState, OverlayError> {
        self.state = std::mem::take(&mut self.state).normalized();
        self.store.save(&self.view_id, &self.state)?;
        log::debug!(
            "Overlay for {}: enabled={} layers={:?}",
            self.view_id,
            self.state.enabled,
            self.state.layers
        );
        Ok(&self.state)
    }
}
