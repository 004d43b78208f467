#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Map session: the single owner of the annotation core for one map view.
//!
//! [`MapSession`] wires the aggregator, the region-change throttle, the
//! reconciler, and the chart overlay preferences to a [`RenderSurface`].
//! Datasets arrive through [`MapSession::deliver`], viewport changes
//! through [`MapSession::region_did_change`]; both recompute the visible
//! set and push a minimal diff to the surface.
//!
//! `MapSession` itself is not synchronised. [`actor::spawn_session`] moves
//! it onto a tokio task and hands out a cloneable [`actor::SessionHandle`],
//! which is what loaders and UI code outside the map view talk to.

pub mod actor;

use std::sync::Arc;
use std::time::Instant;

use chart_map_aggregator::{AnnotationAggregator, VisibleSet};
use chart_map_annotation_models::{Annotation, AnnotationKind, DatasetKind, MapRegion, RawRecord};
use chart_map_config::MapConfig;
use chart_map_overlay::{ChartOverlay, OverlayError, OverlayState};
use chart_map_reconcile::{AnnotationDiff, AnnotationReconciler, ReconcilePolicy};
use chart_map_region::RegionChangeController;
use thiserror::Error;

pub use actor::{LoadOutcome, SessionHandle, spawn_loader, spawn_session};

/// Errors returned by [`SessionHandle`] operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session task has stopped.
    #[error("Map session is closed")]
    Closed,

    /// The command queue is full (non-blocking sends only).
    #[error("Map session command queue is full")]
    Busy,
}

/// Receives everything the session wants drawn.
///
/// Implemented by the map view (or an adapter around it). Calls arrive on
/// the session task, never concurrently.
pub trait RenderSurface {
    /// A new visible set was computed.
    fn visible_set_changed(&mut self, visible: &VisibleSet);

    /// Markers to remove and add. Large diffs should be applied in chunks,
    /// see [`AnnotationDiff::batches`].
    fn apply_diff(&mut self, diff: &AnnotationDiff);

    /// The chart overlay was toggled or its layers changed.
    fn overlay_changed(&mut self, _state: &OverlayState) {}

    /// Whether any dataset is still loading changed.
    fn loading_changed(&mut self, _loading: bool) {}
}

/// Where a tapped marker should route, decided by its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum TapTarget {
    /// Open navigation unit details.
    NavUnit(Arc<Annotation>),
    /// Open tide predictions.
    TidalHeightStation(Arc<Annotation>),
    /// Open current predictions for a specific depth bin.
    TidalCurrentStation {
        /// The tapped marker.
        annotation: Arc<Annotation>,
        /// Depth bin to show.
        current_bin: i32,
    },
    /// Open buoy observations.
    BuoyStation(Arc<Annotation>),
}

impl TapTarget {
    fn for_annotation(annotation: Arc<Annotation>) -> Self {
        match annotation.kind() {
            AnnotationKind::NavUnit => Self::NavUnit(annotation),
            AnnotationKind::TidalHeightStation => Self::TidalHeightStation(annotation),
            AnnotationKind::TidalCurrentStation { current_bin } => Self::TidalCurrentStation {
                annotation,
                current_bin,
            },
            AnnotationKind::BuoyStation => Self::BuoyStation(annotation),
        }
    }

    /// The tapped marker.
    #[must_use]
    pub const fn annotation(&self) -> &Arc<Annotation> {
        match self {
            Self::NavUnit(annotation)
            | Self::TidalHeightStation(annotation)
            | Self::TidalCurrentStation { annotation, .. }
            | Self::BuoyStation(annotation) => annotation,
        }
    }
}

/// Annotation core state for one map view.
pub struct MapSession<S> {
    aggregator: AnnotationAggregator,
    regions: RegionChangeController,
    reconciler: AnnotationReconciler,
    overlay: ChartOverlay,
    /// What the surface currently shows, in the order it was last set.
    rendered: Vec<Arc<Annotation>>,
    loading_any: bool,
    surface: S,
}

impl<S: RenderSurface> MapSession<S> {
    /// Creates a session drawing to `surface`.
    #[must_use]
    pub fn new(config: &MapConfig, surface: S, overlay: ChartOverlay) -> Self {
        Self {
            aggregator: AnnotationAggregator::new(config),
            regions: RegionChangeController::from_config(config),
            reconciler: AnnotationReconciler::new(ReconcilePolicy::from_config(config)),
            overlay,
            rendered: Vec::new(),
            loading_any: false,
            surface,
        }
    }

    /// Pushes the current overlay and loading state to the surface.
    pub fn announce(&mut self) {
        self.surface.overlay_changed(self.overlay.state());
        self.surface.loading_changed(self.loading_any);
    }

    /// Replaces the dataset `kind` with `records` and redraws.
    ///
    /// Returns the number of annotations kept after dropping records with
    /// no usable position.
    pub fn deliver(&mut self, kind: DatasetKind, records: Vec<RawRecord>) -> usize {
        let added = self.aggregator.replace(kind, records);
        log::info!("Loaded {added} {}", kind.label());
        self.publish_loading();
        self.refresh();
        added
    }

    /// Marks dataset `kind` as loading or done.
    pub fn set_loading(&mut self, kind: DatasetKind, value: bool) {
        self.aggregator.set_loading(kind, value);
        self.publish_loading();
    }

    /// Handles a viewport change observed at `now`. Returns whether the
    /// change was accepted and the map redrawn.
    pub fn region_did_change(&mut self, region: MapRegion, now: Instant) -> bool {
        let Some(accepted) = self.regions.accept(region, now) else {
            return false;
        };
        self.render(&accepted);
        true
    }

    /// Processes a viewport change that was throttled earlier, if its
    /// window has passed. Returns whether the map was redrawn.
    pub fn flush_pending(&mut self, now: Instant) -> bool {
        let Some(accepted) = self.regions.flush_pending(now) else {
            return false;
        };
        self.render(&accepted);
        true
    }

    /// When a throttled viewport change becomes eligible for
    /// [`flush_pending`](Self::flush_pending).
    #[must_use]
    pub fn pending_deadline(&self) -> Option<Instant> {
        self.regions.pending_deadline()
    }

    /// Recomputes the visible set for the last accepted region.
    pub fn refresh(&mut self) {
        if let Some(region) = self.regions.last_accepted() {
            self.render(&region);
        }
    }

    /// Resolves a tapped marker.
    ///
    /// For current stations pass the bin to select a specific depth;
    /// without it the first bin loaded is returned.
    #[must_use]
    pub fn annotation_tapped(
        &self,
        dataset: DatasetKind,
        id: &str,
        current_bin: Option<i32>,
    ) -> Option<TapTarget> {
        let annotation = match (dataset, current_bin) {
            (DatasetKind::TidalCurrentStation, Some(bin)) => self
                .aggregator
                .find(AnnotationKind::for_dataset(dataset, bin), id),
            _ => self.aggregator.find_by_id(dataset, id),
        };

        if annotation.is_none() {
            log::debug!("Tapped unknown {dataset} annotation {id}");
        }

        annotation.map(TapTarget::for_annotation)
    }

    /// Turns the chart overlay on or off.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError`] if the preference could not be saved. The
    /// change still takes effect for this session.
    pub fn set_overlay_enabled(&mut self, enabled: bool) -> Result<(), OverlayError> {
        let result = self.overlay.set_enabled(enabled).map(|_| ());
        self.publish_overlay(result)
    }

    /// Adds or removes a chart layer.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError`] if the preference could not be saved. The
    /// change still takes effect for this session.
    pub fn toggle_overlay_layer(&mut self, layer: u32) -> Result<(), OverlayError> {
        let result = self.overlay.toggle_layer(layer).map(|_| ());
        self.publish_overlay(result)
    }

    /// Replaces the chart layer selection.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError`] if the preference could not be saved. The
    /// change still takes effect for this session.
    pub fn set_overlay_layers(&mut self, layers: Vec<u32>) -> Result<(), OverlayError> {
        let result = self.overlay.set_layers(layers).map(|_| ());
        self.publish_overlay(result)
    }

    /// Current chart overlay state.
    #[must_use]
    pub const fn overlay(&self) -> &OverlayState {
        self.overlay.state()
    }

    /// The annotations currently on the surface.
    #[must_use]
    pub fn rendered(&self) -> &[Arc<Annotation>] {
        &self.rendered
    }

    /// The annotation store.
    #[must_use]
    pub const fn aggregator(&self) -> &AnnotationAggregator {
        &self.aggregator
    }

    /// Whether any dataset is loading.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.loading_any
    }

    /// The render surface.
    #[must_use]
    pub const fn surface(&self) -> &S {
        &self.surface
    }

    /// Consumes the session, returning the render surface.
    #[must_use]
    pub fn into_surface(self) -> S {
        self.surface
    }

    fn render(&mut self, region: &MapRegion) {
        let visible = self.aggregator.compute_visible_set(region);
        self.surface.visible_set_changed(&visible);

        let diff = self.reconciler.reconcile(&self.rendered, visible.annotations());
        if !diff.is_empty() {
            log::debug!(
                "Applying annotation diff: +{} -{}{}",
                diff.to_add.len(),
                diff.to_remove.len(),
                if diff.full_replace { " (full replace)" } else { "" }
            );
            self.surface.apply_diff(&diff);
        }

        self.rendered = visible.into_annotations();
    }

    fn publish_loading(&mut self) {
        let loading = self.aggregator.is_loading_any();
        if loading != self.loading_any {
            self.loading_any = loading;
            self.surface.loading_changed(loading);
        }
    }

    fn publish_overlay(&mut self, result: Result<(), OverlayError>) -> Result<(), OverlayError> {
        self.surface.overlay_changed(self.overlay.state());
        if let Err(e) = &result {
            log::warn!(
                "Failed to save overlay preferences for {}: {e}",
                self.overlay.view_id()
            );
        }
        result
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Everything a [`RecordingSurface`] was told, in order.
    #[derive(Debug, Clone, PartialEq)]
    pub enum SurfaceEvent {
        Visible(Vec<String>),
        Diff {
            added: Vec<String>,
            removed: Vec<String>,
            full_replace: bool,
        },
        Overlay(OverlayState),
        Loading(bool),
    }

    #[derive(Debug, Default)]
    pub struct RecordingSurface {
        pub events: Vec<SurfaceEvent>,
        pub shown: Vec<String>,
    }

    fn ids(annotations: &[Arc<Annotation>]) -> Vec<String> {
        annotations.iter().map(|a| a.id().to_string()).collect()
    }

    impl RecordingSurface {
        pub fn diffs(&self) -> Vec<&SurfaceEvent> {
            self.events
                .iter()
                .filter(|event| matches!(event, SurfaceEvent::Diff { .. }))
                .collect()
        }
    }

    impl RenderSurface for RecordingSurface {
        fn visible_set_changed(&mut self, visible: &VisibleSet) {
            self.events.push(SurfaceEvent::Visible(ids(visible.annotations())));
        }

        fn apply_diff(&mut self, diff: &AnnotationDiff) {
            let removed = ids(&diff.to_remove);
            for id in &removed {
                if let Some(at) = self.shown.iter().position(|shown| shown == id) {
                    self.shown.remove(at);
                }
            }
            self.shown.extend(ids(&diff.to_add));
            self.events.push(SurfaceEvent::Diff {
                added: ids(&diff.to_add),
                removed,
                full_replace: diff.full_replace,
            });
        }

        fn overlay_changed(&mut self, state: &OverlayState) {
            self.events.push(SurfaceEvent::Overlay(state.clone()));
        }

        fn loading_changed(&mut self, loading: bool) {
            self.events.push(SurfaceEvent::Loading(loading));
        }
    }
}
