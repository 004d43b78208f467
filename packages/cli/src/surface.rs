//! Terminal stand-in for the map view.

use chart_map_aggregator::VisibleSet;
use chart_map_annotation_models::Annotation;
use chart_map_cli_utils::MultiProgress;
use chart_map_overlay::OverlayState;
use chart_map_reconcile::{AnnotationDiff, DiffBatch};
use chart_map_session::RenderSurface;

/// Prints every diff the session produces and keeps a marker count, as a
/// real map view would keep its annotation layer.
pub struct ConsoleSurface {
    multi: MultiProgress,
    chunk_size: usize,
    markers: usize,
    diffs: usize,
}

impl ConsoleSurface {
    pub const fn new(multi: MultiProgress, chunk_size: usize) -> Self {
        Self {
            multi,
            chunk_size,
            markers: 0,
            diffs: 0,
        }
    }

    pub const fn markers(&self) -> usize {
        self.markers
    }

    pub const fn diffs(&self) -> usize {
        self.diffs
    }

    fn println(&self, line: &str) {
        self.multi.println(line).ok();
    }
}

pub fn describe(annotation: &Annotation) -> String {
    let kind = annotation.kind();
    let style = kind.marker_style();
    let coordinate = annotation.coordinate();
    let dataset = kind.dataset();
    let label: &str = dataset.as_ref();
    let bin = kind
        .current_bin()
        .map(|bin| format!(" bin {bin}"))
        .unwrap_or_default();

    format!(
        "{:<22} {:<10} {} ({:.5}, {:.5}) [{} {}]{bin}",
        label,
        annotation.id(),
        annotation.name(),
        coordinate.latitude,
        coordinate.longitude,
        style.color,
        style.glyph,
    )
}

impl RenderSurface for ConsoleSurface {
    fn visible_set_changed(&mut self, visible: &VisibleSet) {
        let center = visible.region().center;
        log::debug!(
            "Visible set for ({:.4}, {:.4}): {} annotations",
            center.latitude,
            center.longitude,
            visible.len()
        );
    }

    fn apply_diff(&mut self, diff: &AnnotationDiff) {
        for batch in diff.batches(self.chunk_size) {
            match batch {
                DiffBatch::Remove(chunk) => {
                    self.markers = self.markers.saturating_sub(chunk.len());
                }
                DiffBatch::Add(chunk) => self.markers += chunk.len(),
            }
        }
        self.diffs += 1;

        self.println(&format!(
            "diff #{}: +{} -{}{} => {} markers",
            self.diffs,
            diff.to_add.len(),
            diff.to_remove.len(),
            if diff.full_replace { " (full replace)" } else { "" },
            self.markers,
        ));
    }

    fn overlay_changed(&mut self, state: &OverlayState) {
        if state.enabled {
            let layers: Vec<String> = state.layers.iter().map(u32::to_string).collect();
            log::info!("Chart overlay on, layers {}", layers.join(","));
        } else {
            log::info!("Chart overlay off");
        }
    }

    fn loading_changed(&mut self, loading: bool) {
        log::debug!("Loading: {loading}");
    }
}
