#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Canonical annotation set for the map.
//!
//! [`AnnotationAggregator`] owns every annotation from the four datasets,
//! indexes them in a [`SpatialGrid`], tracks which datasets are still
//! loading, and computes the capped, distance-ranked [`VisibleSet`] for a
//! map region.
//!
//! The aggregator does no I/O and never fails: records without a usable
//! position are dropped during ingestion, and regions with more candidates
//! than the cap are truncated. It is not internally synchronised; the
//! owner must serialise mutations (see `chart_map_session`).

use std::cmp::Ordering;
use std::sync::Arc;

use chart_map_annotation_models::{Annotation, AnnotationKind, DatasetKind, MapRegion, RawRecord};
use chart_map_config::MapConfig;
use chart_map_spatial::SpatialGrid;

/// Annotations to render for a region, nearest to the region center first.
///
/// A pure function of the aggregator contents and the region; recomputed
/// rather than edited.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleSet {
    region: MapRegion,
    annotations: Vec<Arc<Annotation>>,
}

impl VisibleSet {
    /// A visible set with nothing in it.
    #[must_use]
    pub const fn empty(region: MapRegion) -> Self {
        Self {
            region,
            annotations: Vec::new(),
        }
    }

    /// The region this set was computed for.
    #[must_use]
    pub const fn region(&self) -> &MapRegion {
        &self.region
    }

    /// The annotations, nearest first.
    #[must_use]
    pub fn annotations(&self) -> &[Arc<Annotation>] {
        &self.annotations
    }

    /// Number of annotations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// Iterates the annotations, nearest first.
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Annotation>> {
        self.annotations.iter()
    }

    /// Consumes the set, returning the annotations.
    #[must_use]
    pub fn into_annotations(self) -> Vec<Arc<Annotation>> {
        self.annotations
    }
}

impl<'a> IntoIterator for &'a VisibleSet {
    type Item = &'a Arc<Annotation>;
    type IntoIter = std::slice::Iter<'a, Arc<Annotation>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Owner of the full annotation set across all datasets.
#[derive(Debug, Clone)]
pub struct AnnotationAggregator {
    grid: SpatialGrid,
    /// Every ingested annotation in arrival order, used for per-kind
    /// lookups and for rebuilding the grid.
    all: Vec<Arc<Annotation>>,
    /// Indexed by [`DatasetKind::index`].
    loading: [bool; 4],
    edge_padding_cells: i32,
    max_annotations: usize,
}

impl AnnotationAggregator {
    /// Creates an empty aggregator using the grid and cap settings from
    /// `config`.
    #[must_use]
    pub fn new(config: &MapConfig) -> Self {
        Self {
            grid: SpatialGrid::new(config.cell_size),
            all: Vec::new(),
            loading: [false; 4],
            edge_padding_cells: i32::try_from(config.edge_padding_cells).unwrap_or(i32::MAX),
            max_annotations: config.max_annotations,
        }
    }

    /// Converts `records` into annotations of `kind` and adds them.
    ///
    /// Records with a missing, non-finite, out-of-range, or `(0, 0)`
    /// position are skipped. Calling this twice for the same kind adds the
    /// records twice; use [`replace`](Self::replace) for refreshes.
    ///
    /// Marks `kind` as no longer loading. Returns the number of
    /// annotations added.
    pub fn ingest<I>(&mut self, kind: DatasetKind, records: I) -> usize
    where
        I: IntoIterator<Item = RawRecord>,
    {
        let mut dropped = 0_usize;
        let batch: Vec<Arc<Annotation>> = records
            .into_iter()
            .filter_map(|record| {
                if record.coordinate().is_none() {
                    log::trace!("Dropping {kind} record {}: no usable position", record.id);
                    dropped += 1;
                    return None;
                }
                record.into_annotation(kind).map(Arc::new)
            })
            .collect();

        let added = batch.len();
        self.grid.insert(batch.iter().cloned());
        self.all.extend(batch);
        self.loading[kind.index()] = false;

        log::debug!(
            "Ingested {added} {} ({dropped} without position, {} total)",
            kind.label(),
            self.all.len()
        );

        added
    }

    /// Removes every annotation of `kind`, then rebuilds the grid from the
    /// remaining annotations. Returns the number removed.
    pub fn clear(&mut self, kind: DatasetKind) -> usize {
        let before = self.all.len();
        self.all.retain(|annotation| annotation.kind().dataset() != kind);
        let removed = before - self.all.len();

        if removed > 0 {
            self.grid.clear();
            self.grid.insert(self.all.iter().cloned());
            log::debug!("Cleared {removed} {}", kind.label());
        }

        removed
    }

    /// Replaces the batch for `kind` with `records`. Returns the number of
    /// annotations added.
    pub fn replace<I>(&mut self, kind: DatasetKind, records: I) -> usize
    where
        I: IntoIterator<Item = RawRecord>,
    {
        self.clear(kind);
        self.ingest(kind, records)
    }

    /// Sets the loading flag for `kind`.
    pub const fn set_loading(&mut self, kind: DatasetKind, value: bool) {
        self.loading[kind.index()] = value;
    }

    /// Whether `kind` is currently loading.
    #[must_use]
    pub const fn is_loading(&self, kind: DatasetKind) -> bool {
        self.loading[kind.index()]
    }

    /// Whether any dataset is currently loading.
    #[must_use]
    pub fn is_loading_any(&self) -> bool {
        self.loading.iter().any(|&loading| loading)
    }

    /// Computes the annotations to show for `region`.
    ///
    /// Looks up the cells overlapping the region's bounding box plus
    /// `edge_padding_cells` on each side, ranks candidates by planar
    /// distance from the region center (ties broken by kind then ID), and
    /// keeps the nearest `max_annotations`.
    #[must_use]
    pub fn compute_visible_set(&self, region: &MapRegion) -> VisibleSet {
        if self.max_annotations == 0 {
            return VisibleSet::empty(*region);
        }

        let range = self
            .grid
            .cell_range(region)
            .padded(self.edge_padding_cells);
        let center = region.center;

        let mut ranked: Vec<(f64, Arc<Annotation>)> = self
            .grid
            .annotations_in_range(&range)
            .into_iter()
            .map(|annotation| (annotation.coordinate().planar_distance(center), annotation))
            .collect();

        let candidates = ranked.len();
        if ranked.len() > self.max_annotations {
            ranked.select_nth_unstable_by(self.max_annotations - 1, compare_ranked);
            ranked.truncate(self.max_annotations);
        }
        ranked.sort_by(compare_ranked);

        log::trace!(
            "Visible set: {} of {candidates} candidates in {} cells",
            ranked.len(),
            range.len()
        );

        VisibleSet {
            region: *region,
            annotations: ranked.into_iter().map(|(_, annotation)| annotation).collect(),
        }
    }

    /// First annotation from dataset `kind` with source ID `id`.
    ///
    /// Current stations with several bins share an ID; this returns the
    /// first bin ingested. Use [`find`](Self::find) to pick a bin.
    #[must_use]
    pub fn find_by_id(&self, kind: DatasetKind, id: &str) -> Option<Arc<Annotation>> {
        self.all
            .iter()
            .find(|annotation| annotation.kind().dataset() == kind && annotation.id() == id)
            .cloned()
    }

    /// The annotation with exactly this kind (including current bin) and ID.
    #[must_use]
    pub fn find(&self, kind: AnnotationKind, id: &str) -> Option<Arc<Annotation>> {
        self.all
            .iter()
            .find(|annotation| annotation.kind() == kind && annotation.id() == id)
            .cloned()
    }

    /// Number of annotations across all datasets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.all.len()
    }

    /// Whether no annotations have been ingested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// Number of annotations from dataset `kind`.
    #[must_use]
    pub fn count(&self, kind: DatasetKind) -> usize {
        self.all
            .iter()
            .filter(|annotation| annotation.kind().dataset() == kind)
            .count()
    }

    /// The spatial index backing this aggregator.
    #[must_use]
    pub const fn grid(&self) -> &SpatialGrid {
        &self.grid
    }
}

fn compare_ranked(a: &(f64, Arc<Annotation>), b: &(f64, Arc<Annotation>)) -> Ordering {
    a.0.total_cmp(&b.0)
        .then_with(|| a.1.kind().cmp(&b.1.kind()))
        .then_with(|| a.1.id().cmp(b.1.id()))
}

#[cfg(test)]
mod tests {
    use chart_map_annotation_models::{Coordinate, Span};

    use super::*;

    fn aggregator() -> AnnotationAggregator {
        AnnotationAggregator::new(&MapConfig::default())
    }

    fn region(lat: f64, lon: f64, span: f64) -> MapRegion {
        MapRegion::new(Coordinate::new(lat, lon), Span::new(span, span))
    }

    #[test]
    fn ingest_drops_null_island_and_finds_both_nearby() {
        let mut agg = aggregator();
        let added = agg.ingest(
            DatasetKind::NavUnit,
            vec![
                RawRecord::new("1", "Pier 39", 37.80, -122.41),
                RawRecord::new("2", "Pier 45", 37.81, -122.42),
                RawRecord::new("3", "Unknown", 0.0, 0.0),
            ],
        );
        assert_eq!(added, 2);
        assert_eq!(agg.grid().len(), 2);

        let center = Coordinate::new(37.805, -122.415);
        let visible = agg.compute_visible_set(&region(37.805, -122.415, 0.05));
        assert_eq!(visible.len(), 2);

        let distances: Vec<f64> = visible
            .iter()
            .map(|a| a.coordinate().planar_distance(center))
            .collect();
        assert!(distances[0] <= distances[1]);
    }

    #[test]
    fn missing_coordinates_are_skipped() {
        let mut agg = aggregator();
        let mut decommissioned = RawRecord::new("9999", "Gone", 1.0, 1.0);
        decommissioned.latitude = None;

        let added = agg.ingest(
            DatasetKind::TidalHeightStation,
            vec![decommissioned, RawRecord::new("9414290", "San Francisco", 37.806, -122.465)],
        );
        assert_eq!(added, 1);
        assert_eq!(agg.count(DatasetKind::TidalHeightStation), 1);
    }

    #[test]
    fn visible_set_is_capped() {
        let mut agg = aggregator();
        let records: Vec<RawRecord> = (0..500)
            .map(|i| {
                let offset = f64::from(i) * 0.0001;
                RawRecord::new(format!("{i}"), format!("Unit {i}"), 37.8 + offset, -122.4 - offset)
            })
            .collect();
        agg.ingest(DatasetKind::NavUnit, records);

        let visible = agg.compute_visible_set(&region(37.82, -122.42, 0.1));
        assert_eq!(visible.len(), 100);
    }

    #[test]
    fn visible_set_is_sorted_by_distance() {
        let mut agg = aggregator();
        let records: Vec<RawRecord> = (0..300)
            .map(|i| {
                let lat = 37.7 + f64::from(i % 17) * 0.011;
                let lon = -122.5 + f64::from(i % 23) * 0.009;
                RawRecord::new(format!("{i}"), format!("Unit {i}"), lat, lon)
            })
            .collect();
        agg.ingest(DatasetKind::BuoyStation, records);

        let r = region(37.78, -122.4, 0.1);
        let visible = agg.compute_visible_set(&r);
        assert!(!visible.is_empty());
        assert!(visible.len() <= 100);

        let distances: Vec<f64> = visible
            .iter()
            .map(|a| a.coordinate().planar_distance(r.center))
            .collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn capped_set_keeps_the_nearest() {
        let config = MapConfig {
            max_annotations: 2,
            ..MapConfig::default()
        };
        let mut agg = AnnotationAggregator::new(&config);
        agg.ingest(
            DatasetKind::NavUnit,
            vec![
                RawRecord::new("far", "Far", 37.83, -122.40),
                RawRecord::new("near", "Near", 37.801, -122.40),
                RawRecord::new("mid", "Mid", 37.81, -122.40),
            ],
        );

        let visible = agg.compute_visible_set(&region(37.80, -122.40, 0.05));
        let ids: Vec<&str> = visible.iter().map(|a| a.id()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
    }

    #[test]
    fn edge_padding_includes_neighbouring_cell() {
        let mut agg = aggregator();
        agg.ingest(
            DatasetKind::NavUnit,
            vec![
                RawRecord::new("edge", "Edge", 10.06, 10.0),
                RawRecord::new("far", "Far", 10.2, 10.0),
            ],
        );

        let visible = agg.compute_visible_set(&region(10.0, 10.0, 0.01));
        let ids: Vec<&str> = visible.iter().map(|a| a.id()).collect();
        assert_eq!(ids, vec!["edge"]);
    }

    #[test]
    fn repeated_ingest_duplicates() {
        let mut agg = aggregator();
        let records = vec![RawRecord::new("46026", "SF Buoy", 37.75, -122.84)];
        agg.ingest(DatasetKind::BuoyStation, records.clone());
        agg.ingest(DatasetKind::BuoyStation, records);
        assert_eq!(agg.count(DatasetKind::BuoyStation), 2);
        assert_eq!(agg.grid().len(), 2);
    }

    #[test]
    fn replace_swaps_only_that_kind() {
        let mut agg = aggregator();
        agg.ingest(
            DatasetKind::BuoyStation,
            vec![RawRecord::new("46026", "SF Buoy", 37.75, -122.84)],
        );
        agg.ingest(
            DatasetKind::NavUnit,
            vec![RawRecord::new("1", "Pier 39", 37.80, -122.41)],
        );

        agg.replace(
            DatasetKind::BuoyStation,
            vec![
                RawRecord::new("46026", "SF Buoy", 37.75, -122.84),
                RawRecord::new("46012", "Half Moon Bay", 37.36, -122.88),
            ],
        );

        assert_eq!(agg.count(DatasetKind::BuoyStation), 2);
        assert_eq!(agg.count(DatasetKind::NavUnit), 1);
        assert_eq!(agg.grid().len(), 3);
    }

    #[test]
    fn clear_removes_from_grid() {
        let mut agg = aggregator();
        agg.ingest(
            DatasetKind::NavUnit,
            vec![RawRecord::new("1", "Pier 39", 37.80, -122.41)],
        );
        assert_eq!(agg.clear(DatasetKind::NavUnit), 1);
        assert!(agg.is_empty());
        assert!(agg.compute_visible_set(&region(37.80, -122.41, 0.05)).is_empty());
        assert_eq!(agg.clear(DatasetKind::NavUnit), 0);
    }

    #[test]
    fn finds_by_id_within_kind() {
        let mut agg = aggregator();
        agg.ingest(
            DatasetKind::TidalCurrentStation,
            vec![
                RawRecord::new("SFB1201", "Golden Gate", 37.81, -122.47).with_current_bin(1),
                RawRecord::new("SFB1201", "Golden Gate", 37.81, -122.47).with_current_bin(2),
            ],
        );
        agg.ingest(
            DatasetKind::NavUnit,
            vec![RawRecord::new("SFB1201", "Not a station", 37.70, -122.30)],
        );

        let first = agg
            .find_by_id(DatasetKind::TidalCurrentStation, "SFB1201")
            .unwrap();
        assert_eq!(first.kind().current_bin(), Some(1));

        let second = agg
            .find(AnnotationKind::TidalCurrentStation { current_bin: 2 }, "SFB1201")
            .unwrap();
        assert_eq!(second.kind().current_bin(), Some(2));

        let nav = agg.find_by_id(DatasetKind::NavUnit, "SFB1201").unwrap();
        assert_eq!(nav.name(), "Not a station");

        assert!(agg.find_by_id(DatasetKind::BuoyStation, "SFB1201").is_none());
    }

    #[test]
    fn loading_flags_or_together() {
        let mut agg = aggregator();
        assert!(!agg.is_loading_any());

        agg.set_loading(DatasetKind::NavUnit, true);
        agg.set_loading(DatasetKind::BuoyStation, true);
        assert!(agg.is_loading_any());

        agg.ingest(DatasetKind::NavUnit, Vec::new());
        assert!(!agg.is_loading(DatasetKind::NavUnit));
        assert!(agg.is_loading_any());

        agg.set_loading(DatasetKind::BuoyStation, false);
        assert!(!agg.is_loading_any());
    }
}
