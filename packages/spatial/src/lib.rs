#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! In-memory spatial index for map annotations.
//!
//! Buckets annotations into fixed-size latitude/longitude cells so a map
//! region lookup only touches the cells overlapping the region instead of
//! scanning every annotation. Cells are square in degree space; no
//! projection is applied.

use std::collections::BTreeMap;
use std::sync::Arc;

use chart_map_annotation_models::{Annotation, Coordinate, MapRegion};

/// Integer cell coordinates: `floor(lat / cell_size)`, `floor(lon / cell_size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellKey {
    /// Latitude cell index.
    pub lat: i32,
    /// Longitude cell index.
    pub lon: i32,
}

impl CellKey {
    /// Creates a cell key.
    #[must_use]
    pub const fn new(lat: i32, lon: i32) -> Self {
        Self { lat, lon }
    }
}

/// An inclusive rectangle of cell keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    /// Lowest latitude cell index.
    pub lat_min: i32,
    /// Highest latitude cell index (inclusive).
    pub lat_max: i32,
    /// Lowest longitude cell index.
    pub lon_min: i32,
    /// Highest longitude cell index (inclusive).
    pub lon_max: i32,
}

impl CellRange {
    /// Grows the range by `cells` on every side.
    #[must_use]
    pub const fn padded(self, cells: i32) -> Self {
        Self {
            lat_min: self.lat_min.saturating_sub(cells),
            lat_max: self.lat_max.saturating_add(cells),
            lon_min: self.lon_min.saturating_sub(cells),
            lon_max: self.lon_max.saturating_add(cells),
        }
    }

    /// Number of cells in the range.
    #[must_use]
    pub fn len(&self) -> u64 {
        let lat = u64::try_from(i64::from(self.lat_max) - i64::from(self.lat_min) + 1).unwrap_or(0);
        let lon = u64::try_from(i64::from(self.lon_max) - i64::from(self.lon_min) + 1).unwrap_or(0);
        lat.saturating_mul(lon)
    }

    /// Whether the range covers no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` lies inside the range.
    #[must_use]
    pub const fn contains(&self, key: CellKey) -> bool {
        key.lat >= self.lat_min
            && key.lat <= self.lat_max
            && key.lon >= self.lon_min
            && key.lon <= self.lon_max
    }

    /// Every key in the range, latitude-major.
    pub fn keys(&self) -> impl Iterator<Item = CellKey> + '_ {
        (self.lat_min..=self.lat_max)
            .flat_map(move |lat| (self.lon_min..=self.lon_max).map(move |lon| CellKey { lat, lon }))
    }
}

/// Fixed-cell-size grid of annotations.
///
/// Each annotation is stored in exactly one cell, chosen from its
/// coordinate at insert time. There is no per-annotation removal; callers
/// that need to drop a subset [`clear`](Self::clear) and re-insert.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_size: f64,
    cells: BTreeMap<CellKey, Vec<Arc<Annotation>>>,
    len: usize,
}

impl SpatialGrid {
    /// Creates an empty grid with `cell_size`-degree cells.
    #[must_use]
    pub const fn new(cell_size: f64) -> Self {
        Self {
            cell_size,
            cells: BTreeMap::new(),
            len: 0,
        }
    }

    /// Cell edge length in degrees.
    #[must_use]
    pub const fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Total number of indexed annotations.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the grid holds no annotations.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of non-empty cells.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// The cell containing `coordinate`.
    #[must_use]
    pub fn cell_key(&self, coordinate: Coordinate) -> CellKey {
        CellKey {
            lat: self.cell_index(coordinate.latitude),
            lon: self.cell_index(coordinate.longitude),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn cell_index(&self, degrees: f64) -> i32 {
        (degrees / self.cell_size).floor() as i32
    }

    /// Adds annotations to their cells.
    ///
    /// Coordinates must be finite; filtering bad positions is the caller's
    /// job.
    pub fn insert<I>(&mut self, annotations: I)
    where
        I: IntoIterator<Item = Arc<Annotation>>,
    {
        let before = self.len;
        for annotation in annotations {
            let key = self.cell_key(annotation.coordinate());
            self.cells.entry(key).or_default().push(annotation);
            self.len += 1;
        }
        log::trace!(
            "Indexed {} annotations ({} total in {} cells)",
            self.len - before,
            self.len,
            self.cells.len()
        );
    }

    /// Removes every annotation.
    pub fn clear(&mut self) {
        self.cells.clear();
        self.len = 0;
    }

    /// Inclusive cell range covering `region`'s bounding box
    /// (`center ± span`), clamped to valid latitude/longitude.
    #[must_use]
    pub fn cell_range(&self, region: &MapRegion) -> CellRange {
        let rect = region.bounding_rect();
        let south = rect.min().y.clamp(-90.0, 90.0);
        let north = rect.max().y.clamp(-90.0, 90.0);
        let west = rect.min().x.clamp(-180.0, 180.0);
        let east = rect.max().x.clamp(-180.0, 180.0);

        CellRange {
            lat_min: self.cell_index(south),
            lat_max: self.cell_index(north),
            lon_min: self.cell_index(west),
            lon_max: self.cell_index(east),
        }
    }

    /// Every cell key whose extent intersects `region`'s bounding box.
    #[must_use]
    pub fn cells_overlapping(&self, region: &MapRegion) -> Vec<CellKey> {
        self.cell_range(region).keys().collect()
    }

    /// Concatenates the buckets for `keys`. Keys with no bucket contribute
    /// nothing.
    #[must_use]
    pub fn annotations_in_cells(&self, keys: &[CellKey]) -> Vec<Arc<Annotation>> {
        keys.iter()
            .filter_map(|key| self.cells.get(key))
            .flat_map(|bucket| bucket.iter().cloned())
            .collect()
    }

    /// Every annotation in `range`.
    ///
    /// Enumerates the range's keys when it is smaller than the number of
    /// occupied cells, otherwise scans the occupied cells. A zoomed-out
    /// region can cover millions of mostly-empty cells.
    #[must_use]
    pub fn annotations_in_range(&self, range: &CellRange) -> Vec<Arc<Annotation>> {
        let occupied = u64::try_from(self.cells.len()).unwrap_or(u64::MAX);

        if range.len() <= occupied {
            range
                .keys()
                .filter_map(|key| self.cells.get(&key))
                .flat_map(|bucket| bucket.iter().cloned())
                .collect()
        } else {
            self.cells
                .iter()
                .filter(|(key, _)| range.contains(**key))
                .flat_map(|(_, bucket)| bucket.iter().cloned())
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use chart_map_annotation_models::{AnnotationKind, Span};

    use super::*;

    fn nav_unit(id: &str, lat: f64, lon: f64) -> Arc<Annotation> {
        Arc::new(Annotation::new(
            AnnotationKind::NavUnit,
            id,
            format!("Unit {id}"),
            Coordinate::new(lat, lon),
        ))
    }

    #[test]
    fn cell_key_is_deterministic() {
        let grid = SpatialGrid::new(0.05);
        let coord = Coordinate::new(37.8012, -122.4187);
        assert_eq!(grid.cell_key(coord), grid.cell_key(coord));
        assert_eq!(grid.cell_key(coord), CellKey::new(756, -2449));
    }

    #[test]
    fn negative_coordinates_floor_toward_negative_infinity() {
        let grid = SpatialGrid::new(0.05);
        assert_eq!(grid.cell_key(Coordinate::new(-0.01, -0.01)), CellKey::new(-1, -1));
        assert_eq!(grid.cell_key(Coordinate::new(0.01, 0.01)), CellKey::new(0, 0));
    }

    #[test]
    fn each_annotation_lands_in_one_cell() {
        let mut grid = SpatialGrid::new(0.05);
        grid.insert(vec![
            nav_unit("a", 37.812, -122.412),
            nav_unit("b", 37.813, -122.418),
            nav_unit("c", 40.70, -74.01),
        ]);
        assert_eq!(grid.len(), 3);

        let total: usize = grid.cells.values().map(Vec::len).sum();
        assert_eq!(total, 3);
        assert_eq!(grid.cell_count(), 2);
    }

    #[test]
    fn annotations_in_missing_cells_is_empty() {
        let grid = SpatialGrid::new(0.05);
        assert!(grid.annotations_in_cells(&[CellKey::new(1, 2)]).is_empty());
    }

    #[test]
    fn cells_overlapping_is_cartesian_product() {
        let grid = SpatialGrid::new(0.05);
        let region = MapRegion::new(Coordinate::new(37.825, -122.425), Span::new(0.05, 0.05));
        let keys = grid.cells_overlapping(&region);
        let range = grid.cell_range(&region);

        let lat_cells = usize::try_from(range.lat_max - range.lat_min + 1).unwrap();
        let lon_cells = usize::try_from(range.lon_max - range.lon_min + 1).unwrap();
        assert_eq!(keys.len(), lat_cells * lon_cells);
        assert!(keys.iter().all(|key| range.contains(*key)));
    }

    #[test]
    fn region_query_finds_every_interior_annotation() {
        let mut grid = SpatialGrid::new(0.05);
        let mut inside = Vec::new();
        for i in 0..20 {
            for j in 0..20 {
                let lat = 37.0 + f64::from(i) * 0.037;
                let lon = -123.0 + f64::from(j) * 0.041;
                inside.push(nav_unit(&format!("{i}-{j}"), lat, lon));
            }
        }
        grid.insert(inside.clone());

        let region = MapRegion::new(Coordinate::new(37.35, -122.6), Span::new(0.2, 0.2));
        let found = grid.annotations_in_cells(&grid.cells_overlapping(&region));
        let rect = region.bounding_rect();

        for annotation in &inside {
            let c = annotation.coordinate();
            let within = c.latitude > rect.min().y
                && c.latitude < rect.max().y
                && c.longitude > rect.min().x
                && c.longitude < rect.max().x;
            if within {
                assert!(
                    found.iter().any(|a| a.id() == annotation.id()),
                    "missing {}",
                    annotation.id()
                );
            }
        }
    }

    #[test]
    fn range_scan_matches_key_enumeration() {
        let mut grid = SpatialGrid::new(0.05);
        grid.insert(vec![
            nav_unit("a", 37.80, -122.41),
            nav_unit("b", 10.0, 10.0),
            nav_unit("c", -33.86, 151.21),
        ]);

        // Whole-world region: far more cells than occupied buckets.
        let world = MapRegion::new(Coordinate::new(0.0, 0.0), Span::new(90.0, 180.0));
        let range = grid.cell_range(&world);
        assert!(range.len() > 3);
        assert_eq!(grid.annotations_in_range(&range).len(), 3);

        let local = MapRegion::new(Coordinate::new(37.80, -122.41), Span::new(0.01, 0.01));
        let local_range = grid.cell_range(&local);
        let found = grid.annotations_in_range(&local_range);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), "a");

        let keys: Vec<CellKey> = local_range.keys().collect();
        assert_eq!(grid.annotations_in_cells(&keys), found);
    }

    #[test]
    fn padded_range_grows_each_side() {
        let range = CellRange {
            lat_min: 0,
            lat_max: 0,
            lon_min: 0,
            lon_max: 0,
        };
        assert_eq!(range.len(), 1);
        assert_eq!(range.padded(1).len(), 9);
    }

    #[test]
    fn clear_empties_grid() {
        let mut grid = SpatialGrid::new(0.05);
        grid.insert(vec![nav_unit("a", 37.80, -122.41)]);
        grid.clear();
        assert!(grid.is_empty());
        assert_eq!(grid.cell_count(), 0);
    }
}
