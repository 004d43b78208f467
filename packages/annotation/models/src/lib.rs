#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Map annotation, region, and raw station record types.
//!
//! Every dataset the map renders (navigation units, tidal height stations,
//! tidal current stations, buoys) is converted into the shared
//! [`Annotation`] type defined here. Annotations are immutable once built;
//! the map core only ever replaces them wholesale.

use geo::{Distance, Euclidean, Point, Rect};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Default precision (in degrees) used when comparing annotation
/// coordinates for identity. Roughly one metre at the equator.
pub const DEFAULT_COORDINATE_PRECISION: f64 = 0.000_01;

/// A geographic position in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinate {
    /// Latitude in degrees, positive north.
    pub latitude: f64,
    /// Longitude in degrees, positive east.
    pub longitude: f64,
}

impl Coordinate {
    /// Creates a coordinate from latitude and longitude in degrees.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether this coordinate is a usable position fix.
    ///
    /// Rejects non-finite values, values outside the valid degree ranges,
    /// and the `(0, 0)` "null island" placeholder that station feeds use
    /// for stations without a known position.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn is_valid_fix(&self) -> bool {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return false;
        }
        if self.latitude.abs() > 90.0 || self.longitude.abs() > 180.0 {
            return false;
        }
        !(self.latitude == 0.0 && self.longitude == 0.0)
    }

    /// Converts to a [`geo::Point`] (x = longitude, y = latitude).
    #[must_use]
    pub fn to_point(self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }

    /// Planar (degree-space) distance to another coordinate.
    ///
    /// No geodesic correction is applied. At the zoom levels where
    /// annotations are shown this ranks points the same way a great
    /// circle distance would.
    #[must_use]
    pub fn planar_distance(self, other: Self) -> f64 {
        Euclidean.distance(self.to_point(), other.to_point())
    }

    /// Rounds the coordinate onto an integer lattice of `precision`
    /// degrees, returning `(lat, lon)` lattice indices.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn quantized(self, precision: f64) -> (i64, i64) {
        (
            (self.latitude / precision).round() as i64,
            (self.longitude / precision).round() as i64,
        )
    }
}

/// Size of the visible viewport in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    /// Latitude extent of the viewport.
    pub latitude_delta: f64,
    /// Longitude extent of the viewport.
    pub longitude_delta: f64,
}

impl Span {
    /// Creates a span from latitude and longitude deltas.
    #[must_use]
    pub const fn new(latitude_delta: f64, longitude_delta: f64) -> Self {
        Self {
            latitude_delta,
            longitude_delta,
        }
    }
}

/// The map viewport reported by the rendering surface on every pan/zoom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapRegion {
    /// Center of the viewport.
    pub center: Coordinate,
    /// Extent of the viewport.
    pub span: Span,
}

impl MapRegion {
    /// Creates a region from a center and span.
    #[must_use]
    pub const fn new(center: Coordinate, span: Span) -> Self {
        Self { center, span }
    }

    /// Bounding box used for annotation lookups: `center ± span` on both
    /// axes, so the box extends one full viewport beyond each visible edge.
    ///
    /// The rectangle is in `(x = longitude, y = latitude)` order.
    #[must_use]
    pub fn bounding_rect(&self) -> Rect<f64> {
        let lat = self.center.latitude;
        let lon = self.center.longitude;
        let dlat = self.span.latitude_delta.abs();
        let dlon = self.span.longitude_delta.abs();

        Rect::new((lon - dlon, lat - dlat), (lon + dlon, lat + dlat))
    }
}

/// The four datasets that feed the map.
///
/// Used wherever behavior is per source rather than per annotation:
/// loading flags, batch ingestion, and tap routing.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DatasetKind {
    /// USACE navigation units (docks, piers, terminals).
    NavUnit,
    /// NOAA tide prediction stations.
    TidalHeightStation,
    /// NOAA tidal current prediction stations.
    TidalCurrentStation,
    /// NDBC buoy stations.
    BuoyStation,
}

impl DatasetKind {
    /// All dataset kinds in a stable order.
    pub const ALL: [Self; 4] = [
        Self::NavUnit,
        Self::TidalHeightStation,
        Self::TidalCurrentStation,
        Self::BuoyStation,
    ];

    /// Position of this kind within [`Self::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::NavUnit => 0,
            Self::TidalHeightStation => 1,
            Self::TidalCurrentStation => 2,
            Self::BuoyStation => 3,
        }
    }

    /// Human-readable label for log and UI text.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::NavUnit => "navigation units",
            Self::TidalHeightStation => "tide stations",
            Self::TidalCurrentStation => "current stations",
            Self::BuoyStation => "buoys",
        }
    }
}

/// What an annotation marks. Fixed at construction.
///
/// Tidal current stations report predictions at several depths, so the
/// current-station variant also carries the depth bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnnotationKind {
    /// A navigation unit.
    NavUnit,
    /// A tidal height station.
    TidalHeightStation,
    /// A tidal current station at a specific depth bin.
    #[serde(rename_all = "camelCase")]
    TidalCurrentStation {
        /// Depth-indexed prediction bin.
        current_bin: i32,
    },
    /// A buoy station.
    BuoyStation,
}

impl AnnotationKind {
    /// Builds the annotation kind for a dataset. The bin is only kept for
    /// tidal current stations.
    #[must_use]
    pub const fn for_dataset(dataset: DatasetKind, current_bin: i32) -> Self {
        match dataset {
            DatasetKind::NavUnit => Self::NavUnit,
            DatasetKind::TidalHeightStation => Self::TidalHeightStation,
            DatasetKind::TidalCurrentStation => Self::TidalCurrentStation { current_bin },
            DatasetKind::BuoyStation => Self::BuoyStation,
        }
    }

    /// The dataset this annotation came from.
    #[must_use]
    pub const fn dataset(self) -> DatasetKind {
        match self {
            Self::NavUnit => DatasetKind::NavUnit,
            Self::TidalHeightStation => DatasetKind::TidalHeightStation,
            Self::TidalCurrentStation { .. } => DatasetKind::TidalCurrentStation,
            Self::BuoyStation => DatasetKind::BuoyStation,
        }
    }

    /// Depth bin for current stations, `None` for everything else.
    #[must_use]
    pub const fn current_bin(self) -> Option<i32> {
        match self {
            Self::TidalCurrentStation { current_bin } => Some(current_bin),
            Self::NavUnit | Self::TidalHeightStation | Self::BuoyStation => None,
        }
    }

    /// Marker appearance for this kind.
    #[must_use]
    pub const fn marker_style(self) -> MarkerStyle {
        match self {
            Self::NavUnit => MarkerStyle {
                color: MarkerColor::Blue,
                glyph: "anchor",
            },
            Self::TidalHeightStation => MarkerStyle {
                color: MarkerColor::Green,
                glyph: "water.waves",
            },
            Self::TidalCurrentStation { .. } => MarkerStyle {
                color: MarkerColor::Red,
                glyph: "arrow.left.arrow.right",
            },
            Self::BuoyStation => MarkerStyle {
                color: MarkerColor::Orange,
                glyph: "dot.radiowaves.up.forward",
            },
        }
    }
}

/// Marker tint.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MarkerColor {
    Blue,
    Green,
    Red,
    Orange,
}

/// How a marker is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MarkerStyle {
    /// Marker tint.
    pub color: MarkerColor,
    /// Symbol name drawn inside the marker.
    pub glyph: &'static str,
}

/// A point-of-interest marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    kind: AnnotationKind,
    id: String,
    name: String,
    coordinate: Coordinate,
}

impl Annotation {
    /// Creates an annotation.
    #[must_use]
    pub fn new(
        kind: AnnotationKind,
        id: impl Into<String>,
        name: impl Into<String>,
        coordinate: Coordinate,
    ) -> Self {
        Self {
            kind,
            id: id.into(),
            name: name.into(),
            coordinate,
        }
    }

    /// What this annotation marks.
    #[must_use]
    pub const fn kind(&self) -> AnnotationKind {
        self.kind
    }

    /// Source dataset identifier. Unique within the kind (and bin).
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display label.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position of the marker.
    #[must_use]
    pub const fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    /// Identity key at the given coordinate precision.
    #[must_use]
    pub fn key(&self, precision: f64) -> AnnotationKey {
        let (lat, lon) = self.coordinate.quantized(precision);
        AnnotationKey {
            kind: self.kind,
            id: self.id.clone(),
            lat,
            lon,
        }
    }

    /// Whether two annotations are the same marker: same kind (and bin),
    /// same source ID, and the same position at `precision` degrees.
    #[must_use]
    pub fn same_marker(&self, other: &Self, precision: f64) -> bool {
        self.kind == other.kind
            && self.id == other.id
            && self.coordinate.quantized(precision) == other.coordinate.quantized(precision)
    }
}

/// Hashable identity of an [`Annotation`] for diffing rendered markers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnnotationKey {
    /// Kind including the current bin.
    pub kind: AnnotationKind,
    /// Source ID.
    pub id: String,
    /// Quantized latitude.
    pub lat: i64,
    /// Quantized longitude.
    pub lon: i64,
}

/// A station or unit record as delivered by a data-loading service.
///
/// Positions are optional: decommissioned stations routinely come back
/// without coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    /// Source identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Latitude in degrees, if known.
    pub latitude: Option<f64>,
    /// Longitude in degrees, if known.
    pub longitude: Option<f64>,
    /// Depth bin, only meaningful for tidal current stations.
    #[serde(default)]
    pub current_bin: Option<i32>,
}

impl RawRecord {
    /// Creates a record with a position and no current bin.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            latitude: Some(latitude),
            longitude: Some(longitude),
            current_bin: None,
        }
    }

    /// Sets the current bin.
    #[must_use]
    pub const fn with_current_bin(mut self, current_bin: i32) -> Self {
        self.current_bin = Some(current_bin);
        self
    }

    /// The record position, or `None` if it is missing or not a usable fix.
    #[must_use]
    pub fn coordinate(&self) -> Option<Coordinate> {
        let coordinate = Coordinate::new(self.latitude?, self.longitude?);
        coordinate.is_valid_fix().then_some(coordinate)
    }

    /// Converts the record into an annotation for `dataset`, dropping it
    /// when it has no usable position. A current station without a bin
    /// is treated as bin 0.
    #[must_use]
    pub fn into_annotation(self, dataset: DatasetKind) -> Option<Annotation> {
        let coordinate = self.coordinate()?;
        let kind = AnnotationKind::for_dataset(dataset, self.current_bin.unwrap_or(0));
        Some(Annotation {
            kind,
            id: self.id,
            name: self.name,
            coordinate,
        })
    }
}
