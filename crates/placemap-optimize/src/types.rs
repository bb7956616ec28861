//! Shared types for the placemap geometry optimizer.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A 2D point in the input coordinate space.
///
/// The optimizer is coordinate-system agnostic: `x`/`y` may be
/// longitude/latitude in degrees or projected map units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate (longitude or projected x).
    pub x: f64,
    /// Vertical coordinate (latitude or projected y).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Returns `true` if both coordinates are finite.
    #[must_use]
    pub const fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<Point> for geo::Coord<f64> {
    fn from(p: Point) -> Self {
        Self { x: p.x, y: p.y }
    }
}

impl From<geo::Coord<f64>> for Point {
    fn from(c: geo::Coord<f64>) -> Self {
        Self::new(c.x, c.y)
    }
}

/// An open ordered sequence of points (a path, road or track).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineString(Vec<Point>);

impl LineString {
    /// Create a new line string from a vector of points.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Returns `true` if the line string has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of points in the line string.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns a slice of all points.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Consumes the line string and returns the underlying points.
    #[must_use]
    pub fn into_points(self) -> Vec<Point> {
        self.0
    }
}

/// A closed ordered sequence of points bounding a polygon or hole.
///
/// Construction always closes the ring: if the first and last points
/// differ, a copy of the first point is appended. Deserialization goes
/// through the same path, so unclosed rings in input files are closed
/// on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Point>", into = "Vec<Point>")]
pub struct Ring(Vec<Point>);

impl Ring {
    /// Create a ring, appending the first point if the sequence is open.
    #[must_use]
    pub fn new(mut points: Vec<Point>) -> Self {
        if let (Some(&first), Some(&last)) = (points.first(), points.last())
            && first != last
        {
            points.push(first);
        }
        Self(points)
    }

    /// Returns `true` if the ring has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of points, including the closing duplicate.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns a slice of all points, including the closing duplicate.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Consumes the ring and returns the underlying points.
    #[must_use]
    pub fn into_points(self) -> Vec<Point> {
        self.0
    }

    /// Returns `true` if the first point equals the last point.
    ///
    /// Always `true` for rings built through [`Ring::new`]; an empty
    /// ring counts as closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.0.first() == self.0.last()
    }
}

impl From<Vec<Point>> for Ring {
    fn from(points: Vec<Point>) -> Self {
        Self::new(points)
    }
}

impl From<Ring> for Vec<Point> {
    fn from(ring: Ring) -> Self {
        ring.0
    }
}

/// Geometry carried by a feature.
///
/// A closed sum type: every consumer matches exhaustively over the four
/// variants. [`MultiGeometry`](Self::MultiGeometry) may nest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    /// A single location (placemark pin).
    Point(Point),
    /// An open path.
    LineString(LineString),
    /// An outer boundary plus zero or more holes.
    Polygon {
        /// Outer boundary.
        exterior: Ring,
        /// Holes, in input order.
        #[serde(default)]
        interiors: Vec<Ring>,
    },
    /// An ordered collection of member geometries.
    MultiGeometry(Vec<Self>),
}

impl Geometry {
    /// Total number of points across the whole geometry.
    ///
    /// A point counts as one vertex; ring counts include the closing
    /// duplicate.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        match self {
            Self::Point(_) => 1,
            Self::LineString(line) => line.len(),
            Self::Polygon {
                exterior,
                interiors,
            } => exterior.len() + interiors.iter().map(Ring::len).sum::<usize>(),
            Self::MultiGeometry(members) => members.iter().map(Self::vertex_count).sum(),
        }
    }

    /// The variant of this geometry.
    #[must_use]
    pub const fn kind(&self) -> GeometryKind {
        match self {
            Self::Point(_) => GeometryKind::Point,
            Self::LineString(_) => GeometryKind::LineString,
            Self::Polygon { .. } => GeometryKind::Polygon,
            Self::MultiGeometry(_) => GeometryKind::MultiGeometry,
        }
    }
}

/// Discriminant of [`Geometry`], used in logs and summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryKind {
    /// [`Geometry::Point`].
    Point,
    /// [`Geometry::LineString`].
    LineString,
    /// [`Geometry::Polygon`].
    Polygon,
    /// [`Geometry::MultiGeometry`].
    MultiGeometry,
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Point => "Point",
            Self::LineString => "LineString",
            Self::Polygon => "Polygon",
            Self::MultiGeometry => "MultiGeometry",
        };
        f.write_str(name)
    }
}

/// Opaque reference to the visual style of a feature.
///
/// Resolved to fill/stroke attributes by the styling stage; the
/// optimizer carries it through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StyleRef {
    /// No style reference.
    #[default]
    None,
    /// A style id such as `#lineStyle3`.
    Id(String),
    /// A tag mapping such as `{"highway": "primary"}`.
    Tags(BTreeMap<String, String>),
}

/// A geometry plus its style reference and optional metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// The feature's geometry.
    pub geometry: Geometry,
    /// Style reference, passed through unchanged.
    #[serde(default)]
    pub style: StyleRef,
    /// Display name, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Extra key/value metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl Feature {
    /// Create an unstyled, unnamed feature.
    #[must_use]
    pub const fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            style: StyleRef::None,
            name: None,
            properties: BTreeMap::new(),
        }
    }

    /// Set the style reference.
    #[must_use]
    pub fn with_style(mut self, style: StyleRef) -> Self {
        self.style = style;
        self
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Which part of a geometry a fault refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartKind {
    /// An open line string.
    LineString,
    /// The outer ring of a polygon.
    ExteriorRing,
    /// A hole of a polygon.
    InteriorRing,
}

impl fmt::Display for PartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LineString => "line string",
            Self::ExteriorRing => "exterior ring",
            Self::InteriorRing => "interior ring",
        };
        f.write_str(name)
    }
}

/// Malformed input geometry detected while optimizing one feature.
///
/// Faults are isolated: the affected feature (or collection member)
/// passes through unmodified and the fault is recorded in the run
/// summary.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum GeometryFault {
    /// A line string or ring has too few points to be meaningful.
    #[error("{part} has {found} points, at least {required} required")]
    TooFewPoints {
        /// Which part is short.
        part: PartKind,
        /// Points present.
        found: usize,
        /// Minimum points required.
        required: usize,
    },

    /// A ring has enough points but fewer than three distinct vertices,
    /// e.g. a point repeated four times or a segment walked back and forth.
    #[error("{part} has {found} distinct vertices, at least 3 required")]
    TooFewDistinctVertices {
        /// Which ring is degenerate.
        part: PartKind,
        /// Distinct vertices present.
        found: usize,
    },

    /// A coordinate is NaN or infinite.
    #[error("coordinate ({x}, {y}) is not finite")]
    NonFiniteCoordinate {
        /// Offending x value.
        x: f64,
        /// Offending y value.
        y: f64,
    },

    /// A multi-geometry has no members.
    #[error("multi-geometry has no members")]
    EmptyCollection,
}

/// Why a simplified ring was flagged.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum DegenerateReason {
    /// The ring collapsed below the minimum vertex count (hard failure).
    #[error("ring collapsed to {found} points, at least 4 required")]
    TooFewVertices {
        /// Points left after simplification and closure.
        found: usize,
    },

    /// Bounding-box area shrank past the policy threshold (soft warning).
    #[error("bounding-box area shrank to {ratio:.3} of the original")]
    SuspiciousAreaChange {
        /// Simplified area divided by original area.
        ratio: f64,
    },
}

/// Errors that abort an optimization run.
///
/// Only configuration problems are fatal; malformed data never is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum OptimizeError {
    /// The simplification policy is invalid.
    #[error("invalid simplification policy: {0}")]
    InvalidPolicy(String),
}
